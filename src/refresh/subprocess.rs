use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use futures::future::BoxFuture;
use futures::FutureExt;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncRead;
use tokio::process::Command;
use tracing::debug;

/// A fully expanded command and its execution environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cmdline: String,
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

/// A started command: its standard output and a future resolving to the
/// exit code once it terminates (`None` when killed by a signal).
pub struct SpawnedProcess {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub exit: BoxFuture<'static, io::Result<Option<i32>>>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SpawnedProcess").finish_non_exhaustive()
    }
}

/// Starts refresh commands.
#[cfg_attr(test, automock)]
pub trait SubprocessRunner: Send + Sync {
    fn spawn(
        &self,
        spec: &CommandSpec,
    ) -> io::Result<SpawnedProcess>;
}

/// Runs command lines through `sh -c` on the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl SubprocessRunner for ShellRunner {
    fn spawn(
        &self,
        spec: &CommandSpec,
    ) -> io::Result<SpawnedProcess> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&spec.cmdline)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &spec.workdir {
            command.current_dir(workdir);
        }

        let mut child = command.spawn()?;
        debug!(pid = ?child.id(), cmdline = %spec.cmdline, "spawned refresh command");
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdout was not captured"))?;

        Ok(SpawnedProcess {
            stdout: Box::new(stdout),
            exit: async move { child.wait().await.map(|status| status.code()) }.boxed(),
        })
    }
}
