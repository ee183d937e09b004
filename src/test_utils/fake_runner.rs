use std::io;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::CommandSpec;
use crate::SpawnedProcess;
use crate::SubprocessRunner;

type Responder = Box<dyn Fn(&[String]) -> Vec<u8> + Send + Sync>;

/// One recorded invocation of [`FakeRunner`]
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub spec: CommandSpec,
    /// Words following the command name
    pub locations: Vec<String>,
    pub at: Instant,
}

/// Records every spawn and answers with canned output built from the
/// locations on the command line.
pub struct FakeRunner {
    responder: Responder,
    spawns: Mutex<Vec<SpawnRecord>>,
}

impl FakeRunner {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&[String]) -> Vec<u8> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            spawns: Mutex::new(Vec::new()),
        })
    }

    /// Answers `size=<len of location>` for every node in NUL format.
    pub fn nul_sizes() -> Arc<Self> {
        Self::new(|locations| {
            let mut out = Vec::new();
            for location in locations {
                out.extend_from_slice(format!("{location}\0|size|{}\0", location.len()).as_bytes());
            }
            out
        })
    }

    pub fn spawns(&self) -> Vec<SpawnRecord> {
        self.spawns.lock().clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.spawns.lock().len()
    }
}

impl SubprocessRunner for FakeRunner {
    fn spawn(
        &self,
        spec: &CommandSpec,
    ) -> io::Result<SpawnedProcess> {
        let words = shlex::split(&spec.cmdline)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unbalanced quotes"))?;
        let locations: Vec<String> = words.into_iter().skip(1).collect();
        let output = (self.responder)(&locations);
        self.spawns.lock().push(SpawnRecord {
            spec: spec.clone(),
            locations,
            at: Instant::now(),
        });

        Ok(SpawnedProcess {
            stdout: Box::new(io::Cursor::new(output)),
            exit: async { Ok(Some(0)) }.boxed(),
        })
    }
}
