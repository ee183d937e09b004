use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::expand_template;
use super::CommandSpec;
use super::SubprocessRunner;
use crate::DemuxMode;
use crate::DemuxRecord;
use crate::NodeKey;
use crate::NodePropertyStore;
use crate::ParseOutcome;
use crate::PendingRequestTable;
use crate::PropertyGroup;
use crate::RequestId;
use crate::StreamDemuxer;
use crate::TaskError;
use crate::TaskScheduler;

/// Collaborators shared by every refresh of one engine
pub struct RefreshContext {
    pub store: Arc<dyn NodePropertyStore>,
    pub table: Arc<PendingRequestTable>,
    pub scheduler: TaskScheduler,
    pub runner: Arc<dyn SubprocessRunner>,
    pub read_chunk_size: usize,
}

/// One node of a batch and the requests waiting on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub node: NodeKey,
    pub location: String,
    pub requests: Vec<RequestId>,
}

/// A detached batch: owns its items from flush until every request is
/// resolved.
#[derive(Debug)]
pub struct RefreshSession {
    group: Arc<PropertyGroup>,
    items: Vec<BatchItem>,
    mode: DemuxMode,
}

impl RefreshSession {
    pub fn new(
        group: Arc<PropertyGroup>,
        items: Vec<BatchItem>,
        mode: DemuxMode,
    ) -> Self {
        Self { group, items, mode }
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Spawns the group's command, applies its output and resolves every
    /// request of the session.
    #[instrument(skip_all, fields(group = %self.group.id, nodes = self.items.len()))]
    pub async fn run(
        self,
        ctx: &RefreshContext,
    ) {
        let locations: Vec<&str> = self.items.iter().map(|i| i.location.as_str()).collect();
        let cmdline = match expand_template(&self.group.command, &locations) {
            Ok(cmdline) => cmdline,
            Err(e) => {
                warn!("cannot build command line: {}", e);
                return self.fail_all(ctx, e);
            }
        };

        let spec = CommandSpec {
            cmdline,
            workdir: self.group.workdir.clone(),
            env: self.group.env.clone(),
        };
        let mut process = match ctx.runner.spawn(&spec) {
            Ok(process) => process,
            Err(e) => {
                warn!(cmdline = %spec.cmdline, "spawn failed: {}", e);
                return self.fail_all(
                    ctx,
                    TaskError::Spawn {
                        command: spec.cmdline,
                        reason: e.to_string(),
                    },
                );
            }
        };

        let mut demuxer = StreamDemuxer::new(self.group.format, self.mode);
        let mut chunk = vec![0u8; ctx.read_chunk_size.max(1)];
        loop {
            match process.stdout.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    demuxer.push(&chunk[..n]);
                    self.drain(ctx, &mut demuxer, &locations);
                }
                Err(e) => {
                    warn!("reading command output failed: {}", e);
                    break;
                }
            }
        }
        if demuxer.finish() {
            self.drain(ctx, &mut demuxer, &locations);
        }

        match process.exit.await {
            Ok(Some(0)) => trace!("command exited"),
            Ok(code) => debug!(?code, "command exited unsuccessfully"),
            Err(e) => warn!("waiting for command failed: {}", e),
        }
        self.resolve(ctx);
    }

    fn drain(
        &self,
        ctx: &RefreshContext,
        demuxer: &mut StreamDemuxer,
        locations: &[&str],
    ) {
        loop {
            match demuxer.parse_next(locations, &self.group) {
                ParseOutcome::Done(Some(record)) => self.apply(ctx, record),
                ParseOutcome::Done(None) => {}
                ParseOutcome::Failed(e) => warn!("discarding record: {}", e),
                ParseOutcome::NeedData => return,
            }
        }
    }

    fn apply(
        &self,
        ctx: &RefreshContext,
        record: DemuxRecord,
    ) {
        let Some(item) = self.items.get(record.item) else {
            return;
        };
        let name = &record.property.name;
        if !ctx.store.set_value(&item.node, name, record.value) {
            trace!(node = %item.node, property = %name, "node is gone, value dropped");
        }
        ctx.table.mark_refreshed(&item.requests, name);
    }

    /// End of stream: refreshed requests are done, the rest unresolved.
    fn resolve(
        self,
        ctx: &RefreshContext,
    ) {
        for id in self.items.iter().flat_map(|i| &i.requests) {
            let Some(request) = ctx.table.take(*id) else {
                continue;
            };
            let outcome = if request.refreshed {
                Ok(())
            } else {
                Err(TaskError::Unresolved {
                    property: request.property.to_string(),
                    node: ctx.store.full_location(&request.node),
                })
            };
            ctx.scheduler.deliver(&request.task, outcome);
        }
    }

    fn fail_all(
        self,
        ctx: &RefreshContext,
        error: TaskError,
    ) {
        for id in self.items.iter().flat_map(|i| &i.requests) {
            if let Some(request) = ctx.table.take(*id) {
                ctx.scheduler.deliver(&request.task, Err(error.clone()));
            }
        }
    }
}
