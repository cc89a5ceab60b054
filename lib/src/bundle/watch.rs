use std::path::Path;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::bundle::{Bundler, Compilation};
use crate::error::{Chainable, Result};
use crate::util::PathExt;

/// Recompiles the bundle whenever a module below the entry directory changes.
///
/// An initial compilation is emitted as soon as the watch starts. Later ones
/// follow a template change once no further change has arrived for the
/// configured aggregate timeout.
pub struct CompilerWatch {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl CompilerWatch {
    pub fn spawn(
        bundler: Bundler,
        compiled: mpsc::UnboundedSender<Result<Compilation>>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let root = bundler.config().root().to_path_buf();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = raw_tx.send(event);
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)
            .chain_with(|| error!("failed to watch template directory", "root" => root.display()))?;

        let task = tokio::spawn(run(bundler, raw_rx, compiled, shutdown));
        Ok(CompilerWatch { watcher, task })
    }

    pub fn watcher(&self) -> &RecommendedWatcher {
        &self.watcher
    }

    /// Waits for the compile loop to observe shutdown and exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("compiler watch task failed: {e}");
        }
    }
}

fn is_module_change(root: &Path, exts: &[String], event: &notify::Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }

    event.paths.iter().any(|path| path.has_extension_in(exts) && !path.is_hidden_below(root))
}

/// Resolves once shutdown is requested or its sender is gone.
pub(crate) async fn closed(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|closed| *closed).await;
}

async fn run(
    mut bundler: Bundler,
    mut raw: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    compiled: mpsc::UnboundedSender<Result<Compilation>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let root = bundler.config().root().to_path_buf();
    let exts = bundler.config().code_extensions().to_vec();
    let timeout = bundler.config().aggregate_timeout();

    if compiled.send(bundler.run().await).is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = closed(&mut shutdown) => break,
            event = raw.recv() => match event {
                None => break,
                Some(Err(e)) => {
                    tracing::warn!("template watcher error: {e}");
                    continue;
                }
                Some(Ok(event)) if !is_module_change(&root, &exts, &event) => continue,
                Some(Ok(event)) => tracing::debug!(paths = ?event.paths, "template change"),
            },
        }

        // Absorb the rest of the burst before compiling.
        loop {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => break,
                event = raw.recv() => if event.is_none() { break },
            }
        }

        if *shutdown.borrow() {
            break;
        }

        if compiled.send(bundler.run().await).is_err() {
            break;
        }
    }

    tracing::debug!("compiler watch stopped");
}
