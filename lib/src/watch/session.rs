use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};

use crate::artifact::{Artifact, ArtifactLoader};
use crate::build::{evaluate, BuildResult, Timing};
use crate::bundle::{BundlerConfig, Compilation};
use crate::entry::{read_entries, read_entry_if_exists, EntrySet};
use crate::error::Result;
use crate::render::dispatch;
use crate::util::PathExt;
use crate::watch::{FsEvent, FsEventKind};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Created, not yet running.
    Idle,
    /// Running, waiting for the first successful full rebuild.
    Compiling,
    /// Serving file events against a live artifact.
    Ready,
    Rebuilding,
    Closed,
}

/// The event streams a session consumes.
pub struct Sources {
    pub compiled: mpsc::UnboundedReceiver<Result<Compilation>>,
    pub files: mpsc::UnboundedReceiver<FsEvent>,
    pub shutdown: watch::Receiver<bool>,
}

/// The state of one watch: the live artifact and entry set, and where the
/// session is in its lifecycle. Every trigger is handled to completion before
/// the next one is looked at.
pub struct WatchSession<L> {
    root: PathBuf,
    code_exts: Vec<String>,
    loader: L,
    artifact: Option<Arc<Artifact>>,
    entries: Arc<EntrySet>,
    state: State,
}

impl<L: ArtifactLoader> WatchSession<L> {
    pub fn new(config: &BundlerConfig, loader: L) -> Self {
        WatchSession {
            root: config.root().to_path_buf(),
            code_exts: config.code_extensions().to_vec(),
            loader,
            artifact: None,
            entries: Arc::new(EntrySet::new()),
            state: State::Idle,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn entries(&self) -> &Arc<EntrySet> {
        &self.entries
    }

    pub fn artifact(&self) -> Option<&Arc<Artifact>> {
        self.artifact.as_ref()
    }

    /// Handles one compiler result with a full rebuild: evaluate the artifact,
    /// reload every entry, render everything.
    ///
    /// The artifact is committed once it evaluates and the entry set once it
    /// loads, so a later render failure leaves both live for file events.
    pub async fn on_compiled(&mut self, compiled: Result<Compilation>) -> Result<BuildResult> {
        let previous = match self.state {
            State::Ready => State::Ready,
            _ => State::Compiling,
        };

        self.state = State::Rebuilding;
        let result = self.full_rebuild(compiled).await;
        self.state = match result {
            Ok(_) => State::Ready,
            Err(_) => previous,
        };

        result
    }

    async fn full_rebuild(&mut self, compiled: Result<Compilation>) -> Result<BuildResult> {
        let compilation = compiled?;
        let (artifact, eval) = evaluate(&self.loader, &compilation)?;
        self.artifact = Some(artifact.clone());

        let start = Instant::now();
        self.entries = Arc::new(read_entries(&self.root, &self.code_exts).await?);
        let entries = dispatch(&artifact, self.entries.clone()).await?;

        let timing = Timing::Full { compile: compilation.elapsed, eval, render: start.elapsed() };
        Ok(BuildResult { entries, timing })
    }

    /// Handles one file event with an incremental rebuild: splice the changed
    /// entry into the live set, then render the whole set again.
    ///
    /// Returns `None`, doing nothing, before the first successful full rebuild
    /// and for template or hidden files.
    pub async fn on_file_event(&mut self, event: &FsEvent) -> Option<Result<BuildResult>> {
        if event.path.has_extension_in(&self.code_exts) || event.path.is_hidden_below(&self.root) {
            return None;
        }

        let artifact = match (self.state, &self.artifact) {
            (State::Ready, Some(artifact)) => artifact.clone(),
            (state, _) => {
                tracing::debug!(path = %event.path.display(), ?state, "ignoring file event before first build");
                return None;
            }
        };

        self.state = State::Rebuilding;
        let result = self.incremental_rebuild(event, &artifact).await;
        self.state = State::Ready;
        Some(result)
    }

    async fn incremental_rebuild(&mut self, event: &FsEvent, artifact: &Artifact) -> Result<BuildResult> {
        let start = Instant::now();
        let path = event.path.to_slash_relative(&self.root)?;
        let mut entries = EntrySet::clone(&self.entries);

        let entry = match event.kind {
            FsEventKind::Remove => None,
            FsEventKind::Add | FsEventKind::Change => read_entry_if_exists(&self.root, &event.path).await?,
        };

        match entry {
            Some(entry) => {
                tracing::debug!(path = %entry.path, "reloaded entry");
                entries.upsert(entry);
            }
            None => {
                let dir = format!("{path}/");
                let before = entries.len();
                entries.retain(|e| e.path != path && !e.path.starts_with(&dir));
                tracing::debug!(%path, removed = before - entries.len(), "removed entries");
            }
        }

        self.entries = Arc::new(entries);
        let entries = dispatch(artifact, self.entries.clone()).await?;
        Ok(BuildResult { entries, timing: Timing::Incremental { render: start.elapsed() } })
    }

    /// Serves `sources` until shutdown, calling `on_done` exactly once per
    /// handled trigger.
    ///
    /// Compiler results that arrive while a full rebuild is running are
    /// dropped without a callback. File events are queued and handled in
    /// order once the session is free.
    pub async fn run<F, Fut>(&mut self, mut sources: Sources, mut on_done: F)
        where F: FnMut(Result<BuildResult>) -> Fut,
              Fut: Future<Output = ()>,
    {
        self.state = State::Compiling;
        loop {
            tokio::select! {
                biased;
                _ = crate::bundle::closed(&mut sources.shutdown) => break,
                Some(compiled) = sources.compiled.recv() => {
                    let result = self.on_compiled(compiled).await;
                    on_done(result).await;

                    let mut dropped = 0;
                    while sources.compiled.try_recv().is_ok() {
                        dropped += 1;
                    }

                    if dropped > 0 {
                        tracing::debug!(dropped, "dropped compilations that arrived during a rebuild");
                    }
                }
                Some(event) = sources.files.recv() => {
                    if let Some(result) = self.on_file_event(&event).await {
                        on_done(result).await;
                    }
                }
            }
        }

        self.state = State::Closed;
        tracing::debug!("watch session closed");
    }
}
