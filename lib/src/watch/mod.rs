//! Watch mode: a compiler watch and a content watch feeding one session.

mod fs;
mod session;

pub use fs::{ContentWatch, FsEvent, FsEventKind};
pub use session::{Sources, State, WatchSession};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::artifact::{ArtifactLoader, LuaLoader};
use crate::build::BuildResult;
use crate::bundle::{Bundler, BundlerConfig, CompilerWatch};
use crate::error::Result;

/// Stops a running [`Watcher`]. Cheap to clone; any clone may be used.
#[derive(Debug, Clone)]
pub struct WatchHandle(Arc<watch::Sender<bool>>);

impl WatchHandle {
    /// Stops both watchers. Work already in flight completes and reports
    /// through its callback first.
    pub fn deinit(&self) {
        self.0.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.0.borrow()
    }
}

/// A started watch: both file watchers are live and events are buffered
/// until [`Watcher::run`] drives the session.
pub struct Watcher<L = LuaLoader> {
    session: WatchSession<L>,
    sources: Sources,
    compiler: CompilerWatch,
    content: ContentWatch,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Watcher<LuaLoader> {
    /// Validates `config` and starts watching with the Luau sandbox.
    pub fn start(config: toml::Table) -> Result<Self> {
        Watcher::start_with(BundlerConfig::from_table(config)?, LuaLoader::default())
    }
}

impl<L: ArtifactLoader> Watcher<L> {
    pub fn start_with(config: BundlerConfig, loader: L) -> Result<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (files_tx, files) = mpsc::unbounded_channel();
        let (compiled_tx, compiled) = mpsc::unbounded_channel();

        let content = ContentWatch::spawn(config.root(), files_tx)?;
        let session = WatchSession::new(&config, loader);
        let compiler = CompilerWatch::spawn(Bundler::new(config), compiled_tx, shutdown_rx.clone())?;
        tracing::info!(root = %session.root().display(), "watching");

        Ok(Watcher {
            session,
            sources: Sources { compiled, files, shutdown: shutdown_rx },
            compiler,
            content,
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn handle(&self) -> WatchHandle {
        WatchHandle(self.shutdown.clone())
    }

    /// The watcher of the template directory.
    pub fn compiler(&self) -> &CompilerWatch {
        &self.compiler
    }

    /// The watcher of the content directory.
    pub fn content(&self) -> &ContentWatch {
        &self.content
    }

    /// Drives the session until [`WatchHandle::deinit`] is called, invoking
    /// `on_done` once per rebuild. Returns the closed session.
    pub async fn run<F, Fut>(self, on_done: F) -> WatchSession<L>
        where F: FnMut(Result<BuildResult>) -> Fut,
              Fut: Future<Output = ()>,
    {
        let Watcher { mut session, sources, compiler, content, shutdown } = self;
        session.run(sources, on_done).await;

        drop(content);
        compiler.join().await;
        drop(shutdown);
        session
    }
}
