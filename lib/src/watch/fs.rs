use std::path::{Path, PathBuf};

use notify::event::{EventKind, ModifyKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Chainable, Result};
use crate::util::PathExt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FsEventKind {
    Add,
    Change,
    Remove,
}

/// A change to one file below the content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

impl FsEvent {
    pub fn new(kind: FsEventKind, path: impl Into<PathBuf>) -> Self {
        FsEvent { kind, path: path.into() }
    }
}

/// Watches the content root and forwards file events.
pub struct ContentWatch {
    watcher: RecommendedWatcher,
}

impl ContentWatch {
    pub fn spawn(root: &Path, events: mpsc::UnboundedSender<FsEvent>) -> Result<Self> {
        let event_root = root.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            match event {
                Ok(event) => for event in classify(&event_root, &event) {
                    let _ = events.send(event);
                },
                Err(e) => tracing::warn!("content watcher error: {e}"),
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)
            .chain_with(|| error!("failed to watch content directory", "root" => root.display()))?;

        Ok(ContentWatch { watcher })
    }

    pub fn watcher(&self) -> &RecommendedWatcher {
        &self.watcher
    }
}

/// Maps one notify event to file events. Renames surface as changes to both
/// paths; the session decides from the file's existence what happened. A
/// directory created or moved into the tree yields an `Add` for every file
/// inside it, since no event is raised for those files.
pub(crate) fn classify(root: &Path, event: &notify::Event) -> Vec<FsEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Add,
        EventKind::Modify(_) => FsEventKind::Change,
        EventKind::Remove(_) => FsEventKind::Remove,
        _ => return vec![],
    };

    let arrived = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)));
    let mut events = vec![];
    for path in &event.paths {
        if path.is_hidden_below(root) || path.is_temp_file() {
            continue;
        }

        if kind == FsEventKind::Remove || !path.is_dir() {
            events.push(FsEvent::new(kind, path.clone()));
        } else if arrived {
            match crate::walk::files_blocking(path, |_| true) {
                Ok(files) => events.extend(files.into_iter().map(|f| FsEvent::new(FsEventKind::Add, f))),
                Err(e) => tracing::warn!(dir = %path.display(), "failed to scan new directory: {e}"),
            }
        }
    }

    events
}
