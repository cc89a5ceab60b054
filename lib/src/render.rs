use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::artifact::{Artifact, Rendered};
use crate::entry::{Entry, EntrySet};
use crate::error::{Error, ErrorKind, Result};
use crate::tree::Tree;

/// The argument of every render function.
#[derive(Debug, Clone, Serialize)]
pub struct RenderContext {
    /// The entry being rendered.
    pub entry: Entry,
    /// Every entry of the current build, in load order.
    pub entries: Arc<EntrySet>,
    /// `entries`, nested by path segment.
    pub tree: Arc<Tree>,
}

impl RenderContext {
    pub fn new(entry: Entry, entries: Arc<EntrySet>) -> Self {
        let tree = Arc::new(Tree::build(&*entries));
        RenderContext { entry, entries, tree }
    }
}

enum Pending {
    Done(Entry),
    Failed(Error),
    Rendering { entry: Entry, name: String, task: JoinHandle<Result<Rendered>> },
}

/// Renders every entry of `entries` that names a render function with that
/// function from `artifact`. Entries without one pass through unchanged.
///
/// All renders run to completion even when one fails; the first failure in
/// entry order is returned and no partial result is.
pub async fn dispatch(artifact: &Artifact, entries: Arc<EntrySet>) -> Result<EntrySet> {
    let tree = Arc::new(Tree::build(&*entries));

    let mut pending = Vec::with_capacity(entries.len());
    for entry in entries.iter() {
        let Some(name) = entry.render_fn() else {
            pending.push(Pending::Done(entry.clone()));
            continue;
        };

        let Value::String(name) = name else {
            pending.push(Pending::Failed(missing(entry, &name.to_string(), "name is not a string")));
            continue;
        };

        match artifact.lookup(name) {
            Ok(render) => {
                let cx = RenderContext {
                    entry: entry.clone(),
                    entries: entries.clone(),
                    tree: tree.clone(),
                };

                let task = tokio::spawn(render.render(cx));
                pending.push(Pending::Rendering { entry: entry.clone(), name: name.clone(), task });
            }
            Err(e) => {
                pending.push(Pending::Failed(missing(entry, name, e)));
            }
        }
    }

    let mut first_error = None;
    let mut rendered = Vec::with_capacity(pending.len());
    for item in pending {
        let result = match item {
            Pending::Done(entry) => Ok(entry),
            Pending::Failed(error) => Err(error),
            Pending::Rendering { mut entry, name, task } => match task.await {
                Ok(Ok(Rendered::Text(body))) => {
                    entry.body = body;
                    Ok(entry)
                }
                Ok(Ok(Rendered::Other(kind))) => Err(error! {
                    format!("render function `{name}` must return a string"),
                    "returned" => kind,
                    "entry" => &entry.path,
                }.with_kind(ErrorKind::RenderOutput)),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(Error::from(e)),
            }
        };

        match result {
            Ok(entry) => rendered.push(entry),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => tracing::debug!("suppressing subsequent render error:\n{e}"),
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(EntrySet::from(rendered)),
    }
}

fn missing(entry: &Entry, name: &str, reason: impl std::fmt::Display) -> Error {
    error! {
        format!("expected to find render function `{name}`"),
        "reason" => reason,
        "entry" => &entry.path,
    }.with_kind(ErrorKind::RenderFunctionMissing)
}
