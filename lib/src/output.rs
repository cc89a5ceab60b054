use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::entry::Entry;
use crate::error::{Chainable, Error, ErrorKind, Result};

/// Where `entry` is written below `dir`. Absolute paths and paths that climb
/// out of `dir` are refused.
fn output_path(dir: &Path, entry: &Entry) -> Result<PathBuf> {
    let relative = Path::new(&entry.path);
    let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || entry.path.is_empty() {
        return Err(error! {
            "refusing to write entry outside of the output directory",
            "entry" => &entry.path,
            "output" => dir.display(),
        }.with_kind(ErrorKind::Io));
    }

    Ok(dir.join(relative))
}

/// Writes the body of every entry to `dir/<path>`, creating directories as
/// needed and replacing existing files. Writes run concurrently.
///
/// Nothing is written if any path is refused. Once writing starts, every
/// write finishes before the first failure is returned.
pub async fn write_entries(dir: &Path, entries: &[Entry]) -> Result<()> {
    let paths = entries.iter()
        .map(|entry| output_path(dir, entry))
        .collect::<Result<Vec<_>>>()?;

    let mut tasks = Vec::with_capacity(entries.len());
    for (path, entry) in paths.into_iter().zip(entries) {
        let body = entry.body.clone();
        tasks.push(tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await
                    .chain_with(|| error!("failed to create output directory", "path" => parent.display()))?;
            }

            tokio::fs::write(&path, body).await
                .chain_with(|| error!("failed to write output file", "path" => path.display()))
        }));
    }

    let mut first_error = None;
    for task in tasks {
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::from(e)),
        };

        if let Err(e) = result {
            match first_error {
                None => first_error = Some(e),
                Some(_) => tracing::debug!("suppressing subsequent write error:\n{e}"),
            }
        }
    }

    if let Some(error) = first_error {
        return Err(error);
    }

    tracing::debug!(dir = %dir.display(), files = entries.len(), "wrote entries");
    Ok(())
}

/// Replaces the final extension of every entry path found in `renames`, e.g.
/// `{ "md": "html" }` turns `posts/a.md` into `posts/a.html`.
pub fn rename_extensions<'a, I>(entries: I, renames: &BTreeMap<String, String>)
    where I: IntoIterator<Item = &'a mut Entry>
{
    if renames.is_empty() {
        return;
    }

    for entry in entries {
        let Some((stem, ext)) = entry.path.rsplit_once('.') else { continue };
        if stem.is_empty() || stem.ends_with('/') || ext.contains('/') {
            continue;
        }

        let renamed = renames.iter()
            .find(|(from, _)| crate::util::normalize_extension(from) == ext)
            .map(|(_, to)| format!("{stem}.{}", crate::util::normalize_extension(to)));

        if let Some(path) = renamed {
            entry.path = path;
        }
    }
}
