use std::path::{Path, PathBuf};

use jwalk::WalkDir;

use crate::error::{Chainable, ErrorKind, Result};
use crate::util::PathExt;

/// Every regular file below `root`, in sorted path order, for which `keep`
/// returns `true`. Hidden files and directories below `root` are never
/// visited, and editor temp files are skipped.
pub async fn files<F>(root: &Path, keep: F) -> Result<Vec<PathBuf>>
    where F: Fn(&Path) -> bool + Send + 'static
{
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || files_blocking(&root, keep)).await?
}

pub fn files_blocking<F>(root: &Path, keep: F) -> Result<Vec<PathBuf>>
    where F: Fn(&Path) -> bool
{
    let metadata = std::fs::metadata(root)
        .chain_with(|| error!("content root is not accessible", "root" => root.display()))?;

    if !metadata.is_dir() {
        return Err(error!("content root is not a directory", "root" => root.display())
            .with_kind(ErrorKind::Io));
    }

    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort(true)
        .skip_hidden(false)
        .process_read_dir(|depth, _, _, children| {
            // `None` is the read yielding `root` itself, which may be hidden.
            if depth.is_none() {
                return;
            }

            children.retain(|child| match child {
                Ok(entry) => !entry.file_name.to_string_lossy().starts_with('.'),
                Err(_) => true,
            });
        });

    let mut files = vec![];
    for entry in walker {
        let entry = entry.map_err(|e| error! {
            "failed to walk content directory",
            "root" => root.display(),
            "cause" => e,
        }.with_kind(ErrorKind::Io))?;

        let path = entry.path();
        if entry.file_type.is_file() && !path.is_temp_file() && keep(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn skips_hidden_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b/.cache")).unwrap();
        fs::write(root.join("b/.cache/x.md"), "").unwrap();
        fs::write(root.join("b/z.md"), "").unwrap();
        fs::write(root.join("a.md"), "").unwrap();
        fs::write(root.join("a.luau"), "").unwrap();
        fs::write(root.join(".env"), "").unwrap();
        fs::write(root.join("a.md~"), "").unwrap();
        fs::write(root.join("b/notes.bak"), "").unwrap();

        let files = files_blocking(root, |p| p.extension().map_or(true, |e| e != "luau")).unwrap();
        let files: Vec<_> = files.iter().map(|p| p.strip_prefix(root).unwrap()).collect();
        assert_eq!(files, [Path::new("a.md"), Path::new("b/z.md")]);
    }

    #[test]
    fn hidden_root_is_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("plain/.blog");
        fs::create_dir_all(root.join("posts")).unwrap();
        fs::write(root.join("index.luau"), "").unwrap();
        fs::write(root.join("posts/a.md"), "").unwrap();

        let files = files_blocking(&root, |_| true).unwrap();
        let files: Vec<_> = files.iter().map(|p| p.strip_prefix(&root).unwrap()).collect();
        assert_eq!(files, [Path::new("index.luau"), Path::new("posts/a.md")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let error = files_blocking(&dir.path().join("nope"), |_| true).unwrap_err();
        assert!(error.is(ErrorKind::Io));
    }
}
