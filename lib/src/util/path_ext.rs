use std::path::{Path, Component};

use crate::error::Result;

pub trait PathExt: AsRef<Path> {
    /// `self` relative to `root`, with components joined by `/`.
    fn to_slash_relative(&self, root: &Path) -> Result<String>;

    /// Whether any component below `root` starts with a `.`.
    fn is_hidden_below(&self, root: &Path) -> bool;

    /// Whether the final extension of `self` is one of `exts`.
    fn has_extension_in<S: AsRef<str>>(&self, exts: &[S]) -> bool;

    /// Whether `self` names an editor swap or backup file.
    fn is_temp_file(&self) -> bool;
}

impl PathExt for Path {
    fn to_slash_relative(&self, root: &Path) -> Result<String> {
        let relative = self.strip_prefix(root).map_err(|_| error! {
            "path is not inside the content root",
            "path" => self.display(),
            "root" => root.display(),
        })?;

        let mut string = String::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    if !string.is_empty() {
                        string.push('/');
                    }

                    string.push_str(&part.to_string_lossy());
                }
                Component::CurDir => continue,
                _ => return err! {
                    "path escapes the content root",
                    "path" => self.display(),
                },
            }
        }

        Ok(string)
    }

    fn is_hidden_below(&self, root: &Path) -> bool {
        self.strip_prefix(root)
            .unwrap_or(self)
            .components()
            .any(|c| matches!(c, Component::Normal(s) if s.to_string_lossy().starts_with('.')))
    }

    fn has_extension_in<S: AsRef<str>>(&self, exts: &[S]) -> bool {
        let Some(ext) = self.extension() else {
            return false;
        };

        let ext = ext.to_string_lossy();
        exts.iter().any(|e| crate::util::normalize_extension(e.as_ref()) == ext)
    }

    fn is_temp_file(&self) -> bool {
        let name = self.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let ext = self.extension().map(|e| e.to_string_lossy()).unwrap_or_default();
        matches!(&*ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp") || name.ends_with('~')
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use super::PathExt;

    #[test]
    fn slash_relative() {
        let root = Path::new("/site/src");
        assert_eq!(Path::new("/site/src/posts/a.md").to_slash_relative(root).unwrap(), "posts/a.md");
        assert_eq!(Path::new("/site/src/./a.md").to_slash_relative(root).unwrap(), "a.md");
        assert!(Path::new("/elsewhere/a.md").to_slash_relative(root).is_err());
    }

    #[test]
    fn extension_checks() {
        let exts = [".luau", "lua"];
        assert!(Path::new("index.luau").has_extension_in(&exts));
        assert!(Path::new("a/b.lua").has_extension_in(&exts));
        assert!(!Path::new("a/b.md").has_extension_in(&exts));
        assert!(!Path::new("Makefile").has_extension_in(&exts));
    }

    #[test]
    fn hidden_components() {
        let root = Path::new("/site/.src");
        assert!(!Path::new("/site/.src/a.md").is_hidden_below(root));
        assert!(Path::new("/site/.src/.git/config").is_hidden_below(root));
        assert!(Path::new("/site/.src/posts/.a.md.swp").is_hidden_below(root));
    }

    #[test]
    fn temp_files() {
        assert!(Path::new("notes.bak").is_temp_file());
        assert!(Path::new("posts/a.md~").is_temp_file());
        assert!(Path::new("a.md.swp").is_temp_file());
        assert!(!Path::new("posts/a.md").is_temp_file());
        assert!(!Path::new("tmp/a.md").is_temp_file());
    }
}
