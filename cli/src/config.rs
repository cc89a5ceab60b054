use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use papyre::error::{Chainable, ErrorKind, Result};
use papyre::error;

pub const CONFIG_FILE: &str = "papyre.toml";

/// The contents of `papyre.toml`.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::default_output")]
    pub output: PathBuf,
    /// Extension renames applied before writing, e.g. `md = "html"`.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    /// Handed to the bundler as is, apart from resolving `entry`.
    #[serde(default)]
    pub bundler: toml::Table,
}

impl Settings {
    fn default_output() -> PathBuf {
        PathBuf::from("public")
    }

    /// Reads the settings at `path`. Relative paths inside are resolved
    /// against the directory containing the file.
    pub fn read(path: &Path) -> Result<Self> {
        let string = std::fs::read_to_string(path)
            .chain_with(|| error!("failed to read configuration", "path" => path.display()))?;

        let mut settings = Settings::parse(&string)
            .chain_with(|| error!("invalid configuration", "path" => path.display()))?;

        let dir = path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let dir = std::path::absolute(dir)
            .chain_with(|| error!("failed to resolve configuration directory", "path" => path.display()))?;

        settings.resolve(&dir);
        if let Some(root) = settings.content_root() {
            if settings.output.starts_with(root) {
                tracing::warn!(output = %settings.output.display(), "output directory is inside the site");
            }
        }

        Ok(settings)
    }

    pub fn parse(string: &str) -> Result<Self> {
        let deserializer = toml::Deserializer::new(string);
        let settings = serde_ignored::deserialize(deserializer, |key| {
            tracing::warn!(key = %key, "ignoring unknown configuration key");
        });

        settings.map_err(|e| papyre::error::Error::from(e).with_kind(ErrorKind::Config))
    }

    /// The directory holding the entry module, once resolved.
    fn content_root(&self) -> Option<&Path> {
        self.bundler.get("entry")?.as_str().and_then(|entry| Path::new(entry).parent())
    }

    fn resolve(&mut self, dir: &Path) {
        if let Some(toml::Value::String(entry)) = self.bundler.get_mut("entry") {
            if Path::new(entry.as_str()).is_relative() {
                *entry = dir.join(&*entry).to_string_lossy().into_owned();
            }
        }

        if self.output.is_relative() {
            self.output = dir.join(&self.output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_resolution() {
        let mut settings = Settings::parse(r#"
            [bundler]
            entry = "site/index.luau"
        "#).unwrap();

        assert_eq!(settings.output, Path::new("public"));
        assert!(settings.rename.is_empty());

        settings.resolve(Path::new("/srv/blog"));
        assert_eq!(settings.output, Path::new("/srv/blog/public"));
        assert_eq!(settings.bundler["entry"].as_str(), Some("/srv/blog/site/index.luau"));
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut settings = Settings::parse(r#"
            output = "/tmp/out"

            [rename]
            md = "html"

            [bundler]
            entry = "/abs/index.luau"
        "#).unwrap();

        settings.resolve(Path::new("/srv/blog"));
        assert_eq!(settings.output, Path::new("/tmp/out"));
        assert_eq!(settings.bundler["entry"].as_str(), Some("/abs/index.luau"));
        assert_eq!(settings.rename["md"], "html");
    }

    #[test]
    fn unknown_keys_are_not_fatal() {
        let settings = Settings::parse("title = \"x\"\n[bundler]\nentry = \"/a/index.luau\"\n");
        assert!(settings.is_ok());
    }

    #[test]
    fn malformed_settings_are_config_errors() {
        let error = Settings::parse("output = 3").unwrap_err();
        assert!(error.is(ErrorKind::Config));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[bundler]\nentry = \"index.luau\"\n").unwrap();

        let settings = Settings::read(&path).unwrap();
        let entry = PathBuf::from(settings.bundler["entry"].as_str().unwrap());
        assert!(entry.is_absolute());
        assert!(entry.ends_with("index.luau"));
        assert!(settings.output.ends_with("public"));
    }
}
