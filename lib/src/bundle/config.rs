use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use toml::{Table, Value};

use crate::error::{Chainable, ErrorKind, Result};

pub const OUTPUT_DIR: &str = "/memory-fs/";
pub const OUTPUT_NAME: &str = "papyre-bundle.luau";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BundlerConfig {
    /// Absolute path of the entry module. Its directory is both the module
    /// root and the content root.
    pub entry: PathBuf,
    pub target: Target,
    pub cache: bool,
    #[serde(default)]
    pub resolve: Resolve,
    pub output: Output,
    #[serde(default)]
    pub watch: WatchOptions,
    /// Keys the bundler does not interpret.
    #[serde(flatten)]
    pub passthrough: Table,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Luau,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Resolve {
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Output {
    pub path: PathBuf,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Milliseconds to wait for further changes before recompiling.
    pub aggregate_timeout: u64,
}

impl Default for Resolve {
    fn default() -> Self {
        Resolve { extensions: vec![".luau".into(), ".lua".into()] }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions { aggregate_timeout: 300 }
    }
}

impl Output {
    pub fn location(&self) -> PathBuf {
        self.path.join(&self.filename)
    }
}

fn defaults() -> Table {
    let mut table = Table::new();
    table.insert("target".into(), "luau".into());
    table.insert("cache".into(), true.into());

    let mut resolve = Table::new();
    let extensions = Resolve::default().extensions.into_iter().map(Value::from).collect::<Vec<_>>();
    resolve.insert("extensions".into(), extensions.into());
    table.insert("resolve".into(), resolve.into());

    let mut watch = Table::new();
    watch.insert("aggregate_timeout".into(), 300i64.into());
    table.insert("watch".into(), watch.into());
    table
}

fn overrides() -> Table {
    let mut output = Table::new();
    output.insert("path".into(), OUTPUT_DIR.into());
    output.insert("filename".into(), OUTPUT_NAME.into());

    let mut table = Table::new();
    table.insert("target".into(), "luau".into());
    table.insert("output".into(), output.into());
    table
}

/// Shallow merge: top-level keys of later tables replace earlier ones.
fn patch(layers: [Table; 3]) -> Table {
    let mut merged = Table::new();
    for layer in layers {
        merged.extend(layer);
    }

    merged
}

impl BundlerConfig {
    /// Validates `caller` and resolves it against the built-in defaults and
    /// the settings the pipeline always imposes.
    pub fn from_table(caller: Table) -> Result<Self> {
        validate_entry(caller.get("entry"))?;

        let config: BundlerConfig = Value::Table(patch([defaults(), caller, overrides()]))
            .try_into()
            .chain_with(|| error!("invalid bundler configuration").with_kind(ErrorKind::Config))?;

        for key in config.passthrough.keys() {
            tracing::debug!(key = %key, "ignoring bundler option");
        }

        Ok(config)
    }

    /// The directory containing the entry module.
    pub fn root(&self) -> &Path {
        // `from_table` guarantees an absolute entry with a parent.
        self.entry.parent().unwrap_or(&self.entry)
    }

    pub fn code_extensions(&self) -> &[String] {
        &self.resolve.extensions
    }

    pub fn aggregate_timeout(&self) -> Duration {
        Duration::from_millis(self.watch.aggregate_timeout)
    }
}

fn validate_entry(entry: Option<&Value>) -> Result<()> {
    let entry = match entry {
        Some(Value::String(entry)) => Path::new(entry),
        Some(other) => return Err(error! {
            "bundler `entry` must be a string",
            "found" => other.type_str(),
        }.with_kind(ErrorKind::Config)),
        None => return Err(error!("bundler configuration requires an `entry`")
            .with_kind(ErrorKind::Config)),
    };

    if !entry.is_absolute() {
        return Err(error! {
            "bundler `entry` must be an absolute path",
            "entry" => entry.display(),
        }.with_kind(ErrorKind::Config));
    }

    match entry.parent() {
        Some(_) if entry.file_name().is_some() => Ok(()),
        _ => Err(error! {
            "bundler `entry` must name a file inside a directory",
            "entry" => entry.display(),
        }.with_kind(ErrorKind::Config)),
    }
}
