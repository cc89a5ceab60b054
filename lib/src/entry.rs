//! Content entries and the loader that reads them from disk.

use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, Result, Chainable};
use crate::format::{json_kind, Format, FrontMatter, Json, Metadata, Yaml};
use crate::util::PathExt;
use crate::walk;

/// One content file: its root-relative path, its body, and any metadata its
/// front matter or data declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub path: String,
    pub body: String,
    #[serde(flatten)]
    pub meta: Metadata,
}

/// An ordered list of entries, unique by `path`.
#[derive(Debug, Clone, Default, PartialEq, Deref, From, Serialize)]
#[serde(transparent)]
pub struct EntrySet(Vec<Entry>);

impl Entry {
    pub fn new<P: Into<String>, B: Into<String>>(path: P, body: B) -> Self {
        Entry { path: path.into(), body: body.into(), meta: Metadata::new() }
    }

    /// Merges `meta` over `self`. String `path` and `body` keys replace the
    /// base fields; any other type for those keys is rejected.
    pub fn merge(mut self, meta: Metadata) -> Result<Self> {
        for (key, value) in meta {
            let value = match (key.as_str(), value) {
                ("path", Value::String(path)) => { self.path = path; continue }
                ("body", Value::String(body)) => { self.body = body; continue }
                (field @ ("path" | "body"), other) => return Err(error! {
                    format!("metadata field `{field}` must be a string"),
                    "found" => json_kind(&other),
                    "entry" => &self.path,
                }.with_kind(ErrorKind::Parse)),
                (_, value) => value,
            };

            self.meta.insert(key, value);
        }

        Ok(self)
    }

    /// The `papyre` settings object, if the entry has one.
    pub fn settings(&self) -> Option<&Metadata> {
        self.meta.get("papyre")?.as_object()
    }

    /// The raw `papyre.fn` value naming this entry's render function.
    pub fn render_fn(&self) -> Option<&Value> {
        self.settings()?.get("fn").filter(|v| !v.is_null())
    }
}

impl EntrySet {
    pub fn new() -> Self {
        EntrySet::default()
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.0.iter().find(|e| e.path == path)
    }

    pub fn position(&self, path: &str) -> Option<usize> {
        self.0.iter().position(|e| e.path == path)
    }

    /// Replaces the entry with the same path in place, or appends `entry`.
    pub fn upsert(&mut self, entry: Entry) {
        match self.position(&entry.path) {
            Some(i) => self.0[i] = entry,
            None => self.0.push(entry),
        }
    }

    pub fn retain<F: FnMut(&Entry) -> bool>(&mut self, f: F) {
        self.0.retain(f)
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entry> {
        self.0.iter_mut()
    }
}

impl FromIterator<Entry> for EntrySet {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        EntrySet(iter.into_iter().collect())
    }
}

impl IntoIterator for EntrySet {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntrySet {
    type Item = &'a Entry;
    type IntoIter = std::slice::Iter<'a, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Builds an entry for the file at `path` from its `contents`.
pub fn parse_entry(root: &Path, path: &Path, contents: &str) -> Result<Entry> {
    let rel = path.to_slash_relative(root)?;
    let parse_error = || error!("failed to parse content file", "path" => path.display())
        .with_kind(ErrorKind::Parse);

    let ext = path.extension().map(|e| e.to_string_lossy().to_ascii_lowercase());
    let (body, meta) = match ext.as_deref() {
        Some("json") => ("", Json::metadata(contents).chain_with(parse_error)?),
        Some("yml" | "yaml") => ("", Yaml::metadata(contents).chain_with(parse_error)?),
        _ => {
            let front_matter = FrontMatter::parse(contents).chain_with(parse_error)?;
            (front_matter.body, front_matter.attributes)
        }
    };

    let entry = Entry::new(rel, body);
    match meta {
        Some(meta) => entry.merge(meta).chain_with(parse_error),
        None => Ok(entry),
    }
}

/// Reads the file at `path` into an entry, or `None` if it no longer exists.
pub async fn read_entry_if_exists(root: &Path, path: &Path) -> Result<Option<Entry>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).chain_with(|| error! {
            "failed to read content file",
            "path" => path.display(),
        }),
    };

    let contents = match String::from_utf8(bytes) {
        Ok(string) => string,
        Err(e) => {
            tracing::warn!(path = %path.display(), "content file is not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    parse_entry(root, path, &contents).map(Some)
}

/// Reads the file at `path` into an entry.
pub async fn read_entry(root: &Path, path: &Path) -> Result<Entry> {
    match read_entry_if_exists(root, path).await? {
        Some(entry) => Ok(entry),
        None => Err(error! {
            "content file does not exist",
            "path" => path.display(),
        }.with_kind(ErrorKind::Io)),
    }
}

/// Reads every content file below `root`, skipping hidden files and files
/// with one of `code_exts`. Reads are issued concurrently; the result is in
/// sorted path order.
pub async fn read_entries<S: AsRef<str>>(root: &Path, code_exts: &[S]) -> Result<EntrySet> {
    let exts: Vec<String> = code_exts.iter().map(|e| e.as_ref().to_string()).collect();
    let paths = walk::files(root, move |path| !path.has_extension_in(&exts)).await?;
    tracing::debug!(root = %root.display(), files = paths.len(), "loading entries");

    let root: PathBuf = root.to_path_buf();
    let tasks: Vec<_> = paths.into_iter()
        .map(|path| {
            let root = root.clone();
            tokio::spawn(async move { read_entry(&root, &path).await })
        })
        .collect();

    let mut entries = Vec::with_capacity(tasks.len());
    for task in tasks {
        entries.push(task.await??);
    }

    Ok(EntrySet(entries))
}
