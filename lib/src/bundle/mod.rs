//! Compiles a directory of Luau modules into one self-contained chunk.

mod config;
mod watch;

pub use config::{BundlerConfig, Target, Resolve, Output, WatchOptions};
pub use watch::CompilerWatch;
pub(crate) use watch::closed;

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;

use crate::error::{Chainable, ErrorKind, Result};
use crate::util::PathExt;
use crate::walk;

/// An in-memory file system the bundler writes its output into.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs(Arc<RwLock<BTreeMap<PathBuf, Arc<str>>>>);

impl MemoryFs {
    pub fn new() -> Self {
        MemoryFs::default()
    }

    pub fn write<P: Into<PathBuf>>(&self, path: P, contents: impl Into<Arc<str>>) {
        self.0.write().insert(path.into(), contents.into());
    }

    pub fn read(&self, path: &Path) -> Option<Arc<str>> {
        self.0.read().get(path).cloned()
    }
}

/// A compiled bundle and the virtual location it was written to.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub location: PathBuf,
    pub source: Arc<str>,
}

/// The outcome of one successful bundler run.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub fs: MemoryFs,
    pub location: PathBuf,
    /// Dotted names of the linked modules, in link order.
    pub modules: Vec<String>,
    pub elapsed: Duration,
}

impl Compilation {
    /// Reads the bundle back from the in-memory file system.
    pub fn bundle(&self) -> Result<Bundle> {
        let source = self.fs.read(&self.location).ok_or_else(|| error! {
            "compiled bundle is missing from the memory file system",
            "location" => self.location.display(),
        }.with_kind(ErrorKind::Compile))?;

        Ok(Bundle { location: self.location.clone(), source })
    }
}

#[derive(Debug)]
struct CachedModule {
    modified: SystemTime,
    source: Arc<str>,
}

struct Module {
    name: String,
    path: PathBuf,
    source: Arc<str>,
}

#[derive(Debug)]
pub struct Bundler {
    config: BundlerConfig,
    fs: MemoryFs,
    cache: BTreeMap<PathBuf, CachedModule>,
}

impl Bundler {
    pub fn new(config: BundlerConfig) -> Self {
        Bundler { config, fs: MemoryFs::new(), cache: BTreeMap::new() }
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.config
    }

    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }

    /// Discovers, checks and links every module below the entry directory.
    pub async fn run(&mut self) -> Result<Compilation> {
        let start = Instant::now();
        let root = self.config.root().to_path_buf();
        let exts = self.config.resolve.extensions.clone();
        let paths = walk::files(&root, move |path| path.has_extension_in(&exts)).await
            .chain_with(|| compile_error("failed to discover template modules"))?;

        if !paths.contains(&self.config.entry) {
            return Err(error! {
                "entry module does not exist",
                "entry" => self.config.entry.display(),
            }.with_kind(ErrorKind::Compile));
        }

        let mut modules: Vec<Module> = Vec::with_capacity(paths.len());
        for path in paths {
            let name = module_name(&root, &path)?;
            if let Some(other) = modules.iter().find(|m| m.name == name) {
                return Err(error! {
                    format!("two files define module `{name}`"),
                    "first" => other.path.display(),
                    "second" => path.display(),
                }.with_kind(ErrorKind::Compile));
            }

            let source = self.read(&path).await?;
            check_syntax(&name, &path, &source)?;
            modules.push(Module { name, path, source });
        }

        self.cache.retain(|path, _| modules.iter().any(|m| &m.path == path));

        let entry = module_name(&root, &self.config.entry)?;
        let chunk = link(&entry, &modules);
        let location = self.config.output.location();
        self.fs.write(location.clone(), chunk);

        let compilation = Compilation {
            fs: self.fs.clone(),
            location,
            modules: modules.into_iter().map(|m| m.name).collect(),
            elapsed: start.elapsed(),
        };

        tracing::debug!(modules = ?compilation.modules, elapsed = ?compilation.elapsed, "bundled templates");
        Ok(compilation)
    }

    async fn read(&mut self, path: &Path) -> Result<Arc<str>> {
        let read_error = || error!("failed to read template module", "path" => path.display())
            .with_kind(ErrorKind::Compile);

        let modified = tokio::fs::metadata(path).await
            .and_then(|m| m.modified())
            .chain_with(read_error)?;

        if self.config.cache {
            if let Some(cached) = self.cache.get(path).filter(|c| c.modified == modified) {
                return Ok(cached.source.clone());
            }
        }

        let source: Arc<str> = tokio::fs::read_to_string(path).await
            .chain_with(read_error)?
            .into();

        if self.config.cache {
            let cached = CachedModule { modified, source: source.clone() };
            self.cache.insert(path.to_path_buf(), cached);
        }

        Ok(source)
    }
}

fn compile_error(message: &str) -> crate::error::Error {
    error!(message).with_kind(ErrorKind::Compile)
}

/// `partials/head.luau` is `partials.head`; `partials/init.luau` is `partials`.
fn module_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path.with_extension("").to_slash_relative(root)?;
    let name = match relative.strip_suffix("/init") {
        Some(parent) => parent,
        None => &relative,
    };

    Ok(name.replace('/', "."))
}

fn check_syntax(name: &str, path: &Path, source: &str) -> Result<()> {
    let lua = mlua::Lua::new();
    lua.load(source)
        .set_name(format!("={name}"))
        .into_function()
        .map(|_| ())
        .chain_with(|| error! {
            format!("template module `{name}` failed to compile"),
            "path" => path.display(),
        }.with_kind(ErrorKind::Compile))
}

const PRELUDE: &str = r#"local __host_require = require
local __defs, __loaded, __loading = {}, {}, {}

local function require(name)
    local value = __loaded[name]
    if value ~= nil then
        return value
    end

    local def = __defs[name]
    if def == nil then
        return __host_require(name)
    end

    if __loading[name] then
        error("circular require of module `" .. name .. "`", 2)
    end

    __loading[name] = true
    value = def(name)
    __loading[name] = nil
    if value == nil then
        value = true
    end

    __loaded[name] = value
    return value
end
"#;

/// Links `modules` into a chunk that evaluates to the exports of `entry`.
fn link(entry: &str, modules: &[Module]) -> String {
    let size = modules.iter().map(|m| m.source.len() + 64).sum::<usize>();
    let mut chunk = String::with_capacity(PRELUDE.len() + size);
    chunk.push_str(PRELUDE);
    for module in modules {
        let _ = write!(chunk, "\n__defs[{:?}] = function(...)\n{}\nend\n", module.name, module.source);
    }

    let _ = write!(chunk, "\nreturn require({entry:?})\n");
    chunk
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::artifact::{ArtifactLoader, LuaLoader};
    use crate::entry::{Entry, EntrySet};
    use crate::render::RenderContext;
    use crate::artifact::Rendered;

    use super::*;

    fn config(root: &Path) -> BundlerConfig {
        let mut table = toml::Table::new();
        table.insert("entry".into(), root.join("index.luau").display().to_string().into());
        BundlerConfig::from_table(table).unwrap()
    }

    #[test]
    fn module_names() {
        let root = Path::new("/t");
        assert_eq!(module_name(root, Path::new("/t/index.luau")).unwrap(), "index");
        assert_eq!(module_name(root, Path::new("/t/partials/head.lua")).unwrap(), "partials.head");
        assert_eq!(module_name(root, Path::new("/t/layouts/init.luau")).unwrap(), "layouts");
        assert_eq!(module_name(root, Path::new("/t/init.luau")).unwrap(), "init");
    }

    #[tokio::test]
    async fn links_modules_and_host_modules() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("layouts")).unwrap();
        fs::write(root.join("index.luau"), r#"
            local layouts = require("layouts")
            local text = require("text")
            return {
                html = function(cx) return layouts.wrap(text.slugify(cx.entry.body)) end,
            }
        "#).unwrap();
        fs::write(root.join("layouts/init.luau"), r#"
            local head = require("layouts.head")
            return { wrap = function(s) return head .. s end }
        "#).unwrap();
        fs::write(root.join("layouts/head.luau"), "return '<head/>' -- trailing comment").unwrap();
        fs::write(root.join("post.md"), "not a module").unwrap();

        let mut bundler = Bundler::new(config(root));
        let compilation = bundler.run().await.unwrap();
        assert_eq!(compilation.modules, ["index", "layouts.head", "layouts"]);
        assert_eq!(compilation.location, Path::new("/memory-fs/papyre-bundle.luau"));
        assert!(bundler.fs().read(&compilation.location).is_some());

        let artifact = LuaLoader::default().load(&compilation.bundle().unwrap()).unwrap();
        let entries = std::sync::Arc::new(EntrySet::from(vec![Entry::new("a.md", "Hello World")]));
        let cx = RenderContext::new(entries[0].clone(), entries.clone());
        let html = artifact.lookup("html").unwrap().render(cx).await.unwrap();
        assert_eq!(html, Rendered::Text("<head/>hello-world".into()));
    }

    #[tokio::test]
    async fn syntax_errors_name_the_module() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.luau"), "return {}").unwrap();
        fs::write(root.join("broken.luau"), "local = 1").unwrap();

        let error = Bundler::new(config(root)).run().await.unwrap_err();
        assert!(error.is(ErrorKind::Compile));
        assert!(error.to_string().contains("`broken`"));
    }

    #[tokio::test]
    async fn circular_requires_fail_on_evaluation() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.luau"), "return require('a')").unwrap();
        fs::write(root.join("a.luau"), "return require('b')").unwrap();
        fs::write(root.join("b.luau"), "return require('a')").unwrap();

        let compilation = Bundler::new(config(root)).run().await.unwrap();
        let error = LuaLoader::default().load(&compilation.bundle().unwrap()).unwrap_err();
        assert!(error.is(ErrorKind::Compile));
        assert!(error.to_string().contains("circular require"));
    }

    #[tokio::test]
    async fn missing_entry_and_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("other.luau"), "return {}").unwrap();
        let error = Bundler::new(config(root)).run().await.unwrap_err();
        assert!(error.is(ErrorKind::Compile));

        fs::write(root.join("index.luau"), "return {}").unwrap();
        fs::write(root.join("other.lua"), "return {}").unwrap();
        let error = Bundler::new(config(root)).run().await.unwrap_err();
        assert!(error.to_string().contains("two files define module `other`"));
    }

    #[tokio::test]
    async fn unchanged_modules_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.luau"), "return {}").unwrap();

        fs::write(root.join("extra.luau"), "return 1").unwrap();

        let mut bundler = Bundler::new(config(root));
        bundler.run().await.unwrap();
        assert_eq!(bundler.cache.len(), 2);

        fs::remove_file(root.join("extra.luau")).unwrap();
        let compilation = bundler.run().await.unwrap();
        assert_eq!(compilation.modules, ["index"]);
        assert_eq!(bundler.cache.len(), 1);
    }
}
