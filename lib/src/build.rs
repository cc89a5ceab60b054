use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::artifact::{Artifact, ArtifactLoader, LuaLoader};
use crate::bundle::{Bundler, BundlerConfig, Compilation};
use crate::entry::{read_entries, EntrySet};
use crate::error::Result;
use crate::render::dispatch;
use crate::util::ms;

/// Where the time of one rebuild went.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Timing {
    /// A rebuild that started from a fresh compilation.
    Full { compile: Duration, eval: Duration, render: Duration },
    /// A rebuild triggered by a content change: reload and render only.
    Incremental { render: Duration },
}

/// The rendered entries of one build or rebuild.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildResult {
    pub entries: EntrySet,
    pub timing: Timing,
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timing::Full { compile, eval, render } => {
                write!(f, "Bundle: {}, eval: {}, build: {}", ms(*compile), ms(*eval), ms(*render))
            }
            Timing::Incremental { render } => write!(f, "Build: {}", ms(*render)),
        }
    }
}

/// Compiles the bundle described by `config` once, then renders every entry
/// below the entry module's directory with the Luau sandbox. Nothing is
/// written; see [`write_entries`](crate::write_entries).
pub async fn build(config: toml::Table) -> Result<BuildResult> {
    let config = BundlerConfig::from_table(config)?;
    build_with(config, &LuaLoader::default()).await
}

/// [`build`] with an already validated configuration and a custom loader.
pub async fn build_with<L>(config: BundlerConfig, loader: &L) -> Result<BuildResult>
    where L: ArtifactLoader + ?Sized
{
    let mut bundler = Bundler::new(config);
    let compilation = bundler.run().await?;

    let (artifact, eval) = evaluate(loader, &compilation)?;
    let start = Instant::now();
    let entries = read_entries(bundler.config().root(), bundler.config().code_extensions()).await?;
    let entries = dispatch(&artifact, Arc::new(entries)).await?;

    let timing = Timing::Full { compile: compilation.elapsed, eval, render: start.elapsed() };
    tracing::debug!(entries = entries.len(), %timing, "build finished");
    Ok(BuildResult { entries, timing })
}

/// Loads the artifact of `compilation`, timing the evaluation.
pub(crate) fn evaluate<L>(loader: &L, compilation: &Compilation) -> Result<(Arc<Artifact>, Duration)>
    where L: ArtifactLoader + ?Sized
{
    let start = Instant::now();
    let artifact = loader.load(&compilation.bundle()?)?;
    Ok((Arc::new(artifact), start.elapsed()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use crate::error::ErrorKind;

    use super::*;

    fn config(root: &Path) -> toml::Table {
        let mut table = toml::Table::new();
        table.insert("entry".into(), root.join("index.luau").display().to_string().into());
        table
    }

    #[test]
    fn timing_strings() {
        let full = Timing::Full {
            compile: Duration::from_millis(12),
            eval: Duration::from_micros(1_500),
            render: Duration::from_millis(3),
        };

        assert_eq!(full.to_string(), "Bundle: 12.00ms, eval: 1.50ms, build: 3.00ms");
        assert_eq!(Timing::Incremental { render: Duration::ZERO }.to_string(), "Build: 0.00ms");
    }

    #[tokio::test]
    async fn builds_a_site() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.luau"), r#"
            local markdown = require("markdown")
            return {
                html = function(cx)
                    return "<title>" .. cx.entry.title .. "</title>" .. markdown.render(cx.entry.body)
                end,
            }
        "#).unwrap();
        fs::write(root.join("a.md"), "---\ntitle: A\npapyre:\n  fn: html\n---\n*hi*\n").unwrap();
        fs::write(root.join("data.json"), r#"{"x": 1}"#).unwrap();

        let result = build(config(root)).await.unwrap();
        let bodies: Vec<_> = result.entries.iter().map(|e| (e.path.as_str(), e.body.as_str())).collect();
        assert_eq!(bodies, [("a.md", "<title>A</title><p><em>hi</em></p>\n"), ("data.json", "")]);
        assert!(matches!(result.timing, Timing::Full { .. }));
    }

    #[tokio::test]
    async fn first_failure_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.luau"), "return {}").unwrap();
        fs::write(root.join("a.md"), "---\npapyre: {fn: missing}\n---\n").unwrap();

        let error = build(config(root)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::RenderFunctionMissing);

        fs::write(root.join("b.json"), "{").unwrap();
        let error = build(config(root)).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);

        let error = build(toml::Table::new()).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Config);
    }
}
