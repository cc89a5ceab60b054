//! The executable side of a build: named render functions exported by the
//! evaluated template bundle.

mod lua;
mod host;

pub use lua::LuaLoader;
pub use host::{HostModules, HostModule};

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::render::RenderContext;

/// What a render function produced. Only text becomes an entry body.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    /// Anything else, by type name.
    Other(&'static str),
}

pub type RenderFuture = Pin<Box<dyn Future<Output = Result<Rendered>> + Send>>;

/// A callable export: `(RenderContext) -> string`, immediately or eventually.
pub trait RenderFn: Send + Sync {
    fn render(&self, cx: RenderContext) -> RenderFuture;
}

#[derive(Clone)]
pub enum Export {
    Render(Arc<dyn RenderFn>),
    /// A non-callable binding and its type name.
    Value(&'static str),
}

/// Why an export could not be used as a render function.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    NotFound,
    NotCallable { kind: &'static str },
}

/// The exports of one evaluated bundle.
#[derive(Clone, Default)]
pub struct Artifact {
    exports: BTreeMap<String, Export>,
}

/// Turns a compiled bundle into an [`Artifact`].
pub trait ArtifactLoader: Send + Sync {
    fn load(&self, bundle: &Bundle) -> Result<Artifact>;
}

struct AsyncFn<F>(F);

struct SyncFn<F>(F);

impl<F, Fut, R> RenderFn for AsyncFn<F>
    where F: Fn(RenderContext) -> Fut + Send + Sync,
          Fut: Future<Output = Result<R>> + Send + 'static,
          R: Into<Rendered> + Send + 'static,
{
    fn render(&self, cx: RenderContext) -> RenderFuture {
        let future = (self.0)(cx);
        Box::pin(async move { future.await.map(Into::into) })
    }
}

impl<F, R> RenderFn for SyncFn<F>
    where F: Fn(RenderContext) -> Result<R> + Send + Sync,
          R: Into<Rendered>,
{
    fn render(&self, cx: RenderContext) -> RenderFuture {
        let result = (self.0)(cx).map(Into::into);
        Box::pin(std::future::ready(result))
    }
}

impl Artifact {
    pub fn new() -> Self {
        Artifact::default()
    }

    /// Exports `f`, an async render function, as `name`.
    pub fn render<F, Fut, R>(mut self, name: impl Into<String>, f: F) -> Self
        where F: Fn(RenderContext) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<R>> + Send + 'static,
              R: Into<Rendered> + Send + 'static,
    {
        self.insert(name, Export::Render(Arc::new(AsyncFn(f))));
        self
    }

    /// Exports `f`, a synchronous render function, as `name`.
    pub fn render_sync<F, R>(mut self, name: impl Into<String>, f: F) -> Self
        where F: Fn(RenderContext) -> Result<R> + Send + Sync + 'static,
              R: Into<Rendered> + 'static,
    {
        self.insert(name, Export::Render(Arc::new(SyncFn(f))));
        self
    }

    /// Exports a non-callable binding of type `kind` as `name`.
    pub fn value(mut self, name: impl Into<String>, kind: &'static str) -> Self {
        self.insert(name, Export::Value(kind));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, export: Export) {
        self.exports.insert(name.into(), export);
    }

    pub fn lookup(&self, name: &str) -> Result<&Arc<dyn RenderFn>, LookupError> {
        match self.exports.get(name) {
            Some(Export::Render(f)) => Ok(f),
            Some(Export::Value(kind)) => Err(LookupError::NotCallable { kind: *kind }),
            None => Err(LookupError::NotFound),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exports.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, export) in &self.exports {
            match export {
                Export::Render(_) => map.entry(name, &"function"),
                Export::Value(kind) => map.entry(name, kind),
            };
        }

        map.finish()
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NotFound => write!(f, "no such export"),
            LookupError::NotCallable { kind } => write!(f, "export is a {kind}, not a function"),
        }
    }
}

impl From<String> for Rendered {
    fn from(string: String) -> Self {
        Rendered::Text(string)
    }
}

impl From<&str> for Rendered {
    fn from(string: &str) -> Self {
        Rendered::Text(string.to_string())
    }
}

impl From<serde_json::Value> for Rendered {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(string) => Rendered::Text(string),
            other => Rendered::Other(crate::format::json_kind(&other)),
        }
    }
}
