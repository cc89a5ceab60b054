#![doc = svgbobdoc::transform!(
//! Compile a directory of templates into render functions and use them to
//! render a tree of content files, once or continuously.
//!
//! # Overview
//!
//! A papyre site is one directory holding two kinds of files:
//!
//!   * **Templates**: Luau modules (`.luau`, `.lua`). One of them, the
//!     _entry_, returns a table whose function fields are _render functions_.
//!
//!   * **Content**: every other file. Each becomes an [`Entry`]: its path
//!     relative to the site directory, its body, and the metadata declared in
//!     its front matter (or, for `.json` and `.yaml` files, the whole file).
//!
//! A build flows one way:
//!
//! ```svgbob
//!  +-----------+   bundle   +----------+   evaluate   +----------+
//!  | templates |----------->| Bundle   |------------->| Artifact |--+
//!  +-----------+            +----------+              +----------+  |
//!                                                                   v
//!  +-----------+    load    +----------+    nest      +------+   dispatch
//!  | content   |----------->| EntrySet |------------->| Tree |--> render --> BuildResult
//!  +-----------+            +----------+              +------+
//! ```
//!
//! An entry whose metadata names a render function, as in
//!
//! ```yaml
//! ---
//! title: Hello
//! papyre:
//!   fn: html
//!   layout: post
//! ---
//! ```
//!
//! has its body replaced by what that function returns. The function is
//! called with `{ entry, entries, tree }`: the entry itself, every entry of
//! the build and the same entries nested by path segment. Entries that name
//! no function pass through untouched.
//!
//! ## Watching
//!
//! A [`Watcher`] keeps one [`WatchSession`] in sync with two event sources.
//! Template changes recompile the bundle and trigger a full rebuild. Content
//! changes reload only the changed file, then render every entry again.
//! Triggers never overlap: a recompilation that lands while a full rebuild is
//! running is dropped, and content changes wait their turn.
)]

#[macro_use]
pub mod error;
pub mod util;
pub mod format;
pub mod entry;
pub mod tree;
pub mod artifact;
pub mod render;
pub mod bundle;
pub mod build;
pub mod watch;
pub mod output;

mod walk;

pub use entry::{Entry, EntrySet};
pub use tree::{Tree, Node};
pub use artifact::{Artifact, ArtifactLoader, LuaLoader, HostModules, Rendered};
pub use render::RenderContext;
pub use build::{build, build_with, BuildResult, Timing};
pub use watch::{Watcher, WatchHandle, WatchSession};
pub use output::{write_entries, rename_extensions};
