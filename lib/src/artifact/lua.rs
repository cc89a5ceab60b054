use std::sync::{Arc, Weak};

use mlua::{Function, Lua, LuaSerdeExt, SerializeOptions, Table, Value};
use parking_lot::Mutex;

use crate::artifact::{Artifact, ArtifactLoader, Export, HostModules, RenderFn, RenderFuture, Rendered};
use crate::bundle::Bundle;
use crate::error::{Chainable, ErrorKind, Result};
use crate::entry::EntrySet;
use crate::render::RenderContext;
use crate::tree::Tree;

/// Evaluates Luau bundles, each in its own sandboxed state.
#[derive(Debug, Clone, Default)]
pub struct LuaLoader {
    modules: HostModules,
}

struct LuaRenderFn {
    lua: Lua,
    name: String,
    func: Function,
    shared: Arc<Mutex<Option<SharedContext>>>,
}

/// The Lua form of the `entries` and `tree` of one dispatch. Every render of
/// that dispatch sees the same frozen tables; only `entry` is converted per
/// call. The weak pointers pin the allocations, so an address match is a
/// match on the same sets.
struct SharedContext {
    entries: Weak<EntrySet>,
    tree: Weak<Tree>,
    values: (Value, Value),
}

impl LuaLoader {
    pub fn new(modules: HostModules) -> Self {
        LuaLoader { modules }
    }

    pub fn modules(&self) -> &HostModules {
        &self.modules
    }

    fn state(&self) -> mlua::Result<Lua> {
        let lua = Lua::new();
        self.modules.install(&lua)?;
        lua.sandbox(true)?;
        Ok(lua)
    }
}

impl ArtifactLoader for LuaLoader {
    fn load(&self, bundle: &Bundle) -> Result<Artifact> {
        let compile_error = || error! {
            "failed to evaluate template bundle",
            "location" => bundle.location.display(),
        }.with_kind(ErrorKind::Compile);

        let lua = self.state().chain_with(compile_error)?;
        let exports = lua.load(&*bundle.source)
            .set_name(format!("={}", bundle.location.display()))
            .eval::<Value>()
            .chain_with(compile_error)?;

        let Value::Table(exports) = exports else {
            return Err(error! {
                "template bundle must return a table of exports",
                "found" => exports.type_name(),
            }.chain(compile_error()));
        };

        let shared = Arc::new(Mutex::new(None));
        let mut artifact = Artifact::new();
        for pair in exports.pairs::<Value, Value>() {
            let (key, value) = pair.chain_with(compile_error)?;
            let Value::String(key) = key else {
                tracing::debug!(key = key.type_name(), "skipping export with a non-string key");
                continue;
            };

            let name = key.to_string_lossy();
            let export = match value {
                Value::Function(func) => {
                    let shared = shared.clone();
                    let func = LuaRenderFn { lua: lua.clone(), name: name.clone(), func, shared };
                    Export::Render(Arc::new(func))
                }
                other => Export::Value(other.type_name()),
            };

            artifact.insert(name, export);
        }

        tracing::debug!(exports = ?artifact, "evaluated bundle");
        Ok(artifact)
    }
}

fn serialize_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

/// Makes `value` and every table reachable through it read-only.
fn freeze(value: &Value) -> mlua::Result<()> {
    if let Value::Table(table) = value {
        table.set_readonly(true);
        for pair in table.pairs::<Value, Value>() {
            freeze(&pair?.1)?;
        }
    }

    Ok(())
}

impl LuaRenderFn {
    /// The converted `entries` and `tree` of `cx`, reusing the previous
    /// conversion when `cx` shares both with the previous call.
    fn shared_values(&self, cx: &RenderContext) -> mlua::Result<(Value, Value)> {
        let mut shared = self.shared.lock();
        if let Some(cached) = &*shared {
            let entries = std::ptr::eq(cached.entries.as_ptr(), Arc::as_ptr(&cx.entries));
            let tree = std::ptr::eq(cached.tree.as_ptr(), Arc::as_ptr(&cx.tree));
            if entries && tree {
                return Ok(cached.values.clone());
            }
        }

        let values = (
            self.lua.to_value_with(&*cx.entries, serialize_options())?,
            self.lua.to_value_with(&*cx.tree, serialize_options())?,
        );

        freeze(&values.0)?;
        freeze(&values.1)?;
        *shared = Some(SharedContext {
            entries: Arc::downgrade(&cx.entries),
            tree: Arc::downgrade(&cx.tree),
            values: values.clone(),
        });

        Ok(values)
    }

    fn context(&self, cx: &RenderContext) -> mlua::Result<Table> {
        let (entries, tree) = self.shared_values(cx)?;
        let table = self.lua.create_table()?;
        table.set("entry", self.lua.to_value_with(&cx.entry, serialize_options())?)?;
        table.set("entries", entries)?;
        table.set("tree", tree)?;
        Ok(table)
    }

    fn call(&self, cx: &RenderContext) -> mlua::Result<Rendered> {
        let cx = self.context(cx)?;
        let rendered = match self.func.call::<Value>(cx)? {
            Value::String(string) => Rendered::Text(string.to_string_lossy()),
            other => Rendered::Other(other.type_name()),
        };

        Ok(rendered)
    }
}

impl RenderFn for LuaRenderFn {
    fn render(&self, cx: RenderContext) -> RenderFuture {
        let result = self.call(&cx).chain_with(|| error! {
            format!("render function `{}` raised an error", self.name),
            "entry" => &cx.entry.path,
        });

        Box::pin(std::future::ready(result))
    }
}
