use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use mlua::{Lua, LuaSerdeExt, Table};
use pulldown_cmark::{html, Options, Parser};

/// Builds a module table inside a fresh Lua state.
pub type HostModule = Arc<dyn Fn(&Lua) -> mlua::Result<Table> + Send + Sync>;

/// The modules a bundle may `require` without bundling them.
#[derive(Clone)]
pub struct HostModules {
    modules: BTreeMap<String, HostModule>,
}

impl HostModules {
    /// A registry with no modules at all.
    pub fn empty() -> Self {
        HostModules { modules: BTreeMap::new() }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, module: F) -> &mut Self
        where F: Fn(&Lua) -> mlua::Result<Table> + Send + Sync + 'static
    {
        self.modules.insert(name.into(), Arc::new(module));
        self
    }

    pub fn get(&self, name: &str) -> Option<&HostModule> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(|k| k.as_str())
    }

    /// Installs a global `require` resolving only the registered modules.
    pub(crate) fn install(&self, lua: &Lua) -> mlua::Result<()> {
        let modules = self.clone();
        let require = lua.create_function(move |lua, name: String| {
            match modules.get(&name) {
                Some(module) => module(lua),
                None => Err(mlua::Error::runtime(format!("module `{name}` not found"))),
            }
        })?;

        lua.globals().set("require", require)
    }
}

impl Default for HostModules {
    fn default() -> Self {
        let mut modules = HostModules::empty();
        modules.register("markdown", markdown)
            .register("template", template)
            .register("text", text);

        modules
    }
}

impl fmt::Debug for HostModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

pub fn render_markdown(input: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;

    let mut output = String::with_capacity(input.len() * 3 / 2);
    html::push_html(&mut output, Parser::new_ext(input, options));
    output
}

fn markdown(lua: &Lua) -> mlua::Result<Table> {
    let module = lua.create_table()?;
    module.set("render", lua.create_function(|_, text: String| Ok(render_markdown(&text)))?)?;
    Ok(module)
}

fn template(lua: &Lua) -> mlua::Result<Table> {
    let env = Arc::new(minijinja::Environment::new());
    let module = lua.create_table()?;
    let render = lua.create_function(move |lua, (source, cx): (String, mlua::Value)| {
        let cx: serde_json::Value = lua.from_value(cx)?;
        env.render_str(&source, &cx)
            .map_err(|e| mlua::Error::runtime(format!("template error: {e:#}")))
    })?;

    module.set("render", render)?;
    Ok(module)
}

fn text(lua: &Lua) -> mlua::Result<Table> {
    let module = lua.create_table()?;
    module.set("slugify", lua.create_function(|_, text: String| Ok(crate::util::slugify(&text)))?)?;
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(modules: &HostModules, chunk: &str) -> mlua::Result<String> {
        let lua = Lua::new();
        modules.install(&lua)?;
        lua.load(chunk).eval()
    }

    #[test]
    fn default_modules() {
        let modules = HostModules::default();
        let html = eval(&modules, r##"return require("markdown").render("# Hi *there*")"##).unwrap();
        assert_eq!(html, "<h1>Hi <em>there</em></h1>\n");

        let text = eval(&modules, r#"
            return require("template").render("{{ title }}: {{ items | join(', ') }}", {
                title = "List", items = { "a", "b" },
            })
        "#).unwrap();
        assert_eq!(text, "List: a, b");

        let slug = eval(&modules, r#"return require("text").slugify("Hello, World!")"#).unwrap();
        assert_eq!(slug, "hello-world");
    }

    #[test]
    fn unknown_modules_are_named() {
        let error = eval(&HostModules::empty(), r#"return require("markdown")"#).unwrap_err();
        assert!(error.to_string().contains("module `markdown` not found"));
    }

    #[test]
    fn custom_modules() {
        let mut modules = HostModules::empty();
        modules.register("site", |lua| {
            let table = lua.create_table()?;
            table.set("name", "papyre")?;
            Ok(table)
        });

        assert_eq!(eval(&modules, r#"return require("site").name"#).unwrap(), "papyre");
    }
}
