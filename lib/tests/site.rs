use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use papyre::error::Result;
use papyre::{EntrySet, Timing, Watcher};

const INDEX: &str = r#"
local layouts = require("layouts")
local markdown = require("markdown")
local text = require("text")

local function count(tree)
    local n = 0
    for _, node in tree do
        if node.path ~= nil then
            n += 1
        else
            n += count(node)
        end
    end
    return n
end

return {
    site = { title = "Notes" },

    html = function(cx)
        local layout = layouts[cx.entry.papyre.layout or "page"]
        return layout(cx.entry, markdown.render(cx.entry.body))
    end,

    index = function(cx)
        local items = {}
        for _, entry in cx.entries do
            if entry.title ~= nil then
                table.insert(items, text.slugify(entry.title))
            end
        end
        return table.concat(items, ",") .. ";" .. tostring(count(cx.tree))
    end,
}
"#;

const LAYOUTS: &str = r#"
local template = require("template")

return {
    page = function(entry, content)
        return template.render("<h1>{{ title }}</h1>{{ content }}", { title = entry.title, content = content })
    end,
    post = function(entry, content)
        return "<article>" .. content .. "</article>"
    end,
}
"#;

fn site(root: &Path) -> toml::Table {
    fs::write(root.join("index.luau"), INDEX).unwrap();
    fs::write(root.join("layouts.luau"), LAYOUTS).unwrap();
    fs::create_dir_all(root.join("posts")).unwrap();
    fs::create_dir_all(root.join(".git")).unwrap();

    fs::write(root.join("about.md"), "---\ntitle: About Me\npapyre:\n  fn: html\n---\nhello").unwrap();
    fs::write(root.join("posts/first.md"), "+++\ntitle = \"First Post\"\n[papyre]\nfn = \"html\"\nlayout = \"post\"\n+++\n*one*").unwrap();
    fs::write(root.join("index.json"), r#"{"papyre": {"fn": "index"}}"#).unwrap();
    fs::write(root.join("robots.txt"), "User-agent: *").unwrap();
    fs::write(root.join(".git/HEAD"), "ref: main").unwrap();

    let mut table = toml::Table::new();
    table.insert("entry".into(), root.join("index.luau").display().to_string().into());
    table.insert("watch".into(), toml::toml! { aggregate_timeout = 50 }.into());
    table
}

#[tokio::test]
async fn build_rename_and_write() {
    let dir = tempfile::tempdir().unwrap();
    let config = site(dir.path());

    let mut result = papyre::build(config).await.unwrap();
    assert!(matches!(result.timing, Timing::Full { .. }));

    let bodies: BTreeMap<_, _> = result.entries.iter()
        .map(|e| (e.path.clone(), e.body.clone()))
        .collect();

    assert_eq!(bodies.len(), 4);
    assert_eq!(bodies["about.md"], "<h1>About Me</h1><p>hello</p>\n");
    assert_eq!(bodies["posts/first.md"], "<article><p><em>one</em></p>\n</article>");
    assert_eq!(bodies["index.json"], "about-me,first-post;4");
    assert_eq!(bodies["robots.txt"], "User-agent: *");

    let renames = BTreeMap::from([("md".to_string(), "html".to_string())]);
    papyre::rename_extensions(result.entries.iter_mut(), &renames);

    let out = dir.path().join("public");
    papyre::write_entries(&out, &result.entries).await.unwrap();
    assert_eq!(fs::read_to_string(out.join("about.html")).unwrap(), bodies["about.md"]);
    assert_eq!(fs::read_to_string(out.join("posts/first.html")).unwrap(), bodies["posts/first.md"]);
    assert!(!out.join(".git").exists());
}

async fn next(rx: &mut UnboundedReceiver<Result<(Timing, EntrySet)>>) -> Result<(Timing, EntrySet)> {
    tokio::time::timeout(Duration::from_secs(10), rx.recv()).await
        .expect("timed out waiting for a rebuild")
        .expect("session ended early")
}

#[tokio::test]
async fn watch_picks_up_content_changes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();
    let watcher = Watcher::start(site(&root)).unwrap();
    let handle = watcher.handle();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let session = tokio::spawn(watcher.run(move |result| {
        let _ = tx.send(result.map(|r| (r.timing, r.entries)));
        async {}
    }));

    let (timing, entries) = next(&mut rx).await.unwrap();
    assert!(matches!(timing, Timing::Full { .. }));
    assert_eq!(entries.len(), 4);

    fs::write(root.join("posts/second.md"), "---\ntitle: Second\npapyre: {fn: html, layout: post}\n---\ntwo").unwrap();
    loop {
        let (timing, entries) = next(&mut rx).await.unwrap();
        assert!(matches!(timing, Timing::Incremental { .. }));
        let second = entries.get("posts/second.md").map(|e| e.body.as_str());
        if second == Some("<article><p>two</p>\n</article>") {
            assert_eq!(entries.get("index.json").unwrap().body, "about-me,first-post,second;5");
            break;
        }
    }

    handle.deinit();
    let session = tokio::time::timeout(Duration::from_secs(10), session).await.unwrap().unwrap();
    assert_eq!(session.state(), papyre::watch::State::Closed);
}
