use std::collections::BTreeMap;

use serde::Serialize;

use crate::entry::Entry;

/// Entries nested by the segments of their paths.
///
/// `posts/2024/a.md` is reachable as `tree["posts"]["2024"]["a.md"]`. The tree
/// is rebuilt from scratch for every render pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Tree(BTreeMap<String, Node>);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Node {
    Entry(Entry),
    Dir(Tree),
}

impl Tree {
    /// Builds the tree for `entries`. When two paths claim the same node the
    /// later entry wins: a file replaces a directory of the same name and
    /// vice versa.
    pub fn build<'a, I>(entries: I) -> Tree
        where I: IntoIterator<Item = &'a Entry>
    {
        let mut root = Tree::default();
        for entry in entries {
            root.insert(entry);
        }

        root
    }

    fn insert(&mut self, entry: &Entry) {
        let mut segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(leaf) = segments.pop() else {
            tracing::warn!(path = %entry.path, "entry has an empty path; leaving it out of the tree");
            return;
        };

        let mut dir = self;
        for segment in segments {
            let node = dir.0.entry(segment.to_string())
                .or_insert_with(|| Node::Dir(Tree::default()));

            if let Node::Entry(existing) = &*node {
                tracing::warn!(path = %entry.path, replaced = %existing.path,
                    "tree collision: directory replaces entry");

                *node = Node::Dir(Tree::default());
            }

            dir = match node {
                Node::Dir(tree) => tree,
                Node::Entry(_) => unreachable!("entry nodes were replaced above"),
            };
        }

        let replaced = dir.0.insert(leaf.to_string(), Node::Entry(entry.clone()));
        match replaced {
            Some(Node::Entry(old)) => tracing::warn!(path = %entry.path, replaced = %old.path,
                "tree collision: later entry wins"),
            Some(Node::Dir(_)) => tracing::warn!(path = %entry.path,
                "tree collision: entry replaces directory"),
            None => {}
        }
    }

    pub fn get(&self, segment: &str) -> Option<&Node> {
        self.0.get(segment)
    }

    /// The node at the `/`-separated `path`.
    pub fn lookup(&self, path: &str) -> Option<&Node> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let mut node = self.get(segments.next()?)?;
        for segment in segments {
            node = match node {
                Node::Dir(tree) => tree.get(segment)?,
                Node::Entry(_) => return None,
            };
        }

        Some(node)
    }

    /// The entry stored at `path`, if that node is an entry.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        match self.lookup(path)? {
            Node::Entry(entry) => Some(entry),
            Node::Dir(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
