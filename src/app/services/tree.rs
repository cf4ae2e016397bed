// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Lazily-populated virtual tree over a remote subtree.
//!
//! Nodes live in an arena addressed by index; children store indices and a
//! parent index, so bulk subtree invalidation is a cheap "drop the indices"
//! operation with no reference cycles. A node's children are either unknown
//! (`None`) or a complete sorted snapshot as of the last population call;
//! partial population is never exposed.

use crate::app::ports::RemoteFsPort;
use crate::util::remote_path;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    /// Used for the synthetic root.
    Descending,
}

#[derive(Debug)]
struct Node {
    path: String,
    is_dir: bool,
    parent: Option<NodeId>,
    /// `None` = not yet loaded; `Some(vec![])` = loaded, empty.
    children: Option<Vec<NodeId>>,
}

pub struct VirtualTree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
    root: NodeId,
    order: SortOrder,
}

impl VirtualTree {
    pub fn new(root_path: &str, order: SortOrder) -> Self {
        let root_node = Node {
            path: remote_path::normalize(root_path),
            is_dir: true,
            parent: None,
            children: None,
        };
        Self {
            nodes: vec![Some(root_node)],
            free: Vec::new(),
            root: 0,
            order,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.order = order;
    }

    pub fn path(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.path.as_str())
    }

    pub fn is_dir(&self, id: NodeId) -> bool {
        self.node(id).map(|n| n.is_dir).unwrap_or(false)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Whether the node's children are loaded (the "expanded" capture uses
    /// this; files are created pre-loaded as empty).
    pub fn is_populated(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| n.children.is_some())
            .unwrap_or(false)
    }

    /// Child count, populating from the remote filesystem on first access.
    pub async fn child_count(&mut self, id: NodeId, client: &dyn RemoteFsPort) -> usize {
        self.populate(id, client).await;
        self.node(id)
            .and_then(|n| n.children.as_ref())
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// Index-addressed child of an already-populated node.
    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.node(id)
            .and_then(|n| n.children.as_ref())
            .and_then(|c| c.get(index))
            .copied()
    }

    /// Explicitly load a directory's children (same as the first
    /// `child_count` access).
    pub async fn expand(&mut self, id: NodeId, client: &dyn RemoteFsPort) {
        self.populate(id, client).await;
    }

    /// Walk down from the root toward `path`, loading children on demand.
    /// Returns `None` when no prefix match exists at some level.
    pub async fn find_node_by_path(
        &mut self,
        path: &str,
        client: &dyn RemoteFsPort,
    ) -> Option<NodeId> {
        let target = remote_path::normalize(path);
        let mut cur = self.root;
        loop {
            let cur_path = self.node(cur)?.path.clone();
            if cur_path == target {
                return Some(cur);
            }
            if !self.is_strict_ancestor(&cur_path, &target) {
                return None;
            }
            self.populate(cur, client).await;
            let children = self.node(cur)?.children.as_ref()?.clone();
            let mut next = None;
            for child in children {
                let child_path = &self.node(child)?.path;
                if *child_path == target || self.is_strict_ancestor(child_path, &target) {
                    next = Some(child);
                    break;
                }
            }
            cur = next?;
        }
    }

    /// Discard the cached subtree below `id` and mark it unknown again.
    /// Returns the paths that were expanded at the time, so the presentation
    /// layer can replay the expansion after re-population. Best-effort: a
    /// capture racing a concurrent remote mutation may miss new paths.
    pub fn refresh(&mut self, id: NodeId) -> Vec<String> {
        let mut expanded = Vec::new();
        self.capture_expanded(id, &mut expanded);
        let children = match self.node_mut(id) {
            Some(node) => node.children.take(),
            None => None,
        };
        if let Some(children) = children {
            for child in children {
                self.drop_subtree(child);
            }
        }
        expanded
    }

    fn capture_expanded(&self, id: NodeId, out: &mut Vec<String>) {
        let Some(node) = self.node(id) else { return };
        if !node.is_dir {
            return;
        }
        let Some(children) = node.children.as_ref() else {
            return;
        };
        out.push(node.path.clone());
        for child in children {
            self.capture_expanded(*child, out);
        }
    }

    fn drop_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id).and_then(Option::take) else {
            return;
        };
        if let Some(children) = node.children {
            for child in children {
                self.drop_subtree(child);
            }
        }
        self.free.push(id);
    }

    async fn populate(&mut self, id: NodeId, client: &dyn RemoteFsPort) {
        let (path, pending) = match self.node(id) {
            Some(node) => (node.path.clone(), node.is_dir && node.children.is_none()),
            None => return,
        };
        if !pending {
            return;
        }
        // A node deleted out from under the cache degrades to zero children
        // instead of erroring from deep inside a UI callback chain.
        let mut entries = match client.list(&path).await {
            Ok(entries) => entries,
            Err(err) => {
                if !err.is_not_found() {
                    tracing::warn!(%path, "listing failed, treating as empty: {err}");
                }
                Vec::new()
            }
        };
        entries.sort_by(|a, b| {
            let ord = a.name.to_lowercase().cmp(&b.name.to_lowercase());
            match self.order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = Node {
                path: remote_path::join(&path, &entry.name),
                is_dir: entry.is_dir,
                parent: Some(id),
                // files are never listable; create them loaded-empty
                children: if entry.is_dir { None } else { Some(Vec::new()) },
            };
            children.push(self.alloc(child));
        }
        if let Some(node) = self.node_mut(id) {
            node.children = Some(children);
        }
    }

    fn is_strict_ancestor(&self, ancestor: &str, path: &str) -> bool {
        if ancestor == "/" {
            return path != "/";
        }
        path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'/')
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::Mutex;

    use crate::app::errors::{FarmError, FarmResult};
    use crate::app::types::{RemoteDirEntry, RemoteStat};

    #[derive(Default)]
    struct FakeRemoteFs {
        entries: Mutex<BTreeMap<String, bool>>,
        list_calls: Mutex<Vec<String>>,
    }

    impl FakeRemoteFs {
        fn with_entries(entries: &[(&str, bool)]) -> Self {
            let fs = Self::default();
            {
                let mut map = fs.entries.lock().unwrap();
                for (path, is_dir) in entries {
                    map.insert(path.to_string(), *is_dir);
                }
            }
            fs
        }

        fn remove_subtree(&self, path: &str) {
            let mut map = self.entries.lock().unwrap();
            let prefix = format!("{path}/");
            map.retain(|k, _| k != path && !k.starts_with(&prefix));
        }

        fn list_calls(&self) -> Vec<String> {
            self.list_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteFsPort for FakeRemoteFs {
        async fn stat(&self, path: &str) -> FarmResult<RemoteStat> {
            match self.entries.lock().unwrap().get(path) {
                Some(is_dir) => Ok(RemoteStat { is_dir: *is_dir }),
                None => Err(FarmError::NotFound(path.to_string())),
            }
        }

        async fn list(&self, path: &str) -> FarmResult<Vec<RemoteDirEntry>> {
            self.list_calls.lock().unwrap().push(path.to_string());
            let entries = self.entries.lock().unwrap();
            if !entries.contains_key(path) {
                return Err(FarmError::NotFound(path.to_string()));
            }
            let prefix = format!("{path}/");
            let mut out = Vec::new();
            for (candidate, is_dir) in entries.iter() {
                if let Some(rest) = candidate.strip_prefix(&prefix) {
                    if !rest.is_empty() && !rest.contains('/') {
                        out.push(RemoteDirEntry {
                            name: rest.to_string(),
                            is_dir: *is_dir,
                        });
                    }
                }
            }
            Ok(out)
        }

        async fn mkdir(&self, _path: &str) -> FarmResult<()> {
            unimplemented!("tree never mutates")
        }

        async fn remove(&self, _path: &str, _is_dir: bool) -> FarmResult<()> {
            unimplemented!("tree never mutates")
        }

        async fn rename(&self, _old_path: &str, _new_path: &str) -> FarmResult<()> {
            unimplemented!("tree never mutates")
        }

        async fn put(&self, _local_path: &Path, _remote_path: &str) -> FarmResult<()> {
            unimplemented!("tree never mutates")
        }

        async fn get(&self, _remote_path: &str, _local_path: &Path) -> FarmResult<()> {
            unimplemented!("tree never mutates")
        }
    }

    fn farm_fs() -> FakeRemoteFs {
        FakeRemoteFs::with_entries(&[
            ("/home/alice/farm", true),
            ("/home/alice/farm/Beta", true),
            ("/home/alice/farm/alpha", true),
            ("/home/alice/farm/Readme.txt", false),
            ("/home/alice/farm/alpha/shot01", true),
            ("/home/alice/farm/alpha/shot01/scene.hip", false),
        ])
    }

    #[tokio::test]
    async fn children_load_lazily_and_only_once() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Ascending);
        let root = tree.root();
        assert!(!tree.is_populated(root));

        assert_eq!(tree.child_count(root, &fs).await, 3);
        assert_eq!(tree.child_count(root, &fs).await, 3);
        // one listdir, the snapshot is reused
        assert_eq!(fs.list_calls(), vec!["/home/alice/farm".to_string()]);
    }

    #[tokio::test]
    async fn sorting_is_case_insensitive_and_intermixed() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Ascending);
        let root = tree.root();
        tree.child_count(root, &fs).await;

        let names: Vec<String> = (0..3)
            .map(|i| {
                let id = tree.child_at(root, i).unwrap();
                crate::util::remote_path::basename(tree.path(id).unwrap()).to_string()
            })
            .collect();
        // dirs and files intermixed by name, not grouped
        assert_eq!(names, vec!["alpha", "Beta", "Readme.txt"]);
    }

    #[tokio::test]
    async fn descending_order_for_synthetic_root() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Descending);
        let root = tree.root();
        tree.child_count(root, &fs).await;
        let first = tree.child_at(root, 0).unwrap();
        assert_eq!(
            crate::util::remote_path::basename(tree.path(first).unwrap()),
            "Readme.txt"
        );
    }

    #[tokio::test]
    async fn find_node_by_path_descends_and_loads_on_demand() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Ascending);

        let id = tree
            .find_node_by_path("/home/alice/farm/alpha/shot01/scene.hip", &fs)
            .await
            .expect("node should resolve");
        assert_eq!(tree.path(id), Some("/home/alice/farm/alpha/shot01/scene.hip"));
        assert!(!tree.is_dir(id));

        let parent = tree.parent_of(id).unwrap();
        assert_eq!(tree.path(parent), Some("/home/alice/farm/alpha/shot01"));

        assert!(tree
            .find_node_by_path("/home/alice/farm/missing/zzz", &fs)
            .await
            .is_none());
        assert!(tree.find_node_by_path("/elsewhere", &fs).await.is_none());
    }

    #[tokio::test]
    async fn refresh_discards_subtree_and_captures_expanded_paths() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Ascending);
        let root = tree.root();
        tree.child_count(root, &fs).await;
        let alpha = tree
            .find_node_by_path("/home/alice/farm/alpha", &fs)
            .await
            .unwrap();
        tree.expand(alpha, &fs).await;

        let expanded = tree.refresh(root);
        assert!(expanded.contains(&"/home/alice/farm".to_string()));
        assert!(expanded.contains(&"/home/alice/farm/alpha".to_string()));
        assert!(!tree.is_populated(root));

        // stale ids are gone, not dangling
        assert_eq!(tree.path(alpha), None);

        // re-population sees the current remote state
        fs.remove_subtree("/home/alice/farm/alpha");
        assert_eq!(tree.child_count(root, &fs).await, 2);
    }

    #[tokio::test]
    async fn deleted_directory_degrades_to_zero_children() {
        let fs = farm_fs();
        let mut tree = VirtualTree::new("/home/alice/farm", SortOrder::Ascending);
        let root = tree.root();
        tree.child_count(root, &fs).await;
        let alpha = tree
            .find_node_by_path("/home/alice/farm/alpha", &fs)
            .await
            .unwrap();

        // deleted out from under the cache by another client
        fs.remove_subtree("/home/alice/farm/alpha");
        tree.refresh(alpha);
        assert_eq!(tree.child_count(alpha, &fs).await, 0);
    }
}
