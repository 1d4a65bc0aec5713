//! In-process storage backend.
//!
//! Mirrors the Dropbox semantics the watcher depends on (strict deletes,
//! conflicting creates, listing order = creation order) so the whole
//! conversion state machine can run without a network. Every mutating call
//! is also appended to an operation log for inspection.

use super::{split_path, Entry, EntryKind, RemoteStorage};
use crate::error::RelayError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Node {
    seq: u64,
    data: Option<Vec<u8>>,
}

impl Node {
    fn kind(&self) -> EntryKind {
        if self.data.is_some() {
            EntryKind::File
        } else {
            EntryKind::Folder
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    next_seq: u64,
    nodes: BTreeMap<String, Node>,
    ops: Vec<String>,
}

impl Tree {
    fn insert(&mut self, path: String, data: Option<Vec<u8>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.insert(path, Node { seq, data });
    }

    fn is_folder(&self, path: &str) -> bool {
        is_root(path) || self.nodes.get(path).is_some_and(|n| n.data.is_none())
    }

    /// Create every missing ancestor folder of `path`.
    fn ensure_parents(&mut self, path: &str) -> Result<(), RelayError> {
        let (parent, _) = split_path(path);
        if is_root(parent) {
            return Ok(());
        }
        match self.nodes.get(parent) {
            Some(n) if n.data.is_none() => Ok(()),
            Some(_) => Err(RelayError::storage("write", path, "parent is a file")),
            None => {
                self.ensure_parents(parent)?;
                self.insert(parent.to_string(), None);
                Ok(())
            }
        }
    }

    fn descendants(&self, path: &str) -> Vec<String> {
        let prefix = format!("{path}/");
        self.nodes
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect()
    }
}

fn is_root(path: &str) -> bool {
    path.is_empty() || path == "/"
}

fn normalise(path: &str) -> String {
    path.trim_end_matches('/').to_string()
}

/// Thread-safe in-memory [`RemoteStorage`].
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tree: Mutex<Tree>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tree>, RelayError> {
        self.tree
            .lock()
            .map_err(|_| RelayError::Internal("memory storage lock poisoned".into()))
    }

    /// Seed a file, creating parent folders as needed.
    pub fn put_file(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let path = normalise(path);
        tree.ensure_parents(&path)?;
        tree.insert(path, Some(bytes.into()));
        Ok(())
    }

    /// Seed a folder, creating parent folders as needed.
    pub fn put_folder(&self, path: &str) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let path = normalise(path);
        tree.ensure_parents(&path)?;
        if !tree.nodes.contains_key(&path) {
            tree.insert(path, None);
        }
        Ok(())
    }

    /// Contents of a file, or `None` for folders and missing paths.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let tree = self.lock().ok()?;
        tree.nodes.get(&normalise(path)).and_then(|n| n.data.clone())
    }

    pub fn exists(&self, path: &str) -> bool {
        self.lock()
            .map(|t| t.nodes.contains_key(&normalise(path)))
            .unwrap_or(false)
    }

    /// All paths currently stored, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|t| t.nodes.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Mutating calls made through [`RemoteStorage`], e.g. `"delete /Converted/a.pdf"`.
    pub fn operations(&self) -> Vec<String> {
        self.lock().map(|t| t.ops.clone()).unwrap_or_default()
    }

    pub fn clear_operations(&self) {
        if let Ok(mut t) = self.lock() {
            t.ops.clear();
        }
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    async fn list_folder(&self, path: &str) -> Result<Vec<Entry>, RelayError> {
        let tree = self.lock()?;
        let path = normalise(path);
        if !tree.is_folder(&path) {
            return Err(RelayError::storage("list_folder", path, "not_found"));
        }

        let mut entries: Vec<(u64, Entry)> = tree
            .nodes
            .iter()
            .filter(|(k, _)| split_path(k).0 == path)
            .map(|(k, n)| {
                let name = split_path(k).1.to_string();
                (n.seq, Entry { name, kind: n.kind() })
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, e)| e).collect())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, RelayError> {
        let tree = self.lock()?;
        match tree.nodes.get(&normalise(path)) {
            Some(Node { data: Some(d), .. }) => Ok(d.clone()),
            Some(_) => Err(RelayError::storage("download", path, "not_file")),
            None => Err(RelayError::storage("download", path, "not_found")),
        }
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let path = normalise(path);
        tree.ops.push(format!("upload {path}"));
        match tree.nodes.get(&path) {
            Some(n) if n.data.is_none() => {
                return Err(RelayError::storage("upload", path, "conflict/folder"));
            }
            Some(_) if !overwrite => {
                return Err(RelayError::storage("upload", path, "conflict/file"));
            }
            _ => {}
        }
        tree.ensure_parents(&path)?;
        // Overwrites keep the entry's original position in listings.
        match tree.nodes.get_mut(&path) {
            Some(node) => node.data = Some(bytes),
            None => tree.insert(path, Some(bytes)),
        }
        Ok(())
    }

    async fn move_entry(&self, from: &str, to: &str) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let (from, to) = (normalise(from), normalise(to));
        tree.ops.push(format!("move {from} -> {to}"));
        if tree.nodes.contains_key(&to) {
            return Err(RelayError::storage("move", to, "to/conflict"));
        }
        let Some(node) = tree.nodes.remove(&from) else {
            return Err(RelayError::storage("move", from, "from_lookup/not_found"));
        };
        tree.ensure_parents(&to)?;
        for child in tree.descendants(&from) {
            if let Some(n) = tree.nodes.remove(&child) {
                let moved = format!("{to}{}", &child[from.len()..]);
                tree.nodes.insert(moved, n);
            }
        }
        tree.insert(to, node.data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let path = normalise(path);
        tree.ops.push(format!("delete {path}"));
        if tree.nodes.remove(&path).is_none() {
            return Err(RelayError::storage("delete", path, "path_lookup/not_found"));
        }
        for child in tree.descendants(&path) {
            tree.nodes.remove(&child);
        }
        Ok(())
    }

    async fn create_folder(&self, path: &str) -> Result<(), RelayError> {
        let mut tree = self.lock()?;
        let path = normalise(path);
        tree.ops.push(format!("create_folder {path}"));
        if is_root(&path) || tree.nodes.contains_key(&path) {
            return Err(RelayError::storage("create_folder", path, "path/conflict"));
        }
        tree.ensure_parents(&path)?;
        tree.insert(path, None);
        Ok(())
    }
}
