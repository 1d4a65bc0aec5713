//! Remote object-storage seam.
//!
//! The orchestrator only ever talks to storage through [`RemoteStorage`], so
//! the Dropbox HTTP backend and the in-process [`MemoryStorage`] are
//! interchangeable. Paths are absolute, `/`-separated, and case-sensitive;
//! the storage root is the empty string or `/`.
//!
//! Backends must behave like Dropbox for the calls the placement router
//! relies on: `delete` of a missing path, `create_folder` over an existing
//! entry, and a non-overwriting `upload` or `move_entry` onto an existing path
//! are all errors. That is why the router always checks before it writes.

pub mod dropbox;
pub mod memory;

pub use dropbox::DropboxStorage;
pub use memory::MemoryStorage;

use crate::error::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Kind of a folder entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Folder,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Last path segment.
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Folder listing, download, upload, move, delete and folder creation.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Entries directly inside `path`, in the backend's listing order.
    async fn list_folder(&self, path: &str) -> Result<Vec<Entry>, RelayError>;

    /// Full contents of the file at `path`.
    async fn download(&self, path: &str) -> Result<Vec<u8>, RelayError>;

    /// Write `bytes` to `path`. With `overwrite = false` an existing entry is an error.
    async fn upload(&self, path: &str, bytes: Vec<u8>, overwrite: bool) -> Result<(), RelayError>;

    /// Move a file or folder. The destination must not exist.
    async fn move_entry(&self, from: &str, to: &str) -> Result<(), RelayError>;

    /// Delete a file or a folder with everything below it.
    async fn delete(&self, path: &str) -> Result<(), RelayError>;

    /// Create an empty folder. The path must not exist.
    async fn create_folder(&self, path: &str) -> Result<(), RelayError>;
}

/// Join a folder path and an entry name.
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    format!("{folder}/{name}")
}

/// Split `/a/b/c` into (`/a/b`, `c`). The root's parent is the empty string.
pub fn split_path(path: &str) -> (&str, &str) {
    let path = path.trim_end_matches('/');
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}
