//! Inbox scanning.

use crate::error::RelayError;
use crate::storage::{join_path, RemoteStorage};
use tracing::debug;

/// Full path of the first file in `inbox`, in the backend's listing order.
///
/// Sub-folders are skipped. Listing failures are returned unchanged; the
/// scanner never retries.
pub async fn scan_inbox(
    storage: &dyn RemoteStorage,
    inbox: &str,
) -> Result<Option<String>, RelayError> {
    let entries = storage.list_folder(inbox).await?;
    debug!("Inbox '{}' lists {} entries", inbox, entries.len());
    Ok(entries
        .into_iter()
        .find(|e| e.is_file())
        .map(|e| join_path(inbox, &e.name)))
}
