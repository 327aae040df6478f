//! Abstract remote storage interface.
//!
//! The engine never talks to a concrete backend; it is generic over
//! [`RemoteStore`], which covers the five operations the mirror needs:
//! listing, folder creation, download, upload, and metadata lookup (plus
//! delete, used to discard a copy that failed checksum validation).

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::utils::errors::TransferError;

/// Kind of a node in the remote tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Folder,
    File,
}

/// One node of the source tree, as reported by the remote store.
///
/// Read-only snapshot: fetched once per run by the walker and never mutated.
/// `size` and `checksum` are authoritative source metadata for files; the
/// checksum may be absent for backend-native document formats.
#[derive(Debug, Clone)]
pub struct RemoteItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub size: Option<u64>,
    pub checksum: Option<String>,
    pub parent_id: Option<String>,
}

impl RemoteItem {
    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }
}

/// Server response to a completed upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    /// Id assigned to the created copy.
    pub id: String,
    /// Server-computed content checksum, if the backend provides one.
    pub checksum: Option<String>,
}

/// Remote storage operations consumed by the engine.
///
/// Implementations are expected to apply their own bounded timeouts; a timeout
/// surfaces as [`TransferError::Timeout`] and is retried like any other
/// transient failure.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// List the direct children of a folder.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteItem>, TransferError>;

    /// Create a folder and return its id.
    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, TransferError>;

    /// Download the full content of a file.
    async fn download(&self, file_id: &str) -> Result<Bytes, TransferError>;

    /// Upload content as a new file under `parent_id`.
    async fn upload(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<UploadReceipt, TransferError>;

    /// Delete an item. Used to discard copies that failed validation.
    async fn delete(&self, item_id: &str) -> Result<(), TransferError>;

    /// Fetch metadata for a single item.
    async fn metadata(&self, item_id: &str) -> Result<RemoteItem, TransferError>;
}
