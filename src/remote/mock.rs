//! In-memory [`RemoteStore`] with scripted failure injection.
//!
//! Tests build a small source tree, script per-file download/upload failures,
//! and assert on call counts afterwards.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ItemKind, RemoteItem, RemoteStore, UploadReceipt};
use crate::utils::errors::TransferError;

/// Deterministic content checksum for test fixtures (hex, lowercase).
pub(crate) fn content_checksum(content: &[u8]) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

struct Node {
    item: RemoteItem,
    content: Bytes,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Node>,
    children: HashMap<String, Vec<String>>,
    // Scripted failures, consumed front-to-back per call.
    list_errors: HashMap<String, VecDeque<TransferError>>,
    download_errors: HashMap<String, VecDeque<TransferError>>,
    upload_errors: HashMap<String, VecDeque<TransferError>>,
    // Remaining downloads that should return truncated content (file id keyed).
    truncated_downloads: HashMap<String, u32>,
    // Remaining uploads that should report a wrong checksum (file name keyed).
    corrupt_upload_receipts: HashMap<String, u32>,
    download_calls: HashMap<String, u32>,
    upload_calls: HashMap<String, u32>,
    deleted: Vec<String>,
}

pub(crate) struct MockStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

pub(crate) const ROOT_ID: &str = "root";

impl MockStore {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.nodes.insert(
            ROOT_ID.to_string(),
            Node {
                item: RemoteItem {
                    id: ROOT_ID.to_string(),
                    name: "root".to_string(),
                    kind: ItemKind::Folder,
                    size: None,
                    checksum: None,
                    parent_id: None,
                },
                content: Bytes::new(),
            },
        );
        inner.children.insert(ROOT_ID.to_string(), Vec::new());
        Self {
            inner: Mutex::new(inner),
            next_id: AtomicU64::new(1),
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_folder(&self, parent_id: &str, name: &str) -> String {
        let id = self.fresh_id("folder");
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(
            id.clone(),
            Node {
                item: RemoteItem {
                    id: id.clone(),
                    name: name.to_string(),
                    kind: ItemKind::Folder,
                    size: None,
                    checksum: None,
                    parent_id: Some(parent_id.to_string()),
                },
                content: Bytes::new(),
            },
        );
        inner.children.entry(parent_id.to_string()).or_default().push(id.clone());
        inner.children.insert(id.clone(), Vec::new());
        id
    }

    pub fn add_file(&self, parent_id: &str, name: &str, content: &[u8]) -> String {
        let id = self.fresh_id("file");
        let checksum = content_checksum(content);
        let mut inner = self.inner.lock().unwrap();
        inner.nodes.insert(
            id.clone(),
            Node {
                item: RemoteItem {
                    id: id.clone(),
                    name: name.to_string(),
                    kind: ItemKind::File,
                    size: Some(content.len() as u64),
                    checksum: Some(checksum),
                    parent_id: Some(parent_id.to_string()),
                },
                content: Bytes::copy_from_slice(content),
            },
        );
        inner.children.entry(parent_id.to_string()).or_default().push(id.clone());
        id
    }

    /// Script the next listings of `folder_id` to fail with the given errors.
    pub fn fail_lists(&self, folder_id: &str, errors: Vec<TransferError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .list_errors
            .entry(folder_id.to_string())
            .or_default()
            .extend(errors);
    }

    /// Script the next downloads of `file_id` to fail with the given errors.
    pub fn fail_downloads(&self, file_id: &str, errors: Vec<TransferError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .download_errors
            .entry(file_id.to_string())
            .or_default()
            .extend(errors);
    }

    /// Script the next uploads of a file named `name` to fail with the given errors.
    pub fn fail_uploads(&self, name: &str, errors: Vec<TransferError>) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .upload_errors
            .entry(name.to_string())
            .or_default()
            .extend(errors);
    }

    /// The next `times` downloads of `file_id` return truncated content.
    pub fn truncate_downloads(&self, file_id: &str, times: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.truncated_downloads.insert(file_id.to_string(), times);
    }

    /// The next `times` uploads of a file named `name` report a wrong checksum.
    pub fn corrupt_upload_receipts(&self, name: &str, times: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.corrupt_upload_receipts.insert(name.to_string(), times);
    }

    pub fn download_count(&self, file_id: &str) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.download_calls.get(file_id).copied().unwrap_or(0)
    }

    pub fn upload_count(&self, name: &str) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.upload_calls.get(name).copied().unwrap_or(0)
    }

    pub fn total_download_calls(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.download_calls.values().sum()
    }

    pub fn total_upload_calls(&self) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.upload_calls.values().sum()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.deleted.clone()
    }

    /// Id of the child of `parent_id` named `name`, if any.
    pub fn find_child(&self, parent_id: &str, name: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        let ids = inner.children.get(parent_id)?;
        ids.iter()
            .find(|id| inner.nodes.get(*id).map(|n| n.item.name.as_str()) == Some(name))
            .cloned()
    }

    /// Count files (recursively) under a folder.
    pub fn file_count_under(&self, folder_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        let mut count = 0;
        let mut queue = vec![folder_id.to_string()];
        while let Some(id) = queue.pop() {
            if let Some(ids) = inner.children.get(&id) {
                for child in ids {
                    if let Some(node) = inner.nodes.get(child) {
                        match node.item.kind {
                            ItemKind::Folder => queue.push(child.clone()),
                            ItemKind::File => count += 1,
                        }
                    }
                }
            }
        }
        count
    }

    /// Count folders (recursively) under a folder, excluding the folder itself.
    pub fn folder_count_under(&self, folder_id: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        let mut count = 0;
        let mut queue = vec![folder_id.to_string()];
        while let Some(id) = queue.pop() {
            if let Some(ids) = inner.children.get(&id) {
                for child in ids {
                    if let Some(node) = inner.nodes.get(child) {
                        if node.item.kind == ItemKind::Folder {
                            count += 1;
                            queue.push(child.clone());
                        }
                    }
                }
            }
        }
        count
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteItem>, TransferError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(errors) = inner.list_errors.get_mut(folder_id) {
            if let Some(err) = errors.pop_front() {
                return Err(err);
            }
        }
        let ids = inner
            .children
            .get(folder_id)
            .ok_or_else(|| TransferError::NotFound(folder_id.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| inner.nodes.get(id).map(|n| n.item.clone()))
            .collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, TransferError> {
        {
            let inner = self.inner.lock().unwrap();
            if !inner.children.contains_key(parent_id) {
                return Err(TransferError::NotFound(parent_id.to_string()));
            }
        }
        Ok(self.add_folder(parent_id, name))
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, TransferError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.download_calls.entry(file_id.to_string()).or_insert(0) += 1;

        if let Some(errors) = inner.download_errors.get_mut(file_id) {
            if let Some(err) = errors.pop_front() {
                return Err(err);
            }
        }

        let content = inner
            .nodes
            .get(file_id)
            .filter(|n| n.item.kind == ItemKind::File)
            .map(|n| n.content.clone())
            .ok_or_else(|| TransferError::NotFound(file_id.to_string()))?;

        if let Some(remaining) = inner.truncated_downloads.get_mut(file_id) {
            if *remaining > 0 {
                *remaining -= 1;
                let cut = content.len() / 2;
                return Ok(content.slice(..cut));
            }
        }

        Ok(content)
    }

    async fn upload(
        &self,
        name: &str,
        parent_id: &str,
        content: Bytes,
    ) -> Result<UploadReceipt, TransferError> {
        {
            let mut inner = self.inner.lock().unwrap();
            *inner.upload_calls.entry(name.to_string()).or_insert(0) += 1;

            if let Some(errors) = inner.upload_errors.get_mut(name) {
                if let Some(err) = errors.pop_front() {
                    return Err(err);
                }
            }
            if !inner.children.contains_key(parent_id) {
                return Err(TransferError::NotFound(parent_id.to_string()));
            }
        }

        let id = self.fresh_id("copy");
        let checksum = content_checksum(&content);
        let mut inner = self.inner.lock().unwrap();

        let reported = if let Some(remaining) = inner.corrupt_upload_receipts.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                "0000000000000000".to_string()
            } else {
                checksum.clone()
            }
        } else {
            checksum.clone()
        };

        inner.nodes.insert(
            id.clone(),
            Node {
                item: RemoteItem {
                    id: id.clone(),
                    name: name.to_string(),
                    kind: ItemKind::File,
                    size: Some(content.len() as u64),
                    checksum: Some(checksum),
                    parent_id: Some(parent_id.to_string()),
                },
                content,
            },
        );
        inner.children.entry(parent_id.to_string()).or_default().push(id.clone());

        Ok(UploadReceipt {
            id,
            checksum: Some(reported),
        })
    }

    async fn delete(&self, item_id: &str) -> Result<(), TransferError> {
        let mut inner = self.inner.lock().unwrap();
        let node = inner
            .nodes
            .remove(item_id)
            .ok_or_else(|| TransferError::NotFound(item_id.to_string()))?;
        if let Some(parent) = &node.item.parent_id {
            if let Some(siblings) = inner.children.get_mut(parent) {
                siblings.retain(|id| id != item_id);
            }
        }
        inner.deleted.push(item_id.to_string());
        Ok(())
    }

    async fn metadata(&self, item_id: &str) -> Result<RemoteItem, TransferError> {
        let inner = self.inner.lock().unwrap();
        inner
            .nodes
            .get(item_id)
            .map(|n| n.item.clone())
            .ok_or_else(|| TransferError::NotFound(item_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tree_building_and_listing() {
        let store = MockStore::new();
        let docs = store.add_folder(ROOT_ID, "docs");
        store.add_file(&docs, "a.txt", b"hello");

        let children = store.list_children(&docs).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a.txt");
        assert_eq!(children[0].size, Some(5));
    }

    #[tokio::test]
    async fn test_scripted_download_failure_is_consumed() {
        let store = MockStore::new();
        let id = store.add_file(ROOT_ID, "a.txt", b"hello");
        store.fail_downloads(&id, vec![TransferError::Network("reset".into())]);

        assert!(store.download(&id).await.is_err());
        assert!(store.download(&id).await.is_ok());
        assert_eq!(store.download_count(&id), 2);
    }

    #[tokio::test]
    async fn test_upload_roundtrip_reports_content_checksum() {
        let store = MockStore::new();
        let receipt = store
            .upload("b.txt", ROOT_ID, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(receipt.checksum, Some(content_checksum(b"payload")));
        assert_eq!(store.file_count_under(ROOT_ID), 1);
    }
}
