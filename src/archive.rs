// ===============================
// src/archive.rs
// ===============================
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::credentials::AuthError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("authorization failed: {0}")]
    Auth(#[from] AuthError),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote store returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote folder-per-month store.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Folder id for `month_label` under `parent_id`, created only if no folder of that exact
    /// name exists. Lookup-then-create is not atomic.
    async fn ensure_month_folder(&self, parent_id: &str, month_label: &str) -> Result<String, SyncError>;

    /// Uploads the file into `folder_id` under its own file name; returns the new file id.
    async fn upload_document(&self, local_path: &Path, folder_id: &str) -> Result<String, SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReceipt {
    pub folder_id: String,
    pub file_id: String,
}

pub async fn archive_document(
    store: &dyn ArchiveStore,
    root_folder_id: &str,
    month_label: &str,
    local_path: &Path,
) -> Result<ArchiveReceipt, SyncError> {
    let folder_id = store.ensure_month_folder(root_folder_id, month_label).await?;
    let file_id = store.upload_document(local_path, &folder_id).await?;
    info!(%month_label, %folder_id, %file_id, "document archived");
    Ok(ArchiveReceipt { folder_id, file_id })
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryArchive;
    use super::*;

    #[tokio::test]
    async fn ensure_month_folder_is_idempotent() {
        let store = MemoryArchive::default();
        let a = store.ensure_month_folder("root", "March_2025").await.unwrap();
        let b = store.ensure_month_folder("root", "March_2025").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.folders.lock().unwrap().len(), 1);

        let other = store.ensure_month_folder("root", "April_2025").await.unwrap();
        assert_ne!(a, other);
        let elsewhere = store.ensure_month_folder("other-root", "March_2025").await.unwrap();
        assert_ne!(a, elsewhere);
    }

    #[tokio::test]
    async fn archive_document_uploads_into_month_folder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("March_2025_Ravi.pdf");
        tokio::fs::write(&path, b"%PDF-1.7").await.unwrap();

        let store = MemoryArchive::default();
        let receipt = archive_document(&store, "root", "March_2025", &path).await.unwrap();
        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].folder_id, receipt.folder_id);
        assert_eq!(uploads[0].name, "March_2025_Ravi.pdf");
    }

    #[tokio::test]
    async fn upload_failure_surfaces_as_sync_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pdf");
        tokio::fs::write(&path, b"%PDF").await.unwrap();

        let err = archive_document(&MemoryArchive::failing(), "root", "March_2025", &path).await.unwrap_err();
        assert!(matches!(err, SyncError::Api { status: 503, .. }));
    }
}
