//! Directory-backed blob store.
//!
//! Each upload lands in its own file named
//! `<UTC timestamp>_<8 hex chars>_<sanitized original name>`. Files are
//! opened with create-new semantics, so an existing blob is never
//! overwritten even if two uploads race on the same name.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use pagelens_core::engine::BlobStore;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Longest sanitized name kept in a blob file name.
const MAX_NAME_CHARS: usize = 100;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reduce an uploaded file name to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, and leading dots are removed. Falls back to `document.pdf`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}

fn blob_file_name(name: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", stamp, &nonce[..8], sanitize_file_name(name))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create storage dir {}", self.root.display()))?;

        let path = self.root.join(blob_file_name(name));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e).with_context(|| format!("Failed to write {}", path.display()));
        }

        Ok(path)
    }

    async fn get(&self, location: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(location)
            .await
            .with_context(|| format!("Failed to read {}", location.display()))
    }

    async fn delete(&self, location: &Path) -> Result<()> {
        tokio::fs::remove_file(location)
            .await
            .with_context(|| format!("Failed to delete {}", location.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_strips_directories_and_odd_chars() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\Q3 report.pdf"), "Q3_report.pdf");
        assert_eq!(sanitize_file_name(".hidden.pdf"), "hidden.pdf");
        assert_eq!(sanitize_file_name(""), "document.pdf");
        assert_eq!(sanitize_file_name("..."), "document.pdf");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_file_name(&long).len(), MAX_NAME_CHARS);
    }

    #[tokio::test]
    async fn same_name_gets_distinct_files() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("uploads"));

        let a = store.put("report.pdf", b"first").await.unwrap();
        let b = store.put("report.pdf", b"second").await.unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with(store.root()));
        assert!(a.file_name().unwrap().to_string_lossy().ends_with("_report.pdf"));
        assert_eq!(store.get(&a).await.unwrap(), b"first");
        assert_eq!(store.get(&b).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());
        let loc = store.put("x.pdf", b"data").await.unwrap();

        store.delete(&loc).await.unwrap();
        assert!(!loc.exists());
        assert!(store.delete(&loc).await.is_err());
        assert!(store.get(&loc).await.is_err());
    }
}
