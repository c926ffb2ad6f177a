//! Blob workspace collaborator: the object-storage surface agents and
//! validators consume, plus the canonical workspace layout.
//!
//! Layout per migration request:
//! - `{source_file_folder}/` - user-supplied EKS/GKE manifests
//! - `{workspace_file_folder}/` - transient working files, safe to truncate
//! - `{output_file_folder}/` - phase artifacts and converted manifests

use crate::errors::BlobError;
use async_trait::async_trait;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Mandatory first line of every converted manifest.
pub const AI_CONTENT_HEADER: &str = "# AI generated content - it may be incorrect";

/// Prefix carried by converted manifest file names.
pub const CONVERTED_FILE_PREFIX: &str = "az-";

/// A blob listed from the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub name: String,
    pub size: usize,
}

/// Object-storage surface consumed by the pipeline and agent tools.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_blobs(
        &self,
        container: &str,
        folder: &str,
        recursive: bool,
    ) -> Result<Vec<BlobEntry>, BlobError>;

    async fn find_blobs(
        &self,
        pattern: &str,
        container: &str,
        folder: &str,
    ) -> Result<Vec<String>, BlobError>;

    async fn check_blob_exists(
        &self,
        name: &str,
        container: &str,
        folder: &str,
    ) -> Result<bool, BlobError>;

    async fn read_blob_content(
        &self,
        name: &str,
        container: &str,
        folder: &str,
    ) -> Result<String, BlobError>;

    async fn save_content_to_blob(
        &self,
        name: &str,
        content: &str,
        container: &str,
        folder: &str,
    ) -> Result<(), BlobError>;
}

fn blob_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// In-memory blob store: the reference implementation used by tests and
/// local runs. Keys are `(container, folder/name)`.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<BTreeMap<(String, String), String>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a blob synchronously; handy for arranging test fixtures.
    pub fn seed(&self, container: &str, folder: &str, name: &str, content: &str) {
        self.blobs.lock().unwrap().insert(
            (container.to_string(), blob_path(folder, name)),
            content.to_string(),
        );
    }

    pub fn blob_count(&self, container: &str) -> usize {
        self.blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .count()
    }

    fn entries_in(&self, container: &str, folder: &str, recursive: bool) -> Vec<(String, String)> {
        let prefix = {
            let folder = folder.trim_matches('/');
            if folder.is_empty() {
                String::new()
            } else {
                format!("{folder}/")
            }
        };
        self.blobs
            .lock()
            .unwrap()
            .iter()
            .filter(|((c, path), _)| c == container && path.starts_with(&prefix))
            .filter(|((_, path), _)| recursive || !path[prefix.len()..].contains('/'))
            .map(|((_, path), content)| (path[prefix.len()..].to_string(), content.clone()))
            .collect()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn list_blobs(
        &self,
        container: &str,
        folder: &str,
        recursive: bool,
    ) -> Result<Vec<BlobEntry>, BlobError> {
        Ok(self
            .entries_in(container, folder, recursive)
            .into_iter()
            .map(|(name, content)| BlobEntry {
                name,
                size: content.len(),
            })
            .collect())
    }

    async fn find_blobs(
        &self,
        pattern: &str,
        container: &str,
        folder: &str,
    ) -> Result<Vec<String>, BlobError> {
        let pattern = Pattern::new(pattern)
            .map_err(|_| BlobError::InvalidPattern(pattern.to_string()))?;
        Ok(self
            .entries_in(container, folder, true)
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| pattern.matches(name))
            .collect())
    }

    async fn check_blob_exists(
        &self,
        name: &str,
        container: &str,
        folder: &str,
    ) -> Result<bool, BlobError> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .contains_key(&(container.to_string(), blob_path(folder, name))))
    }

    async fn read_blob_content(
        &self,
        name: &str,
        container: &str,
        folder: &str,
    ) -> Result<String, BlobError> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(container.to_string(), blob_path(folder, name)))
            .cloned()
            .ok_or_else(|| BlobError::NotFound {
                name: name.to_string(),
                container: container.to_string(),
                folder: folder.to_string(),
            })
    }

    async fn save_content_to_blob(
        &self,
        name: &str,
        content: &str,
        container: &str,
        folder: &str,
    ) -> Result<(), BlobError> {
        self.blobs.lock().unwrap().insert(
            (container.to_string(), blob_path(folder, name)),
            content.to_string(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_sources() -> InMemoryBlobStore {
        let store = InMemoryBlobStore::new();
        store.seed("c", "source", "deployment.yaml", "kind: Deployment");
        store.seed("c", "source", "service.yaml", "kind: Service");
        store.seed("c", "source", "README.md", "docs");
        store.seed("c", "source/nested", "extra.yml", "kind: ConfigMap");
        store
    }

    #[tokio::test]
    async fn list_blobs_respects_recursion_flag() {
        let store = store_with_sources();
        let flat = store.list_blobs("c", "source", false).await.unwrap();
        assert_eq!(flat.len(), 3);
        let deep = store.list_blobs("c", "source", true).await.unwrap();
        assert_eq!(deep.len(), 4);
    }

    #[tokio::test]
    async fn find_blobs_matches_glob_patterns() {
        let store = store_with_sources();
        let mut yaml = store.find_blobs("*.yaml", "c", "source").await.unwrap();
        yaml.sort();
        assert_eq!(yaml, vec!["deployment.yaml", "service.yaml"]);

        let yml = store.find_blobs("*/*.yml", "c", "source").await.unwrap();
        assert_eq!(yml, vec!["nested/extra.yml"]);
    }

    #[tokio::test]
    async fn find_blobs_rejects_bad_patterns() {
        let store = store_with_sources();
        let result = store.find_blobs("[", "c", "source").await;
        assert!(matches!(result, Err(BlobError::InvalidPattern(_))));
    }

    #[tokio::test]
    async fn save_then_read_round_trips() {
        let store = InMemoryBlobStore::new();
        store
            .save_content_to_blob("az-deployment.yaml", "content", "c", "output")
            .await
            .unwrap();
        assert!(
            store
                .check_blob_exists("az-deployment.yaml", "c", "output")
                .await
                .unwrap()
        );
        assert_eq!(
            store
                .read_blob_content("az-deployment.yaml", "c", "output")
                .await
                .unwrap(),
            "content"
        );
    }

    #[tokio::test]
    async fn missing_blob_reads_fail_with_location() {
        let store = InMemoryBlobStore::new();
        let err = store
            .read_blob_content("ghost.yaml", "c", "output")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost.yaml"));
    }
}
