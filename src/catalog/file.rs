//! File-backed catalog store.
//!
//! Layout: `<root>/<collection>/<id>.json`, one pretty-printed document per
//! file. Writes go to a temporary sibling and are renamed into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use super::store::{CatalogStore, Collection};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.as_str())
    }

    fn document_path(&self, collection: Collection, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id.contains(['/', '\\'])
            || id == "."
            || id == ".."
            || id.contains('\0')
        {
            return Err(Error::storage(
                collection,
                format!("invalid document id '{}'", id),
            ));
        }
        Ok(self.collection_dir(collection).join(format!("{}.json", id)))
    }
}

#[async_trait]
impl CatalogStore for FileStore {
    async fn list(&self, collection: Collection) -> Result<Vec<Value>> {
        let dir = self.collection_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::storage(collection, e.to_string())),
        };

        let mut documents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::storage(collection, e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)
                .await
                .map_err(|e| Error::storage(collection, e.to_string()))?;
            match serde_json::from_str(&raw) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(documents)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>> {
        let path = self.document_path(collection, id)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::storage(collection, e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(collection, e.to_string())),
        }
    }

    async fn upsert(&self, collection: Collection, id: &str, document: Value) -> Result<()> {
        let path = self.document_path(collection, id)?;
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(collection, e.to_string()))?;

        let body = serde_json::to_string_pretty(&document)?;
        let tmp = dir.join(format!(".{}.json.tmp", id));
        fs::write(&tmp, body)
            .await
            .map_err(|e| Error::storage(collection, e.to_string()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::storage(collection, e.to_string()))?;

        debug!(collection = %collection, id = %id, "Document written");
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        let path = self.document_path(collection, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(collection, e.to_string())),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}
