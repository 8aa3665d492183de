//! JSON file backend.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::models::PopulationDocument;
use super::store::{Persistence, StoreError};

/// Stores the population document as a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Persistence for JsonFilePersistence {
    async fn read(&self) -> Result<Option<PopulationDocument>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn write(&self, doc: &PopulationDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec(doc)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Store: wrote {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PopulationSample, Store};
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let backend = JsonFilePersistence::new(dir.path().join("servers.json"));
        assert!(backend.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_round_trip_through_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("servers.json");

        let store = Store::new(JsonFilePersistence::new(&path));
        assert_ok!(store.load().await);
        store.update("10.0.0.1:27015", |s| {
            s.push(PopulationSample {
                date_hour: 2024053114,
                players_num: 12,
            })
        });
        assert_ok!(store.flush().await);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""population""#));
        assert!(raw.contains(r#""10.0.0.1:27015""#));

        let reopened = Store::new(JsonFilePersistence::new(&path));
        reopened.load().await.unwrap();
        assert_eq!(
            reopened.samples("10.0.0.1:27015").unwrap()[0].players_num,
            12
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = Store::new(JsonFilePersistence::new(&path));
        let err = assert_err!(store.load().await);
        assert!(matches!(err, StoreError::Json(_)));
        assert!(!store.is_loaded());
    }
}
