//! In-memory population document with pluggable durable storage.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::models::*;

/// Store error types.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable backend for the population document.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Read the stored document, or `None` if nothing has been written yet.
    async fn read(&self) -> Result<Option<PopulationDocument>, StoreError>;

    /// Replace the stored document.
    async fn write(&self, doc: &PopulationDocument) -> Result<(), StoreError>;
}

#[async_trait]
impl<P: Persistence + ?Sized> Persistence for Arc<P> {
    async fn read(&self) -> Result<Option<PopulationDocument>, StoreError> {
        (**self).read().await
    }

    async fn write(&self, doc: &PopulationDocument) -> Result<(), StoreError> {
        (**self).write(doc).await
    }
}

/// Shared population document.
///
/// The document is absent until [`Store::load`] succeeds; keyed operations on an
/// unloaded store are no-ops.
pub struct Store {
    doc: Mutex<Option<PopulationDocument>>,
    backend: Box<dyn Persistence>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl Store {
    /// Create an unloaded store on top of the given backend.
    pub fn new<P: Persistence + 'static>(backend: P) -> Self {
        Self {
            doc: Mutex::new(None),
            backend: Box::new(backend),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a store backed by [`MemoryPersistence`].
    pub fn in_memory() -> Self {
        Self::new(MemoryPersistence::default())
    }

    fn doc(&self) -> MutexGuard<'_, Option<PopulationDocument>> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the document from the backend into memory.
    ///
    /// A backend with nothing stored yields an empty document.
    pub async fn load(&self) -> Result<(), StoreError> {
        let loaded = self.backend.read().await?.unwrap_or_default();
        tracing::info!(
            "Store: loaded population history for {} servers",
            loaded.population.len()
        );
        *self.doc() = Some(loaded);
        Ok(())
    }

    /// Write the in-memory document to the backend.
    ///
    /// Concurrent calls are serialized. Flushing an unloaded store does nothing.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;

        let Some(snapshot) = self.document() else {
            return Ok(());
        };

        self.backend.write(&snapshot).await
    }

    /// Whether [`Store::load`] has completed.
    pub fn is_loaded(&self) -> bool {
        self.doc().is_some()
    }

    /// Copy of the samples recorded for a server.
    pub fn samples(&self, server_id: &str) -> Option<Vec<PopulationSample>> {
        self.doc()
            .as_ref()
            .and_then(|doc| doc.population.get(server_id).cloned())
    }

    /// Mutate the sample list for a server, creating it if absent.
    ///
    /// Returns `None` without calling `f` when the store is not loaded.
    pub fn update<R>(
        &self,
        server_id: &str,
        f: impl FnOnce(&mut Vec<PopulationSample>) -> R,
    ) -> Option<R> {
        let mut guard = self.doc();
        let doc = guard.as_mut()?;
        let samples = doc.population.entry(server_id.to_string()).or_default();
        Some(f(samples))
    }

    /// Copy of the whole in-memory document.
    pub fn document(&self) -> Option<PopulationDocument> {
        self.doc().clone()
    }
}

/// Volatile backend, used for tests and for running without a data directory.
#[derive(Default)]
pub struct MemoryPersistence {
    stored: Mutex<Option<PopulationDocument>>,
}

impl MemoryPersistence {
    /// Backend that starts out holding `doc`.
    pub fn with_document(doc: PopulationDocument) -> Self {
        Self {
            stored: Mutex::new(Some(doc)),
        }
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn read(&self) -> Result<Option<PopulationDocument>, StoreError> {
        Ok(self
            .stored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn write(&self, doc: &PopulationDocument) -> Result<(), StoreError> {
        *self.stored.lock().unwrap_or_else(PoisonError::into_inner) = Some(doc.clone());
        Ok(())
    }
}
