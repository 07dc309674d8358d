pub mod dbdocs;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::{DocumentStatus, VersionedDocument};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Stored document is corrupt: {0}")]
    Corrupt(String),
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalWrite {
    /// The guard matched and the new state is persisted.
    Applied(VersionedDocument),
    /// The stored version moved on; carries the current stored state.
    Stale(VersionedDocument),
    /// No document with that id.
    Missing,
}

/// Which documents a listing returns. Results are ordered newest first.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub owner: Option<String>,
    pub status: Option<DocumentStatus>,
    pub offset: u64,
    pub limit: u64,
}

/// Persistence for versioned documents.
///
/// `replace_if_version` is the only write path for existing documents and must
/// be atomic in the backing store: of any number of concurrent calls guarded
/// by the same version, at most one is applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn name(&self) -> &'static str;

    async fn insert(&self, doc: VersionedDocument) -> Result<VersionedDocument, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<VersionedDocument>, StoreError>;

    /// Replace the stored document with `next` if, and only if, its stored
    /// version still equals `expected_version`. `next` carries the complete
    /// new state, history entry included.
    async fn replace_if_version(
        &self,
        expected_version: i64,
        next: VersionedDocument,
    ) -> Result<ConditionalWrite, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// One page of matching documents plus the total number of matches.
    async fn list(&self, filter: &DocumentFilter) -> Result<(Vec<VersionedDocument>, u64), StoreError>;
}

/// Open the store named by the configuration. A configured database that
/// cannot be reached or prepared is an error, never a silent switch to memory.
pub async fn open_store(db_url: Option<&str>) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match db_url {
        Some(db_url) => {
            let store = dbdocs::PgDocumentStore::connect(db_url).await?;
            store.init_schema().await?;
            info!("Database initialized successfully");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(memory::MemoryDocumentStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_database_url_documents_live_in_memory() {
        let store = open_store(None).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[tokio::test]
    async fn unusable_database_url_is_an_error() {
        let result = open_store(Some("not-a-database-url")).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }
}
