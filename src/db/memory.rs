use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ConditionalWrite, DocumentFilter, DocumentStore, StoreError};
use crate::models::VersionedDocument;

/// Process-local store. The DashMap entry lock makes the version check and the
/// replacement one indivisible step.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: DashMap<Uuid, VersionedDocument>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, doc: VersionedDocument) -> Result<VersionedDocument, StoreError> {
        self.docs.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Option<VersionedDocument>, StoreError> {
        Ok(self.docs.get(&id).map(|d| d.value().clone()))
    }

    async fn replace_if_version(
        &self,
        expected_version: i64,
        next: VersionedDocument,
    ) -> Result<ConditionalWrite, StoreError> {
        let mut current = match self.docs.get_mut(&next.id) {
            Some(current) => current,
            None => return Ok(ConditionalWrite::Missing),
        };
        if current.version != expected_version {
            return Ok(ConditionalWrite::Stale(current.value().clone()));
        }
        *current = next.clone();
        Ok(ConditionalWrite::Applied(next))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.docs.remove(&id).is_some())
    }

    async fn list(&self, filter: &DocumentFilter) -> Result<(Vec<VersionedDocument>, u64), StoreError> {
        let mut matching: Vec<VersionedDocument> = self
            .docs
            .iter()
            .filter(|d| filter.owner.as_deref().map_or(true, |owner| d.owner == owner))
            .filter(|d| filter.status.map_or(true, |status| d.status == status))
            .map(|d| d.value().clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }
}
