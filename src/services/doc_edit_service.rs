use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::auth;
use crate::db::{ConditionalWrite, DocumentFilter, DocumentStore, StoreError};
use crate::models::{
    DocumentListResponse, DocumentPatch, Identity, ListDocumentsQuery, Pagination, VersionEntry, VersionedDocument,
};

/// Attempts made for a mutation that did not state the version it expects.
const UNGUARDED_ATTEMPTS: usize = 3;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("Document not found")]
    NotFound,
    #[error("Forbidden")]
    Forbidden,
    #[error("Version conflict: document is at version {}", .current.version)]
    VersionConflict { current: Box<VersionedDocument> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Optimistic concurrency over a [`DocumentStore`].
///
/// Every accepted mutation advances the version by exactly one and appends
/// exactly one history entry. Concurrent writers guarded by the same version
/// race on the store's conditional write; exactly one wins, the others get
/// the winner's state back in a `VersionConflict`.
pub struct DocEditService {
    store: Arc<dyn DocumentStore>,
}

impl DocEditService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub async fn create(
        &self,
        owner: &Identity,
        title: String,
        content: serde_json::Value,
    ) -> Result<VersionedDocument, MutationError> {
        let doc = VersionedDocument::new(&owner.id, title, content);
        Ok(self.store.insert(doc).await?)
    }

    pub async fn get(&self, document_id: Uuid) -> Result<VersionedDocument, MutationError> {
        self.store.get(document_id).await?.ok_or(MutationError::NotFound)
    }

    /// Apply `patch` if the document is still at `expected_version`.
    ///
    /// `None` skips the caller-side comparison; the loaded version is then
    /// used as the guard and a lost race is retried a few times.
    pub async fn mutate(
        &self,
        document_id: Uuid,
        editor: &Identity,
        expected_version: Option<i64>,
        patch: &DocumentPatch,
    ) -> Result<VersionedDocument, MutationError> {
        let attempts = if expected_version.is_some() { 1 } else { UNGUARDED_ATTEMPTS };
        let mut last_seen: Option<VersionedDocument> = None;

        for _ in 0..attempts {
            let current = self.store.get(document_id).await?.ok_or(MutationError::NotFound)?;

            if !auth::is_owner(editor, &current) {
                warn!("{} tried to modify document {} owned by {}", editor.id, document_id, current.owner);
                return Err(MutationError::Forbidden);
            }

            let guard = expected_version.unwrap_or(current.version);
            if guard != current.version {
                return Err(MutationError::VersionConflict { current: Box::new(current) });
            }

            let next = next_state(current, editor, patch);
            match self.store.replace_if_version(guard, next).await? {
                ConditionalWrite::Applied(doc) => {
                    info!("Document {} updated to version {} by {}", doc.id, doc.version, editor.id);
                    return Ok(doc);
                }
                ConditionalWrite::Stale(now) => {
                    info!("Document {} moved to version {} before write guarded by {}", document_id, now.version, guard);
                    last_seen = Some(now);
                }
                ConditionalWrite::Missing => return Err(MutationError::NotFound),
            }
        }

        match last_seen {
            Some(current) => Err(MutationError::VersionConflict { current: Box::new(current) }),
            None => Err(MutationError::NotFound),
        }
    }

    /// Newest documents first. Pages start at 1; `limit` is capped at 100.
    pub async fn list(&self, viewer: &Identity, query: &ListDocumentsQuery) -> Result<DocumentListResponse, MutationError> {
        let page = query.page.filter(|p| *p > 0).unwrap_or(1);
        let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let filter = DocumentFilter {
            owner: query.owner_only.then(|| viewer.id.clone()),
            status: query.status,
            offset: u64::from(page - 1) * u64::from(limit),
            limit: u64::from(limit),
        };

        let (documents, total) = self.store.list(&filter).await?;
        Ok(DocumentListResponse {
            documents,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(u64::from(limit)),
            },
        })
    }

    pub async fn delete(&self, document_id: Uuid, editor: &Identity) -> Result<(), MutationError> {
        let current = self.get(document_id).await?;
        if !auth::is_owner(editor, &current) {
            return Err(MutationError::Forbidden);
        }
        if !self.store.delete(document_id).await? {
            return Err(MutationError::NotFound);
        }
        info!("Document {} deleted by {}", document_id, editor.id);
        Ok(())
    }
}

/// The document as it will look after `patch`, one version later.
fn next_state(mut doc: VersionedDocument, editor: &Identity, patch: &DocumentPatch) -> VersionedDocument {
    let now = Utc::now();
    if let Some(title) = &patch.title {
        doc.title = title.clone();
    }
    if let Some(status) = patch.status {
        doc.status = status;
    }
    if let Some(content) = &patch.content {
        doc.content = content.clone();
    }
    doc.version += 1;
    doc.updated_at = now;
    doc.version_history.push(VersionEntry {
        version: doc.version,
        title: doc.title.clone(),
        content: doc.content.clone(),
        notes: patch.notes.clone(),
        updated_by: editor.id.clone(),
        created_at: now,
    });
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDocumentStore;
    use crate::models::DocumentStatus;
    use serde_json::json;

    fn identity(id: &str) -> Identity {
        Identity {
            id: id.to_string(),
            display_label: id.to_string(),
            roles: Vec::new(),
        }
    }

    fn service() -> DocEditService {
        DocEditService::new(Arc::new(MemoryDocumentStore::new()))
    }

    fn content_patch(value: serde_json::Value) -> DocumentPatch {
        DocumentPatch {
            content: Some(value),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_documents_start_at_version_one() {
        let svc = service();
        let doc = svc.create(&identity("alice"), "PCR run".to_string(), json!({"steps": []})).await.unwrap();
        assert_eq!(doc.version, 1);
        assert!(doc.version_history.is_empty());
        assert_eq!(svc.get(doc.id).await.unwrap(), doc);
    }

    #[tokio::test]
    async fn returned_version_chains_into_next_mutation() {
        let svc = service();
        let alice = identity("alice");
        let doc = svc.create(&alice, "PCR run".to_string(), json!({})).await.unwrap();

        let first = svc.mutate(doc.id, &alice, Some(1), &content_patch(json!({"step": 1}))).await.unwrap();
        assert_eq!(first.version, 2);

        let second = svc
            .mutate(doc.id, &alice, Some(first.version), &content_patch(json!({"step": 2})))
            .await
            .unwrap();
        assert_eq!(second.version, 3);

        let versions: Vec<i64> = second.version_history.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![2, 3]);
        assert_eq!(second.version_history[0].content, json!({"step": 1}));
        assert_eq!(second.version_history[1].content, json!({"step": 2}));
        assert_eq!(second.content, json!({"step": 2}));
    }

    #[tokio::test]
    async fn stale_expected_version_returns_current_document() {
        let svc = service();
        let alice = identity("alice");
        let doc = svc.create(&alice, "Titration".to_string(), json!({})).await.unwrap();
        for v in 1..5 {
            svc.mutate(doc.id, &alice, Some(v), &content_patch(json!({"v": v}))).await.unwrap();
        }

        let err = svc.mutate(doc.id, &alice, Some(3), &content_patch(json!({}))).await.unwrap_err();
        match err {
            MutationError::VersionConflict { current } => {
                assert_eq!(current.version, 5);
                assert_eq!(current.content, json!({"v": 4}));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(svc.get(doc.id).await.unwrap().version, 5);
    }

    #[tokio::test]
    async fn omitted_version_skips_the_comparison() {
        let svc = service();
        let alice = identity("alice");
        let doc = svc.create(&alice, "Gel".to_string(), json!({})).await.unwrap();
        svc.mutate(doc.id, &alice, Some(1), &content_patch(json!({"a": 1}))).await.unwrap();

        let patch = DocumentPatch {
            status: Some(DocumentStatus::Active),
            notes: Some("started".to_string()),
            ..Default::default()
        };
        let updated = svc.mutate(doc.id, &alice, None, &patch).await.unwrap();
        assert_eq!(updated.version, 3);
        assert_eq!(updated.status, DocumentStatus::Active);
        assert_eq!(updated.content, json!({"a": 1}));
        assert_eq!(updated.version_history.last().unwrap().notes.as_deref(), Some("started"));
    }

    #[tokio::test]
    async fn missing_and_foreign_documents_are_rejected() {
        let svc = service();
        let alice = identity("alice");
        let doc = svc.create(&alice, "Gel".to_string(), json!({})).await.unwrap();

        assert!(matches!(
            svc.mutate(Uuid::new_v4(), &alice, Some(1), &DocumentPatch::default()).await,
            Err(MutationError::NotFound)
        ));
        assert!(matches!(
            svc.mutate(doc.id, &identity("bob"), Some(1), &DocumentPatch::default()).await,
            Err(MutationError::Forbidden)
        ));
        assert!(matches!(svc.delete(doc.id, &identity("bob")).await, Err(MutationError::Forbidden)));
        assert_eq!(svc.get(doc.id).await.unwrap().version, 1);

        svc.delete(doc.id, &alice).await.unwrap();
        assert!(matches!(svc.get(doc.id).await, Err(MutationError::NotFound)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_on_same_version_have_one_winner() {
        let svc = Arc::new(service());
        let alice = identity("alice");

        for _ in 0..20 {
            let doc = svc.create(&alice, "Race".to_string(), json!({})).await.unwrap();
            let start = doc.version;

            let (a, b) = tokio::join!(
                {
                    let svc = svc.clone();
                    let alice = alice.clone();
                    tokio::spawn(async move {
                        svc.mutate(doc.id, &alice, Some(start), &content_patch(json!({"by": "a"}))).await
                    })
                },
                {
                    let svc = svc.clone();
                    let alice = alice.clone();
                    tokio::spawn(async move {
                        svc.mutate(doc.id, &alice, Some(start), &content_patch(json!({"by": "b"}))).await
                    })
                }
            );
            let results = [a.unwrap(), b.unwrap()];

            let winners: Vec<&VersionedDocument> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].version, start + 1);

            let conflicts: Vec<i64> = results
                .iter()
                .filter_map(|r| match r {
                    Err(MutationError::VersionConflict { current }) => Some(current.version),
                    _ => None,
                })
                .collect();
            assert_eq!(conflicts, vec![start + 1]);

            let stored = svc.get(doc.id).await.unwrap();
            assert_eq!(stored.version, start + 1);
            assert_eq!(stored.version_history.len(), 1);
        }
    }

    #[tokio::test]
    async fn listing_pages_and_scopes_to_owner() {
        let service = service();
        let alice = identity("alice");
        let bob = identity("bob");
        for i in 0..3 {
            service.create(&alice, format!("Alice run {}", i), json!({})).await.unwrap();
        }
        service.create(&bob, "Bob run".to_string(), json!({})).await.unwrap();

        let all = service.list(&alice, &ListDocumentsQuery::default()).await.unwrap();
        assert_eq!(all.documents.len(), 4);
        assert_eq!(all.pagination, Pagination { page: 1, limit: 20, total: 4, pages: 1 });

        let query = ListDocumentsQuery { page: Some(2), limit: Some(2), owner_only: true, ..Default::default() };
        let mine = service.list(&alice, &query).await.unwrap();
        assert_eq!(mine.pagination, Pagination { page: 2, limit: 2, total: 3, pages: 2 });
        assert_eq!(mine.documents.len(), 1);
        assert!(mine.documents.iter().all(|d| d.owner == "alice"));

        let query = ListDocumentsQuery { limit: Some(1000), status: Some(DocumentStatus::Archived), ..Default::default() };
        let archived = service.list(&bob, &query).await.unwrap();
        assert_eq!(archived.pagination.limit, 100);
        assert!(archived.documents.is_empty());
    }
}
