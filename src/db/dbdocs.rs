use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::{ConditionalWrite, DocumentFilter, DocumentStore, StoreError};
use crate::models::{DocumentStatus, VersionEntry, VersionedDocument};

/// Document row from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    owner: String,
    title: String,
    status: String,
    content: Json<serde_json::Value>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Version history row
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentVersionRow {
    version: i64,
    title: String,
    content: Json<serde_json::Value>,
    notes: Option<String>,
    updated_by: String,
    created_at: DateTime<Utc>,
}

impl From<DocumentVersionRow> for VersionEntry {
    fn from(row: DocumentVersionRow) -> Self {
        VersionEntry {
            version: row.version,
            title: row.title,
            content: row.content.0,
            notes: row.notes,
            updated_by: row.updated_by,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL backed store. The conditional write is an
/// `UPDATE ... WHERE version = $expected` so the database, not this process,
/// decides which of several concurrent writers wins.
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the tables this store needs if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id UUID PRIMARY KEY,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'draft',
                content JSONB NOT NULL DEFAULT '{}'::jsonb,
                version BIGINT NOT NULL DEFAULT 1 CHECK (version >= 1),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_versions (
                document UUID NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                version BIGINT NOT NULL,
                title TEXT NOT NULL,
                content JSONB NOT NULL,
                notes TEXT,
                updated_by TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (document, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Document schema ready");
        Ok(())
    }

    fn to_document(row: DocumentRow, history: Vec<DocumentVersionRow>) -> Result<VersionedDocument, StoreError> {
        let status = DocumentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}' on document {}", row.status, row.id)))?;
        Ok(VersionedDocument {
            id: row.id,
            owner: row.owner,
            title: row.title,
            status,
            content: row.content.0,
            version: row.version,
            version_history: history.into_iter().map(VersionEntry::from).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Read-only transaction whose statements all see one snapshot, so a
    /// document row and its history always agree.
    async fn snapshot(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, SqlxError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn fetch_history<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        document: Uuid,
    ) -> Result<Vec<DocumentVersionRow>, SqlxError> {
        sqlx::query_as::<_, DocumentVersionRow>(
            r#"
            SELECT version, title, content, notes, updated_by, created_at
            FROM document_versions
            WHERE document = $1
            ORDER BY version ASC
            "#,
        )
        .bind(document)
        .fetch_all(&mut **tx)
        .await
    }

    async fn insert_version<'c>(
        tx: &mut sqlx::Transaction<'c, sqlx::Postgres>,
        document: Uuid,
        entry: &VersionEntry,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO document_versions(document, version, title, content, notes, updated_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document)
        .bind(entry.version)
        .bind(&entry.title)
        .bind(Json(&entry.content))
        .bind(&entry.notes)
        .bind(&entry.updated_by)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, doc: VersionedDocument) -> Result<VersionedDocument, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents(id, owner, title, status, content, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(doc.id)
        .bind(&doc.owner)
        .bind(&doc.title)
        .bind(doc.status.as_str())
        .bind(Json(&doc.content))
        .bind(doc.version)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&mut *tx)
        .await?;

        for entry in doc.version_history.iter() {
            Self::insert_version(&mut tx, doc.id, entry).await?;
        }

        tx.commit().await?;
        info!("Document {} created by {}", doc.id, doc.owner);
        Ok(doc)
    }

    async fn get(&self, id: Uuid) -> Result<Option<VersionedDocument>, StoreError> {
        let mut tx = self.snapshot().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, owner, title, status, content, version, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match row {
            Some(row) => row,
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        let history = Self::fetch_history(&mut tx, id).await?;
        tx.commit().await?;

        Self::to_document(row, history).map(Some)
    }

    async fn replace_if_version(
        &self,
        expected_version: i64,
        next: VersionedDocument,
    ) -> Result<ConditionalWrite, StoreError> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool. Pool state: {} idle, {} total",
                    self.pool.num_idle(),
                    self.pool.size()
                );
                return Err(e.into());
            }
        };

        // The row lock taken by this UPDATE serializes concurrent writers; a
        // loser re-evaluates the WHERE clause against the winner's row.
        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET title = $1,
                status = $2,
                content = $3,
                version = $4,
                updated_at = $5
            WHERE id = $6
                AND version = $7
            RETURNING id;
            "#,
        )
        .bind(&next.title)
        .bind(next.status.as_str())
        .bind(Json(&next.content))
        .bind(next.version)
        .bind(next.updated_at)
        .bind(next.id)
        .bind(expected_version)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            return match self.get(next.id).await? {
                Some(current) => Ok(ConditionalWrite::Stale(current)),
                None => Ok(ConditionalWrite::Missing),
            };
        }

        if let Some(entry) = next.version_history.last() {
            Self::insert_version(&mut tx, next.id, entry).await?;
        }

        tx.commit().await?;
        info!("Document {} advanced to version {}", next.id, next.version);
        Ok(ConditionalWrite::Applied(next))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM documents WHERE id = $1 RETURNING id")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(deleted.is_some())
    }

    async fn list(&self, filter: &DocumentFilter) -> Result<(Vec<VersionedDocument>, u64), StoreError> {
        let owner = filter.owner.as_deref();
        let status = filter.status.map(|s| s.as_str());
        let mut tx = self.snapshot().await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM documents
            WHERE ($1::text IS NULL OR owner = $1)
                AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(owner)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT id, owner, title, status, content, version, created_at, updated_at
            FROM documents
            WHERE ($1::text IS NULL OR owner = $1)
                AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner)
        .bind(status)
        .bind(filter.limit as i64)
        .bind(filter.offset as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let history = Self::fetch_history(&mut tx, row.id).await?;
            documents.push(Self::to_document(row, history)?);
        }
        tx.commit().await?;

        Ok((documents, total.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    /// Needs a scratch database in `TEST_DATABASE_URL`; skipped otherwise.
    async fn store() -> Option<PgDocumentStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PgDocumentStore::connect(&url).await.unwrap();
        store.init_schema().await.unwrap();
        Some(store)
    }

    fn advance(mut doc: VersionedDocument, editor: &str) -> VersionedDocument {
        doc.version += 1;
        doc.updated_at = Utc::now();
        doc.version_history.push(VersionEntry {
            version: doc.version,
            title: doc.title.clone(),
            content: doc.content.clone(),
            notes: None,
            updated_by: editor.to_string(),
            created_at: doc.updated_at,
        });
        doc
    }

    #[tokio::test]
    async fn reads_never_see_history_ahead_of_version() {
        let Some(store) = store().await else { return };
        let store = Arc::new(store);
        let doc = store
            .insert(VersionedDocument::new("alice", "Plasmid prep".to_string(), json!({})))
            .await
            .unwrap();

        let writer = {
            let store = store.clone();
            let mut current = doc.clone();
            tokio::spawn(async move {
                for _ in 0..30 {
                    let next = advance(current.clone(), "alice");
                    match store.replace_if_version(current.version, next).await.unwrap() {
                        ConditionalWrite::Applied(doc) => current = doc,
                        other => panic!("unexpected {:?}", other),
                    }
                }
            })
        };

        for _ in 0..100 {
            let read = store.get(doc.id).await.unwrap().unwrap();
            let newest = read.version_history.last().map(|e| e.version).unwrap_or(1);
            assert_eq!(newest, read.version);
        }
        writer.await.unwrap();

        let read = store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(read.version, 31);
        assert!(store.delete(doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn stale_guard_returns_stored_state() {
        let Some(store) = store().await else { return };
        let doc = store
            .insert(VersionedDocument::new("alice", "Western blot".to_string(), json!({})))
            .await
            .unwrap();

        let first = advance(doc.clone(), "alice");
        assert!(matches!(store.replace_if_version(1, first).await.unwrap(), ConditionalWrite::Applied(_)));

        let late = advance(doc.clone(), "bob");
        match store.replace_if_version(1, late).await.unwrap() {
            ConditionalWrite::Stale(current) => assert_eq!(current.version, 2),
            other => panic!("expected stale, got {:?}", other),
        }
        assert!(store.delete(doc.id).await.unwrap());
    }
}
