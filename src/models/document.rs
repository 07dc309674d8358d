use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Draft,
    Active,
    Completed,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Active => "active",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DocumentStatus::Draft),
            "active" => Some(DocumentStatus::Active),
            "completed" => Some(DocumentStatus::Completed),
            "archived" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }
}

/// One accepted write. `version` is the document version the write produced.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub version: i64,
    pub title: String,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
}

/// A document whose mutations are guarded by its version number.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionedDocument {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub status: DocumentStatus,
    pub content: serde_json::Value,
    pub version: i64,
    pub version_history: Vec<VersionEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VersionedDocument {
    pub fn new(owner: &str, title: String, content: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            title,
            status: DocumentStatus::Draft,
            content,
            version: 1,
            version_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Room that viewers of this document join.
    pub fn room_name(&self) -> String {
        room_name(&self.id.to_string())
    }
}

pub fn room_name(document_id: &str) -> String {
    format!("document:{}", document_id)
}

/// Fields a mutation may replace. Absent fields keep their current value.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Request body for creating a document
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// Request body for a versioned mutation
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MutateDocumentRequest {
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(flatten)]
    pub patch: DocumentPatch,
}

/// Response wrapping a single document
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    pub document: VersionedDocument,
}

/// Body of a 409 response
#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VersionConflictResponse {
    pub error: String,
    pub current_version: i64,
    pub server_document: VersionedDocument,
}

/// Query string of the document listing
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub owner_only: bool,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// One page of documents, newest first
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<VersionedDocument>,
    pub pagination: Pagination,
}
