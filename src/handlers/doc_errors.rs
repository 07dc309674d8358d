use axum::{http::StatusCode, Json};
use tracing::{error, warn};
use uuid::Uuid;

use crate::models::ErrorResponse;
use crate::services::doc_edit_service::MutationError;

pub fn parse_doc_id(doc_id: &str) -> Result<Uuid, (StatusCode, Json<ErrorResponse>)> {
    Uuid::parse_str(doc_id).map_err(|e| {
        warn!("Invalid document UUID '{}': {}", doc_id, e);
        ErrorResponse::reply(StatusCode::BAD_REQUEST, format!("Invalid document UUID '{}'", doc_id))
    })
}

/// Map a document service failure onto an HTTP error. Conflicts that need the
/// dedicated 409 body are handled by the update handler itself.
pub fn mutation_error_reply(doc_id: &str, e: MutationError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        MutationError::NotFound => ErrorResponse::reply(StatusCode::NOT_FOUND, format!("Document '{}' not found", doc_id)),
        MutationError::Forbidden => ErrorResponse::reply(StatusCode::FORBIDDEN, "Forbidden"),
        MutationError::VersionConflict { current } => ErrorResponse::reply(
            StatusCode::CONFLICT,
            format!("Version conflict: document '{}' is at version {}", doc_id, current.version),
        ),
        MutationError::Store(e) => {
            error!("Store failure for document '{}': {}", doc_id, e);
            ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
