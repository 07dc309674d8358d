use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::AppState;
use crate::models::{DocumentDeleteResponse, ErrorResponse, Identity};
use super::doc_errors::{mutation_error_reply, parse_doc_id};

/// Delete a document. Only its owner may do so.
pub async fn doc_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(doc_id): Path<String>,
) -> Result<(StatusCode, Json<DocumentDeleteResponse>), (StatusCode, Json<ErrorResponse>)> {
    let doc_uuid = parse_doc_id(&doc_id)?;

    state
        .docs
        .delete(doc_uuid, &identity)
        .await
        .map_err(|e| mutation_error_reply(&doc_id, e))?;
    info!("Document '{}' deleted", doc_id);

    Ok((
        StatusCode::OK,
        Json(DocumentDeleteResponse { message: "Document deleted".to_string() }),
    ))
}
