use axum::{extract::{Path, State}, http::StatusCode, Json};

use crate::AppState;
use crate::models::{DocumentResponse, ErrorResponse};
use super::doc_errors::{mutation_error_reply, parse_doc_id};

/// Get the current state of a document, history included
pub async fn doc_get(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<(StatusCode, Json<DocumentResponse>), (StatusCode, Json<ErrorResponse>)> {
    let doc_uuid = parse_doc_id(&doc_id)?;
    let document = state.docs.get(doc_uuid).await.map_err(|e| mutation_error_reply(&doc_id, e))?;
    Ok((StatusCode::OK, Json(DocumentResponse { document })))
}
