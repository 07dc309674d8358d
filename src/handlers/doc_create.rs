use axum::{extract::{Extension, State}, http::StatusCode, Json};

use crate::AppState;
use crate::models::{CreateDocumentRequest, DocumentResponse, ErrorResponse, Identity};
use super::doc_errors::mutation_error_reply;

/// Create a document at version 1
pub async fn doc_create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), (StatusCode, Json<ErrorResponse>)> {
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(ErrorResponse::reply(StatusCode::BAD_REQUEST, "Title is required"));
    }

    let document = state
        .docs
        .create(&identity, title, request.content)
        .await
        .map_err(|e| mutation_error_reply("new", e))?;

    Ok((StatusCode::CREATED, Json(DocumentResponse { document })))
}
