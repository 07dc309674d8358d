use axum::{extract::{Extension, Query, State}, http::StatusCode, Json};

use crate::AppState;
use crate::models::{DocumentListResponse, ErrorResponse, Identity, ListDocumentsQuery};
use super::doc_errors::mutation_error_reply;

/// List documents, newest first, optionally only the caller's own
pub async fn doc_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<(StatusCode, Json<DocumentListResponse>), (StatusCode, Json<ErrorResponse>)> {
    let listing = state
        .docs
        .list(&identity, &query)
        .await
        .map_err(|e| mutation_error_reply("*", e))?;
    Ok((StatusCode::OK, Json(listing)))
}
