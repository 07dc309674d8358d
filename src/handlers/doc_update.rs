use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::AppState;
use crate::models::{DocumentResponse, Identity, MutateDocumentRequest, ServerEvent, VersionConflictResponse};
use crate::services::doc_edit_service::MutationError;
use super::doc_errors::{mutation_error_reply, parse_doc_id};

/// Apply a versioned mutation.
///
/// The body carries the version the client believes is current. On success
/// the change is echoed to everyone viewing the document, the editor included.
pub async fn doc_update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(doc_id): Path<String>,
    Json(request): Json<MutateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), Response> {
    let doc_uuid = parse_doc_id(&doc_id).map_err(IntoResponse::into_response)?;

    let document = match state.docs.mutate(doc_uuid, &identity, request.version, &request.patch).await {
        Ok(document) => document,
        Err(MutationError::VersionConflict { current }) => {
            info!(
                "Rejected update of document '{}' at version {:?}; current version is {}",
                doc_id, request.version, current.version
            );
            let body = VersionConflictResponse {
                error: "Version conflict".to_string(),
                current_version: current.version,
                server_document: *current,
            };
            return Err((StatusCode::CONFLICT, Json(body)).into_response());
        }
        Err(e) => return Err(mutation_error_reply(&doc_id, e).into_response()),
    };

    let delta = serde_json::to_value(&request.patch).unwrap_or_default();
    let delivered = state
        .hub
        .broadcast_to_all(
            &document.room_name(),
            ServerEvent::DocumentUpdated {
                document_id: document.id.to_string(),
                delta,
                updated_by: identity.id.clone(),
                version: Some(document.version),
            },
        )
        .await;
    info!("Document '{}' at version {} echoed to {} viewer(s)", doc_id, document.version, delivered);

    Ok((StatusCode::OK, Json(DocumentResponse { document })))
}
