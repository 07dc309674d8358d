use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Create a document
#[utoipa::path(
    post,
    path = "/api/v1/documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 201, description = "Document created at version 1", body = DocumentResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_create_doc() {}

/// List documents
#[utoipa::path(
    get,
    path = "/api/v1/documents",
    params(
        ("page" = Option<u32>, Query, description = "Page number, starting at 1"),
        ("limit" = Option<u32>, Query, description = "Page size, at most 100"),
        ("status" = Option<DocumentStatus>, Query, description = "Only documents in this status"),
        ("ownerOnly" = Option<bool>, Query, description = "Only the caller's own documents")
    ),
    responses(
        (status = 200, description = "One page of documents, newest first", body = DocumentListResponse),
        (status = 401, description = "Missing or invalid credential", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_list_doc() {}

/// Get a document
#[utoipa::path(
    get,
    path = "/api/v1/documents/{doc_id}",
    params(("doc_id" = String, Path, description = "Document UUID")),
    responses(
        (status = 200, description = "Current document state", body = DocumentResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_get_doc() {}

/// Apply a versioned mutation
#[utoipa::path(
    patch,
    path = "/api/v1/documents/{doc_id}",
    params(("doc_id" = String, Path, description = "Document UUID")),
    request_body = MutateDocumentRequest,
    responses(
        (status = 200, description = "Mutation accepted, version advanced by one", body = DocumentResponse),
        (status = 403, description = "Caller does not own the document", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse),
        (status = 409, description = "Stated version is not current", body = VersionConflictResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_update_doc() {}

/// Delete a document
#[utoipa::path(
    delete,
    path = "/api/v1/documents/{doc_id}",
    params(("doc_id" = String, Path, description = "Document UUID")),
    responses(
        (status = 200, description = "Document deleted", body = DocumentDeleteResponse),
        (status = 403, description = "Caller does not own the document", body = ErrorResponse),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn doc_delete_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        doc_create_doc,
        doc_list_doc,
        doc_get_doc,
        doc_update_doc,
        doc_delete_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ErrorResponse,
            CreateDocumentRequest,
            MutateDocumentRequest,
            DocumentPatch,
            DocumentStatus,
            DocumentResponse,
            DocumentListResponse,
            Pagination,
            VersionConflictResponse,
            VersionedDocument,
            VersionEntry,
            DocumentDeleteResponse,
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
