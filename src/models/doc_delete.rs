use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response returned after deleting a document
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DocumentDeleteResponse {
    pub message: String,
}
