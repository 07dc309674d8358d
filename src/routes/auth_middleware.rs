use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::AppState;
use crate::models::ErrorResponse;
use crate::services::auth_service::extract_credential;
use crate::ws::socket::WsParams;

/// Authenticate an API request and hand its `Identity` to downstream handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    mut req: Request,
    next: Next,
) -> Response {

    // 1. Get the credential from the request
    let credential = extract_credential(req.headers(), params.token.as_deref());

    // 2. Validate it
    let identity = match state.authenticator.authenticate(credential.as_deref()) {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected API request to {}: {}", req.uri().path(), e);
            return ErrorResponse::reply(StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };
    debug!("API request to {} by {}", req.uri().path(), identity.id);

    // 3. Set the identity into request extensions for downstream handlers
    req.extensions_mut().insert(identity);

    next.run(req).await
}
