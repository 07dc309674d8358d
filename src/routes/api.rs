use crate::{
    docs::ApiDoc,
    handlers::{diagnostics, doc_create, doc_delete, doc_get, doc_list, doc_update, health_check, ready_check},
    routes::auth_middleware::auth_middleware,
    ws::socket::websocket_handler,
    AppState,
};
use axum::{http::HeaderValue, middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/v1/diagnostics", get(diagnostics))
        .route("/v1/documents", get(doc_list).post(doc_create))
        .route("/v1/documents/:doc_id", get(doc_get).patch(doc_update).delete(doc_delete))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)) // Applies to all routes added above
        .with_state(state)
}

/// The complete application router
pub fn create_app(state: AppState, cors_origin: &str) -> Router {
    let cors = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        Err(e) => {
            warn!("Invalid CORS origin '{}': {}. Cross-origin requests will be refused", cors_origin, e);
            CorsLayer::new()
        }
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/ws", get(websocket_handler))
        .with_state(state.clone())
        .nest("/api", create_api_routes(state))
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
