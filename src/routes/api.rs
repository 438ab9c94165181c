use crate::{
    docs::ApiDoc,
    handlers::{add_file, delete_file, diagnostics, get_id, health_check, preview},
    AppState,
};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create the control API, preview and support routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(preview).post(add_file).delete(delete_file))
        .route("/getid", get(get_id))
        .route("/health", get(health_check))
        .route("/diagnostics", get(diagnostics))
        .with_state(state)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}
