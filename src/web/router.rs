//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::handlers::{self, AppState};
use crate::web::websocket;
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/", get(handlers::index))
        // Trigger API
        .route("/triggers", get(handlers::list_triggers))
        .route(
            "/triggers/:name",
            get(handlers::get_trigger).post(handlers::set_trigger),
        )
        // Reading API
        .route("/api/reading", get(handlers::get_reading))
        .route("/api/health", get(handlers::health_check))
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state);

    // Add CORS if enabled
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
