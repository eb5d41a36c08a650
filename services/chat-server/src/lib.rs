pub mod cache;
pub mod client;
pub mod config;
pub mod constants;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ids;
pub mod ingress;
pub mod registry;
pub mod repo;
pub mod state;
pub mod store;
pub mod ws;

pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(health::healthz))
        .route("/api/v1/messages/list", post(http::messages::get_message_list))
        .route(
            "/api/v1/messages/group-list",
            post(http::messages::get_group_message_list),
        )
        .route("/api/v1/sessions/list", post(http::sessions::list_user_sessions))
        .route(
            "/api/v1/sessions/group-list",
            post(http::sessions::list_group_sessions),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }
}
