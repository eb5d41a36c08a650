//! Connection upgrader: `/ws?client_id=U...` becomes a Client on the
//! dispatcher's Login port. Origin checks are a concern of the fronting
//! proxy; any origin is accepted here.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chat_protocol::RecipientKind;
use serde::Deserialize;

use crate::client;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub client_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if RecipientKind::of(&query.client_id) != Some(RecipientKind::User) {
        return (StatusCode::BAD_REQUEST, "client_id must be a user id").into_response();
    }

    tracing::info!(client_id = %query.client_id, "socket upgrade");
    ws.on_upgrade(move |socket| client::run(socket, query.client_id, state))
        .into_response()
}
