//! Session-list read endpoints, split by recipient tag: `U…` peers on one
//! path, `G…` groups on the other.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use chat_protocol::TIMESTAMP_FORMAT;
use serde::{Deserialize, Serialize};

use crate::cache::keys;
use crate::http::{populate_list, read_cached_list, response};
use crate::repo::{self, SessionRecord};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SessionListRequest {
    pub owner_id: String,
}

/// Cached/served session snapshot.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionItem {
    pub session_id: String,
    pub receive_id: String,
    pub receive_name: String,
    pub avatar: String,
    pub created_at: String,
}

impl SessionItem {
    fn from_record(record: &SessionRecord) -> SessionItem {
        SessionItem {
            session_id: record.uuid.clone(),
            receive_id: record.receive_id.clone(),
            receive_name: record.receive_name.clone(),
            avatar: record.avatar.clone(),
            created_at: record.created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

pub async fn list_user_sessions(
    State(state): State<AppState>,
    Json(request): Json<SessionListRequest>,
) -> Response {
    let key = keys::session_list(&request.owner_id);
    if let Some(cached) = read_cached_list(&state, &key).await {
        return response::ok("session list", Some(cached));
    }

    match repo::sessions::list_user_sessions(&state.pool, &request.owner_id).await {
        Ok(records) => {
            let items: Vec<_> = records.iter().map(SessionItem::from_record).collect();
            let data = populate_list(&state, &key, &items).await;
            response::ok("session list", data)
        }
        Err(err) => response::from_error(&err),
    }
}

pub async fn list_group_sessions(
    State(state): State<AppState>,
    Json(request): Json<SessionListRequest>,
) -> Response {
    let key = keys::group_session_list(&request.owner_id);
    if let Some(cached) = read_cached_list(&state, &key).await {
        return response::ok("group session list", Some(cached));
    }

    match repo::sessions::list_group_sessions(&state.pool, &request.owner_id).await {
        Ok(records) => {
            let items: Vec<_> = records.iter().map(SessionItem::from_record).collect();
            let data = populate_list(&state, &key, &items).await;
            response::ok("group session list", data)
        }
        Err(err) => response::from_error(&err),
    }
}
