//! Chat-history read endpoints. Both are read-through: cache hit returns the
//! snapshot, miss loads from the store, populates the cache, and returns.
//! An empty history is a success with an empty list, never an error.

use axum::Json;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use crate::cache::keys;
use crate::http::{populate_list, read_cached_list, response};
use crate::repo;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageListRequest {
    pub user_one_id: String,
    pub user_two_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupMessageListRequest {
    pub group_id: String,
}

pub async fn get_message_list(
    State(state): State<AppState>,
    Json(request): Json<MessageListRequest>,
) -> Response {
    let key = keys::direct_history(&request.user_one_id, &request.user_two_id);
    if let Some(cached) = read_cached_list(&state, &key).await {
        return response::ok("message list", Some(cached));
    }

    match repo::messages::load_direct_history(
        &state.pool,
        &request.user_one_id,
        &request.user_two_id,
    )
    .await
    {
        Ok(records) => {
            let items: Vec<_> = records
                .iter()
                .map(repo::MessageRecord::to_direct_item)
                .collect();
            let data = populate_list(&state, &key, &items).await;
            response::ok("message list", data)
        }
        Err(err) => response::from_error(&err),
    }
}

pub async fn get_group_message_list(
    State(state): State<AppState>,
    Json(request): Json<GroupMessageListRequest>,
) -> Response {
    let key = keys::group_history(&request.group_id);
    if let Some(cached) = read_cached_list(&state, &key).await {
        return response::ok("group message list", Some(cached));
    }

    match repo::messages::load_group_history(&state.pool, &request.group_id).await {
        Ok(records) => {
            let items: Vec<_> = records
                .iter()
                .map(repo::MessageRecord::to_group_item)
                .collect();
            let data = populate_list(&state, &key, &items).await;
            response::ok("group message list", data)
        }
        Err(err) => response::from_error(&err),
    }
}
