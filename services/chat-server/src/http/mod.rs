pub mod messages;
pub mod response;
pub mod sessions;

use serde::Serialize;

use crate::state::AppState;

/// Read-through, read side: a cached JSON list if present and parseable.
/// Cache trouble is never a request failure.
pub(crate) async fn read_cached_list(state: &AppState, key: &str) -> Option<serde_json::Value> {
    match state.cache.get(key).await {
        Ok(Some(cached)) => match serde_json::from_str(&cached) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "dropping unparseable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(key, error = %err, "cache read failed");
            None
        }
    }
}

/// Read-through, populate side: serialize the store result and cache it with
/// the standard TTL, returning the JSON for the response body.
pub(crate) async fn populate_list<T: Serialize>(
    state: &AppState,
    key: &str,
    items: &[T],
) -> Option<serde_json::Value> {
    match serde_json::to_value(items) {
        Ok(value) => {
            if let Err(err) = state.cache.set_with_ttl(key, &value.to_string()).await {
                tracing::warn!(key, error = %err, "cache populate failed");
            }
            Some(value)
        }
        Err(err) => {
            tracing::error!(error = %err, "list serialization failed");
            None
        }
    }
}
