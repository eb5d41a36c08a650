//! Cache coordinator: every key the server caches is built by [`keys`] and
//! owned here. Values are JSON snapshots with a fixed TTL; invalidation is
//! eventual — nothing stale survives past the TTL.

use crate::constants::CACHE_TTL_MINUTES;
use crate::dispatch::DispatchCache;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("{matches} keys match {pattern:?}, expected exactly one")]
    Ambiguous { pattern: String, matches: usize },
}

#[derive(Clone)]
pub struct Cache {
    manager: ConnectionManager,
}

impl Cache {
    pub async fn connect(url: &str) -> Result<Cache, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Cache { manager })
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    pub async fn set_with_ttl(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, CACHE_TTL_MINUTES * 60)
            .await?;
        Ok(())
    }

    pub async fn delete_exact(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.delete_pattern(&format!("{prefix}*")).await
    }

    pub async fn delete_suffix(&self, suffix: &str) -> Result<(), CacheError> {
        self.delete_pattern(&format!("*{suffix}")).await
    }

    pub async fn delete_pattern(&self, pattern: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let matched: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;
        if !matched.is_empty() {
            conn.del::<_, ()>(matched).await?;
        }
        Ok(())
    }

    /// SCAN-based flush, used only by the best-effort shutdown path.
    pub async fn delete_all(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        loop {
            let (next, matched): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .query_async(&mut conn)
                .await?;
            if !matched.is_empty() {
                conn.del::<_, ()>(matched).await?;
            }
            cursor = next;
            if cursor == 0 {
                return Ok(());
            }
        }
    }

    /// Resolves a prefix expected to match at most one key (the open-session
    /// lookup). More than one match is a coherency fault, not a result.
    pub async fn single_key_with_prefix(&self, prefix: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let pattern = format!("{prefix}*");
        let matched: Vec<String> = redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await?;
        match matched.len() {
            0 => Ok(None),
            1 => Ok(matched.into_iter().next()),
            matches => Err(CacheError::Ambiguous { pattern, matches }),
        }
    }

    /// Appends an item to a cached JSON list when (and only when) the key is
    /// present, resetting its TTL. An absent key is left for the next
    /// read-through to populate. Returns whether an append happened.
    pub async fn append_list_item(
        &self,
        key: &str,
        item: &serde_json::Value,
    ) -> Result<bool, CacheError> {
        let Some(cached) = self.get(key).await? else {
            return Ok(false);
        };
        let mut list: Vec<serde_json::Value> = match serde_json::from_str(&cached) {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(key, error = %err, "replacing unparseable cached list");
                Vec::new()
            }
        };
        list.push(item.clone());
        let serialized = serde_json::Value::Array(list).to_string();
        self.set_with_ttl(key, &serialized).await?;
        Ok(true)
    }
}

#[async_trait]
impl DispatchCache for Cache {
    async fn append_history(
        &self,
        key: &str,
        item: &serde_json::Value,
    ) -> Result<(), CacheError> {
        self.append_list_item(key, item).await.map(|_| ())
    }
}

/// Builders for the documented key space. Mutators invalidate through these
/// so a renamed pattern cannot drift out of sync with the read paths.
pub mod keys {
    pub fn direct_history(sender: &str, receiver: &str) -> String {
        format!("message_list_{sender}_{receiver}")
    }

    pub fn group_history(group_id: &str) -> String {
        format!("group_messagelist_{group_id}")
    }

    pub fn session_list(user_id: &str) -> String {
        format!("session_list_{user_id}")
    }

    pub fn group_session_list(user_id: &str) -> String {
        format!("group_session_list_{user_id}")
    }

    pub fn contact_user_list(user_id: &str) -> String {
        format!("contact_user_list_{user_id}")
    }

    pub fn contact_my_group_list(user_id: &str) -> String {
        format!("contact_mygroup_list_{user_id}")
    }

    pub fn my_joined_group_list(user_id: &str) -> String {
        format!("my_joined_group_list_{user_id}")
    }

    pub fn user_info(user_id: &str) -> String {
        format!("user_info_{user_id}")
    }

    pub fn group_info(group_id: &str) -> String {
        format!("group_info_{group_id}")
    }

    pub fn group_member_list(group_id: &str) -> String {
        format!("group_memberlist_{group_id}")
    }

    pub fn auth_code(telephone: &str) -> String {
        format!("auth_code_{telephone}")
    }

    pub fn open_session(send_id: &str, receive_id: &str, session_id: &str) -> String {
        format!("session_{send_id}_{receive_id}_{session_id}")
    }

    /// Prefix for the single-match open-session lookup.
    pub fn open_session_prefix(send_id: &str, receive_id: &str) -> String {
        format!("session_{send_id}_{receive_id}_")
    }
}
