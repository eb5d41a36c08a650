//! MySQL-backed implementation of the dispatcher's store seam.

use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::dispatch::DispatchStore;
use crate::error::ChatError;
use crate::repo::{self, MessageRecord};

#[derive(Clone)]
pub struct SqlStore {
    pool: MySqlPool,
}

impl SqlStore {
    pub fn new(pool: MySqlPool) -> SqlStore {
        SqlStore { pool }
    }
}

#[async_trait]
impl DispatchStore for SqlStore {
    async fn insert_message(&self, message: &MessageRecord) -> Result<(), ChatError> {
        repo::messages::insert_message(&self.pool, message).await
    }

    async fn mark_message_sent(&self, message_id: &str) -> Result<(), ChatError> {
        repo::messages::mark_message_sent(&self.pool, message_id).await
    }

    async fn group_members(&self, group_id: &str) -> Result<Vec<String>, ChatError> {
        repo::groups::group_members(&self.pool, group_id).await
    }
}
