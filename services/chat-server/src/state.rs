use sqlx::MySqlPool;

use crate::cache::Cache;
use crate::dispatch::DispatcherHandle;

/// Shared handles threaded through every HTTP and socket handler. All
/// construction happens in `main`; nothing here is process-global.
#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub cache: Cache,
    pub dispatcher: DispatcherHandle,
}
