use chrono::Utc;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::cache::{Cache, keys};
use crate::error::ChatError;
use crate::repo::{UserRecord, UserStatus, decode};

pub async fn insert_user(pool: &MySqlPool, user: &UserRecord) -> Result<(), ChatError> {
    let now = Utc::now().naive_utc();
    sqlx::query(
        r"INSERT INTO user_info
              (uuid, nickname, telephone, avatar, status, is_admin, created_at, updated_at)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.uuid)
    .bind(&user.nickname)
    .bind(&user.telephone)
    .bind(&user.avatar)
    .bind(user.status.code())
    .bind(user.is_admin)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_user(pool: &MySqlPool, user_id: &str) -> Result<Option<UserRecord>, ChatError> {
    let row = sqlx::query(
        "SELECT uuid, nickname, telephone, avatar, status, is_admin FROM user_info WHERE uuid = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Enable/disable toggle used by the admin collaborator; the dispatch core
/// only observes the result through session policy checks.
pub async fn set_user_status(
    pool: &MySqlPool,
    cache: &Cache,
    user_id: &str,
    status: UserStatus,
) -> Result<(), ChatError> {
    sqlx::query("UPDATE user_info SET status = ?, updated_at = ? WHERE uuid = ? AND deleted_at IS NULL")
        .bind(status.code())
        .bind(Utc::now().naive_utc())
        .bind(user_id)
        .execute(pool)
        .await?;

    for key in [
        keys::user_info(user_id),
        keys::session_list(user_id),
        keys::contact_user_list(user_id),
    ] {
        if let Err(err) = cache.delete_exact(&key).await {
            tracing::warn!(key, error = %err, "cache invalidation failed");
        }
    }
    Ok(())
}

fn record_from_row(row: &MySqlRow) -> Result<UserRecord, ChatError> {
    let status_code: i8 = row.try_get("status")?;
    Ok(UserRecord {
        uuid: row.try_get("uuid")?,
        nickname: row.try_get("nickname")?,
        telephone: row.try_get("telephone")?,
        avatar: row.try_get("avatar")?,
        status: decode("user", status_code, UserStatus::from_code(status_code))?,
        is_admin: row.try_get("is_admin")?,
    })
}
