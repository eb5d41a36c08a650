use chrono::Utc;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::cache::{Cache, keys};
use crate::error::ChatError;
use crate::repo::{GroupAddMode, GroupRecord, GroupStatus, decode};

pub async fn insert_group(pool: &MySqlPool, group: &GroupRecord) -> Result<(), ChatError> {
    let member_blob = serde_json::to_string(&group.member_ids)?;
    sqlx::query(
        r"INSERT INTO group_info
              (uuid, name, notice, owner_id, add_mode, member_ids, member_count,
               avatar, status, created_at, updated_at)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&group.uuid)
    .bind(&group.name)
    .bind(&group.notice)
    .bind(&group.owner_id)
    .bind(group.add_mode.code())
    .bind(&member_blob)
    // member_count always mirrors the list, whatever the caller passed
    .bind(group.member_ids.len() as i64)
    .bind(&group.avatar)
    .bind(group.status.code())
    .bind(group.created_at)
    .bind(group.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn load_group(pool: &MySqlPool, group_id: &str) -> Result<Option<GroupRecord>, ChatError> {
    let row = sqlx::query("SELECT * FROM group_info WHERE uuid = ? AND deleted_at IS NULL")
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Decoded member list for fan-out. A missing or dissolved group yields an
/// empty list: the message is already persisted, it just reaches nobody.
pub async fn group_members(pool: &MySqlPool, group_id: &str) -> Result<Vec<String>, ChatError> {
    Ok(load_group(pool, group_id)
        .await?
        .map(|group| group.member_ids)
        .unwrap_or_default())
}

pub async fn append_group_member(
    pool: &MySqlPool,
    cache: &Cache,
    group_id: &str,
    user_id: &str,
) -> Result<(), ChatError> {
    let mut tx = pool.begin().await?;
    let mut members = locked_member_ids(&mut tx, group_id).await?;
    if !members.iter().any(|member| member == user_id) {
        members.push(user_id.to_owned());
        store_member_ids(&mut tx, group_id, &members).await?;
    }
    tx.commit().await?;

    invalidate_membership_views(cache, group_id, user_id).await;
    Ok(())
}

pub async fn remove_group_member(
    pool: &MySqlPool,
    cache: &Cache,
    group_id: &str,
    user_id: &str,
) -> Result<(), ChatError> {
    let mut tx = pool.begin().await?;
    let mut members = locked_member_ids(&mut tx, group_id).await?;
    let before = members.len();
    members.retain(|member| member != user_id);
    if members.len() != before {
        store_member_ids(&mut tx, group_id, &members).await?;
    }
    tx.commit().await?;

    invalidate_membership_views(cache, group_id, user_id).await;
    Ok(())
}

/// Partial profile update; `None` keeps the stored value.
#[derive(Debug, Default, Clone)]
pub struct GroupPatch {
    pub name: Option<String>,
    pub notice: Option<String>,
    pub avatar: Option<String>,
    pub add_mode: Option<GroupAddMode>,
}

pub async fn set_group_fields(
    pool: &MySqlPool,
    cache: &Cache,
    group_id: &str,
    patch: &GroupPatch,
) -> Result<(), ChatError> {
    sqlx::query(
        r"UPDATE group_info
          SET name = COALESCE(?, name),
              notice = COALESCE(?, notice),
              avatar = COALESCE(?, avatar),
              add_mode = COALESCE(?, add_mode),
              updated_at = ?
          WHERE uuid = ? AND deleted_at IS NULL",
    )
    .bind(&patch.name)
    .bind(&patch.notice)
    .bind(&patch.avatar)
    .bind(patch.add_mode.map(GroupAddMode::code))
    .bind(Utc::now().naive_utc())
    .bind(group_id)
    .execute(pool)
    .await?;

    log_cache_error(cache.delete_exact(&keys::group_info(group_id)).await);
    log_cache_error(cache.delete_exact(&keys::group_member_list(group_id)).await);
    Ok(())
}

/// Owner-initiated dissolution: the group row, every session pointing at it,
/// every membership edge, and every pending apply go with it, atomically.
pub async fn dismiss_group(
    pool: &MySqlPool,
    cache: &Cache,
    group_id: &str,
) -> Result<(), ChatError> {
    let now = Utc::now().naive_utc();
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "SELECT owner_id, member_ids FROM group_info WHERE uuid = ? AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(group_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(row) = row else {
        return Err(ChatError::user_visible("the group does not exist"));
    };
    let owner_id: String = row.try_get("owner_id")?;
    let member_blob: String = row.try_get("member_ids")?;
    let members: Vec<String> = serde_json::from_str(&member_blob)?;

    sqlx::query(
        "UPDATE group_info SET status = ?, deleted_at = ?, updated_at = ? WHERE uuid = ?",
    )
    .bind(GroupStatus::Dissolved.code())
    .bind(now)
    .bind(now)
    .bind(group_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE session SET deleted_at = ?, updated_at = ? WHERE receive_id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE user_contact SET deleted_at = ?, updated_at = ? WHERE contact_id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE contact_apply SET deleted_at = ?, updated_at = ? WHERE contact_id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    log_cache_error(cache.delete_exact(&keys::group_info(group_id)).await);
    log_cache_error(cache.delete_exact(&keys::group_member_list(group_id)).await);
    log_cache_error(cache.delete_exact(&keys::contact_my_group_list(&owner_id)).await);
    for member in &members {
        log_cache_error(cache.delete_exact(&keys::my_joined_group_list(member)).await);
        log_cache_error(cache.delete_exact(&keys::group_session_list(member)).await);
    }
    // Open-session cache entries addressed at the group.
    log_cache_error(cache.delete_pattern(&format!("session_*_{group_id}_*")).await);
    Ok(())
}

async fn locked_member_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    group_id: &str,
) -> Result<Vec<String>, ChatError> {
    let row = sqlx::query(
        "SELECT member_ids FROM group_info WHERE uuid = ? AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(group_id)
    .fetch_optional(&mut **tx)
    .await?;
    let Some(row) = row else {
        return Err(ChatError::user_visible("the group does not exist"));
    };
    let blob: String = row.try_get("member_ids")?;
    Ok(serde_json::from_str(&blob)?)
}

async fn store_member_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    group_id: &str,
    members: &[String],
) -> Result<(), ChatError> {
    sqlx::query(
        "UPDATE group_info SET member_ids = ?, member_count = ?, updated_at = ? WHERE uuid = ?",
    )
    .bind(serde_json::to_string(members)?)
    .bind(members.len() as i64)
    .bind(Utc::now().naive_utc())
    .bind(group_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn invalidate_membership_views(cache: &Cache, group_id: &str, user_id: &str) {
    log_cache_error(cache.delete_exact(&keys::group_info(group_id)).await);
    log_cache_error(cache.delete_exact(&keys::group_member_list(group_id)).await);
    log_cache_error(cache.delete_exact(&keys::my_joined_group_list(user_id)).await);
}

fn log_cache_error(result: Result<(), crate::cache::CacheError>) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "cache invalidation failed");
    }
}

fn record_from_row(row: &MySqlRow) -> Result<GroupRecord, ChatError> {
    let add_mode_code: i8 = row.try_get("add_mode")?;
    let status_code: i8 = row.try_get("status")?;
    let member_blob: String = row.try_get("member_ids")?;
    Ok(GroupRecord {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        notice: row.try_get("notice")?,
        owner_id: row.try_get("owner_id")?,
        add_mode: decode("group add_mode", add_mode_code, GroupAddMode::from_code(add_mode_code))?,
        member_ids: serde_json::from_str(&member_blob)?,
        member_count: row.try_get("member_count")?,
        avatar: row.try_get("avatar")?,
        status: decode("group", status_code, GroupStatus::from_code(status_code))?,
        created_at: row.try_get("created_at")?,
    })
}
