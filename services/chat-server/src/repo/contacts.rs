use chrono::Utc;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::cache::{Cache, keys};
use crate::error::ChatError;
use crate::ids;
use crate::repo::{ApplyRecord, ApplyStatus, ContactKind, ContactRecord, ContactStatus, decode};

pub async fn insert_contact(
    pool: &MySqlPool,
    user_id: &str,
    contact_id: &str,
    contact_type: ContactKind,
) -> Result<(), ChatError> {
    let now = Utc::now().naive_utc();
    sqlx::query(
        r"INSERT INTO user_contact
              (user_id, contact_id, contact_type, status, created_at, updated_at)
          VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(contact_id)
    .bind(contact_type.code())
    .bind(ContactStatus::Normal.code())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_contact(
    pool: &MySqlPool,
    user_id: &str,
    contact_id: &str,
) -> Result<Option<ContactRecord>, ChatError> {
    let row = sqlx::query(
        r"SELECT user_id, contact_id, contact_type, status FROM user_contact
          WHERE user_id = ? AND contact_id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(contact_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(contact_from_row).transpose()
}

pub async fn set_contact_status(
    pool: &MySqlPool,
    cache: &Cache,
    user_id: &str,
    contact_id: &str,
    status: ContactStatus,
) -> Result<(), ChatError> {
    sqlx::query(
        r"UPDATE user_contact SET status = ?, updated_at = ?
          WHERE user_id = ? AND contact_id = ? AND deleted_at IS NULL",
    )
    .bind(status.code())
    .bind(Utc::now().naive_utc())
    .bind(user_id)
    .bind(contact_id)
    .execute(pool)
    .await?;

    if let Err(err) = cache.delete_exact(&keys::contact_user_list(user_id)).await {
        tracing::warn!(error = %err, "cache invalidation failed");
    }
    Ok(())
}

pub async fn soft_delete_contact(
    pool: &MySqlPool,
    cache: &Cache,
    user_id: &str,
    contact_id: &str,
) -> Result<(), ChatError> {
    let now = Utc::now().naive_utc();
    sqlx::query(
        r"UPDATE user_contact SET deleted_at = ?, updated_at = ?
          WHERE user_id = ? AND contact_id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(user_id)
    .bind(contact_id)
    .execute(pool)
    .await?;

    if let Err(err) = cache.delete_exact(&keys::contact_user_list(user_id)).await {
        tracing::warn!(error = %err, "cache invalidation failed");
    }
    Ok(())
}

/// Files (or re-files) a contact apply. A prior rejection resets to Pending;
/// a prior block is final and surfaces as a user-visible failure.
pub async fn upsert_apply(
    pool: &MySqlPool,
    user_id: &str,
    contact_id: &str,
    contact_type: ContactKind,
    message: &str,
) -> Result<ApplyRecord, ChatError> {
    let now = Utc::now().naive_utc();
    let existing = get_apply(pool, user_id, contact_id).await?;

    match existing {
        None => {
            let record = ApplyRecord {
                uuid: ids::apply_id(),
                user_id: user_id.to_owned(),
                contact_id: contact_id.to_owned(),
                contact_type,
                status: ApplyStatus::Pending,
                message: message.to_owned(),
                last_applied_at: now,
            };
            sqlx::query(
                r"INSERT INTO contact_apply
                      (uuid, user_id, contact_id, contact_type, status, message,
                       last_applied_at, created_at, updated_at)
                  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.uuid)
            .bind(&record.user_id)
            .bind(&record.contact_id)
            .bind(record.contact_type.code())
            .bind(record.status.code())
            .bind(&record.message)
            .bind(record.last_applied_at)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
            Ok(record)
        }
        Some(prev) if prev.status == ApplyStatus::Blocked => Err(ChatError::user_visible(
            "this contact no longer accepts applications from you",
        )),
        Some(prev) => {
            sqlx::query(
                r"UPDATE contact_apply
                  SET status = ?, message = ?, last_applied_at = ?, updated_at = ?
                  WHERE uuid = ?",
            )
            .bind(ApplyStatus::Pending.code())
            .bind(message)
            .bind(now)
            .bind(now)
            .bind(&prev.uuid)
            .execute(pool)
            .await?;
            Ok(ApplyRecord {
                status: ApplyStatus::Pending,
                message: message.to_owned(),
                last_applied_at: now,
                ..prev
            })
        }
    }
}

pub async fn get_apply(
    pool: &MySqlPool,
    user_id: &str,
    contact_id: &str,
) -> Result<Option<ApplyRecord>, ChatError> {
    let row = sqlx::query(
        r"SELECT uuid, user_id, contact_id, contact_type, status, message, last_applied_at
          FROM contact_apply
          WHERE user_id = ? AND contact_id = ? AND deleted_at IS NULL",
    )
    .bind(user_id)
    .bind(contact_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(apply_from_row).transpose()
}

pub async fn set_apply_status(
    pool: &MySqlPool,
    apply_id: &str,
    status: ApplyStatus,
) -> Result<(), ChatError> {
    sqlx::query("UPDATE contact_apply SET status = ?, updated_at = ? WHERE uuid = ?")
        .bind(status.code())
        .bind(Utc::now().naive_utc())
        .bind(apply_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn contact_from_row(row: &MySqlRow) -> Result<ContactRecord, ChatError> {
    let type_code: i8 = row.try_get("contact_type")?;
    let status_code: i8 = row.try_get("status")?;
    Ok(ContactRecord {
        user_id: row.try_get("user_id")?,
        contact_id: row.try_get("contact_id")?,
        contact_type: decode("contact type", type_code, ContactKind::from_code(type_code))?,
        status: decode("contact", status_code, ContactStatus::from_code(status_code))?,
    })
}

fn apply_from_row(row: &MySqlRow) -> Result<ApplyRecord, ChatError> {
    let type_code: i8 = row.try_get("contact_type")?;
    let status_code: i8 = row.try_get("status")?;
    Ok(ApplyRecord {
        uuid: row.try_get("uuid")?,
        user_id: row.try_get("user_id")?,
        contact_id: row.try_get("contact_id")?,
        contact_type: decode("contact type", type_code, ContactKind::from_code(type_code))?,
        status: decode("apply", status_code, ApplyStatus::from_code(status_code))?,
        message: row.try_get("message")?,
        last_applied_at: row.try_get("last_applied_at")?,
    })
}
