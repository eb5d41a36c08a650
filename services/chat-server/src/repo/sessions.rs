use chat_protocol::RecipientKind;
use chrono::Utc;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::cache::{Cache, keys};
use crate::error::ChatError;
use crate::ids;
use crate::repo::{
    ContactStatus, GroupStatus, SessionRecord, UserStatus, contacts, decode, groups,
};

/// Display snapshot of the session peer, denormalized onto the session row.
struct PeerSnapshot {
    name: String,
    avatar: String,
}

pub async fn create_session(
    pool: &MySqlPool,
    cache: &Cache,
    send_id: &str,
    receive_id: &str,
) -> Result<SessionRecord, ChatError> {
    let peer = peer_snapshot(pool, receive_id).await?;
    let record = insert_session(pool, send_id, receive_id, &peer).await?;
    invalidate_session_lists(cache, send_id).await;
    Ok(record)
}

/// Policy gate evaluated before a session may be opened.
pub async fn check_open_session_allowed(
    pool: &MySqlPool,
    send_id: &str,
    receive_id: &str,
) -> Result<(), ChatError> {
    let contact = contacts::get_contact(pool, send_id, receive_id)
        .await?
        .ok_or_else(|| ChatError::user_visible("add the contact before opening a session"))?;
    match contact.status {
        ContactStatus::BlockedByPeer => {
            return Err(ChatError::user_visible(
                "you have been blocked by this contact",
            ));
        }
        ContactStatus::BlockingPeer => {
            return Err(ChatError::user_visible(
                "unblock this contact before opening a session",
            ));
        }
        _ => {}
    }
    peer_snapshot(pool, receive_id).await.map(|_| ())
}

/// Idempotent open: the same (sender, recipient) pair resolves to the same
/// session id. The cache answers repeats; the store path re-checks for a live
/// row inside one transaction so concurrent opens cannot double-insert.
pub async fn open_session(
    pool: &MySqlPool,
    cache: &Cache,
    send_id: &str,
    receive_id: &str,
) -> Result<String, ChatError> {
    let prefix = keys::open_session_prefix(send_id, receive_id);
    match cache.single_key_with_prefix(&prefix).await {
        Ok(Some(key)) => {
            if let Some(session_id) = key.rsplit('_').next() {
                return Ok(session_id.to_owned());
            }
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "open-session cache lookup failed"),
    }

    let peer = peer_snapshot(pool, receive_id).await?;

    let mut tx = pool.begin().await?;
    let existing = sqlx::query(
        r"SELECT uuid FROM session
          WHERE send_id = ? AND receive_id = ? AND deleted_at IS NULL
          ORDER BY created_at ASC LIMIT 1 FOR UPDATE",
    )
    .bind(send_id)
    .bind(receive_id)
    .fetch_optional(&mut *tx)
    .await?;

    let session_id = match existing {
        Some(row) => {
            let uuid: String = row.try_get("uuid")?;
            tx.commit().await?;
            uuid
        }
        None => {
            let now = Utc::now().naive_utc();
            let uuid = ids::session_id();
            sqlx::query(
                r"INSERT INTO session
                      (uuid, send_id, receive_id, receive_name, avatar, created_at, updated_at)
                  VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&uuid)
            .bind(send_id)
            .bind(receive_id)
            .bind(&peer.name)
            .bind(&peer.avatar)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            invalidate_session_lists(cache, send_id).await;
            uuid
        }
    };

    let key = keys::open_session(send_id, receive_id, &session_id);
    if let Err(err) = cache.set_with_ttl(&key, &session_id).await {
        tracing::warn!(error = %err, "open-session cache write failed");
    }
    Ok(session_id)
}

pub async fn soft_delete_session(
    pool: &MySqlPool,
    cache: &Cache,
    owner_id: &str,
    session_id: &str,
) -> Result<(), ChatError> {
    let now = Utc::now().naive_utc();
    sqlx::query("UPDATE session SET deleted_at = ?, updated_at = ? WHERE uuid = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(now)
        .bind(session_id)
        .execute(pool)
        .await?;

    invalidate_session_lists(cache, owner_id).await;
    if let Err(err) = cache.delete_suffix(&format!("_{session_id}")).await {
        tracing::warn!(error = %err, "open-session cache invalidation failed");
    }
    Ok(())
}

pub async fn list_user_sessions(
    pool: &MySqlPool,
    owner_id: &str,
) -> Result<Vec<SessionRecord>, ChatError> {
    list_sessions(pool, owner_id, "U%").await
}

pub async fn list_group_sessions(
    pool: &MySqlPool,
    owner_id: &str,
) -> Result<Vec<SessionRecord>, ChatError> {
    list_sessions(pool, owner_id, "G%").await
}

async fn list_sessions(
    pool: &MySqlPool,
    owner_id: &str,
    receive_prefix: &str,
) -> Result<Vec<SessionRecord>, ChatError> {
    let rows = sqlx::query(
        r"SELECT * FROM session
          WHERE send_id = ? AND receive_id LIKE ? AND deleted_at IS NULL
          ORDER BY created_at ASC",
    )
    .bind(owner_id)
    .bind(receive_prefix)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

async fn peer_snapshot(pool: &MySqlPool, receive_id: &str) -> Result<PeerSnapshot, ChatError> {
    match RecipientKind::of(receive_id) {
        Some(RecipientKind::User) => {
            let row = sqlx::query(
                "SELECT nickname, avatar, status FROM user_info WHERE uuid = ? AND deleted_at IS NULL",
            )
            .bind(receive_id)
            .fetch_optional(pool)
            .await?;
            let Some(row) = row else {
                return Err(ChatError::user_visible("the user does not exist"));
            };
            let status_code: i8 = row.try_get("status")?;
            let status = decode("user", status_code, UserStatus::from_code(status_code))?;
            if status == UserStatus::Disabled {
                return Err(ChatError::user_visible("the user has been disabled"));
            }
            Ok(PeerSnapshot {
                name: row.try_get("nickname")?,
                avatar: row.try_get("avatar")?,
            })
        }
        Some(RecipientKind::Group) => {
            let group = groups::load_group(pool, receive_id)
                .await?
                .ok_or_else(|| ChatError::user_visible("the group does not exist"))?;
            match group.status {
                GroupStatus::Disabled => {
                    Err(ChatError::user_visible("the group has been disabled"))
                }
                GroupStatus::Dissolved => {
                    Err(ChatError::user_visible("the group has been dissolved"))
                }
                GroupStatus::Normal => Ok(PeerSnapshot {
                    name: group.name,
                    avatar: group.avatar,
                }),
            }
        }
        None => Err(ChatError::user_visible("unrecognized recipient id")),
    }
}

async fn insert_session(
    pool: &MySqlPool,
    send_id: &str,
    receive_id: &str,
    peer: &PeerSnapshot,
) -> Result<SessionRecord, ChatError> {
    let now = Utc::now().naive_utc();
    let record = SessionRecord {
        uuid: ids::session_id(),
        send_id: send_id.to_owned(),
        receive_id: receive_id.to_owned(),
        receive_name: peer.name.clone(),
        avatar: peer.avatar.clone(),
        created_at: now,
    };
    sqlx::query(
        r"INSERT INTO session
              (uuid, send_id, receive_id, receive_name, avatar, created_at, updated_at)
          VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.uuid)
    .bind(&record.send_id)
    .bind(&record.receive_id)
    .bind(&record.receive_name)
    .bind(&record.avatar)
    .bind(record.created_at)
    .bind(record.created_at)
    .execute(pool)
    .await?;
    Ok(record)
}

async fn invalidate_session_lists(cache: &Cache, owner_id: &str) {
    for key in [
        keys::session_list(owner_id),
        keys::group_session_list(owner_id),
    ] {
        if let Err(err) = cache.delete_exact(&key).await {
            tracing::warn!(key, error = %err, "cache invalidation failed");
        }
    }
}

fn record_from_row(row: &MySqlRow) -> Result<SessionRecord, ChatError> {
    Ok(SessionRecord {
        uuid: row.try_get("uuid")?,
        send_id: row.try_get("send_id")?,
        receive_id: row.try_get("receive_id")?,
        receive_name: row.try_get("receive_name")?,
        avatar: row.try_get("avatar")?,
        created_at: row.try_get("created_at")?,
    })
}
