use chat_protocol::MessageType;
use chrono::Utc;
use sqlx::Row;
use sqlx::mysql::{MySqlPool, MySqlRow};

use crate::error::ChatError;
use crate::repo::{MessageRecord, MessageStatus, decode};

pub async fn insert_message(pool: &MySqlPool, message: &MessageRecord) -> Result<(), ChatError> {
    sqlx::query(
        r"INSERT INTO message
              (uuid, session_id, type, content, url, send_id, send_name, send_avatar,
               receive_id, file_size, file_type, file_name, status, av_payload,
               created_at, updated_at)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&message.uuid)
    .bind(&message.session_id)
    .bind(u8::from(message.kind) as i8)
    .bind(&message.content)
    .bind(&message.url)
    .bind(&message.send_id)
    .bind(&message.send_name)
    .bind(&message.send_avatar)
    .bind(&message.receive_id)
    .bind(&message.file_size)
    .bind(&message.file_type)
    .bind(&message.file_name)
    .bind(message.status.code())
    .bind(&message.av_payload)
    .bind(message.created_at)
    .bind(message.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Called by a client's writer task once the socket accepted the frame.
pub async fn mark_message_sent(pool: &MySqlPool, message_id: &str) -> Result<(), ChatError> {
    sqlx::query("UPDATE message SET status = ?, updated_at = ? WHERE uuid = ?")
        .bind(MessageStatus::Sent.code())
        .bind(Utc::now().naive_utc())
        .bind(message_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn load_message(
    pool: &MySqlPool,
    message_id: &str,
) -> Result<Option<MessageRecord>, ChatError> {
    let row = sqlx::query("SELECT * FROM message WHERE uuid = ? AND deleted_at IS NULL")
        .bind(message_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

pub async fn load_direct_history(
    pool: &MySqlPool,
    user_one: &str,
    user_two: &str,
) -> Result<Vec<MessageRecord>, ChatError> {
    let rows = sqlx::query(
        r"SELECT * FROM message
          WHERE ((send_id = ? AND receive_id = ?) OR (send_id = ? AND receive_id = ?))
            AND deleted_at IS NULL
          ORDER BY created_at ASC",
    )
    .bind(user_one)
    .bind(user_two)
    .bind(user_two)
    .bind(user_one)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

pub async fn load_group_history(
    pool: &MySqlPool,
    group_id: &str,
) -> Result<Vec<MessageRecord>, ChatError> {
    let rows = sqlx::query(
        r"SELECT * FROM message
          WHERE receive_id = ? AND deleted_at IS NULL
          ORDER BY created_at ASC",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(record_from_row).collect()
}

fn record_from_row(row: &MySqlRow) -> Result<MessageRecord, ChatError> {
    let kind_code: i8 = row.try_get("type")?;
    let status_code: i8 = row.try_get("status")?;
    Ok(MessageRecord {
        uuid: row.try_get("uuid")?,
        session_id: row.try_get("session_id")?,
        kind: decode(
            "message type",
            kind_code,
            MessageType::try_from(kind_code as u8).ok(),
        )?,
        content: row.try_get("content")?,
        url: row.try_get("url")?,
        send_id: row.try_get("send_id")?,
        send_name: row.try_get("send_name")?,
        send_avatar: row.try_get("send_avatar")?,
        receive_id: row.try_get("receive_id")?,
        file_size: row.try_get("file_size")?,
        file_type: row.try_get("file_type")?,
        file_name: row.try_get("file_name")?,
        status: decode("message", status_code, MessageStatus::from_code(status_code))?,
        av_payload: row.try_get("av_payload")?,
        created_at: row.try_get("created_at")?,
    })
}
