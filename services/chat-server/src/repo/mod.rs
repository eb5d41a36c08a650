//! Persistence gateway: typed operations over the relational store. All row
//! structs and per-entity status enums live here; the submodules hold the
//! queries.
//!
//! Statuses are distinct types per entity on purpose — the numeric codes of
//! different entities share no meaning and must never meet in one filter.

pub mod contacts;
pub mod groups;
pub mod messages;
pub mod sessions;
pub mod users;

use chat_protocol::{GroupMessageItem, MessageItem, MessageType, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Normal,
    Disabled,
}

impl UserStatus {
    pub fn code(self) -> i8 {
        match self {
            UserStatus::Normal => 0,
            UserStatus::Disabled => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<UserStatus> {
        match code {
            0 => Some(UserStatus::Normal),
            1 => Some(UserStatus::Disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Normal,
    Disabled,
    Dissolved,
}

impl GroupStatus {
    pub fn code(self) -> i8 {
        match self {
            GroupStatus::Normal => 0,
            GroupStatus::Disabled => 1,
            GroupStatus::Dissolved => 2,
        }
    }

    pub fn from_code(code: i8) -> Option<GroupStatus> {
        match code {
            0 => Some(GroupStatus::Normal),
            1 => Some(GroupStatus::Disabled),
            2 => Some(GroupStatus::Dissolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupAddMode {
    Direct,
    ByApproval,
}

impl GroupAddMode {
    pub fn code(self) -> i8 {
        match self {
            GroupAddMode::Direct => 0,
            GroupAddMode::ByApproval => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<GroupAddMode> {
        match code {
            0 => Some(GroupAddMode::Direct),
            1 => Some(GroupAddMode::ByApproval),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    User,
    Group,
}

impl ContactKind {
    pub fn code(self) -> i8 {
        match self {
            ContactKind::User => 0,
            ContactKind::Group => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<ContactKind> {
        match code {
            0 => Some(ContactKind::User),
            1 => Some(ContactKind::Group),
            _ => None,
        }
    }
}

/// Directed contact-edge status, one row per direction for user pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    Normal,
    BlockedByPeer,
    BlockingPeer,
    DeletedByPeer,
    Deleted,
    Silenced,
    LeftGroup,
    KickedFromGroup,
}

impl ContactStatus {
    pub fn code(self) -> i8 {
        match self {
            ContactStatus::Normal => 0,
            ContactStatus::BlockedByPeer => 1,
            ContactStatus::BlockingPeer => 2,
            ContactStatus::DeletedByPeer => 3,
            ContactStatus::Deleted => 4,
            ContactStatus::Silenced => 5,
            ContactStatus::LeftGroup => 6,
            ContactStatus::KickedFromGroup => 7,
        }
    }

    pub fn from_code(code: i8) -> Option<ContactStatus> {
        match code {
            0 => Some(ContactStatus::Normal),
            1 => Some(ContactStatus::BlockedByPeer),
            2 => Some(ContactStatus::BlockingPeer),
            3 => Some(ContactStatus::DeletedByPeer),
            4 => Some(ContactStatus::Deleted),
            5 => Some(ContactStatus::Silenced),
            6 => Some(ContactStatus::LeftGroup),
            7 => Some(ContactStatus::KickedFromGroup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl ApplyStatus {
    pub fn code(self) -> i8 {
        match self {
            ApplyStatus::Pending => 0,
            ApplyStatus::Accepted => 1,
            ApplyStatus::Rejected => 2,
            ApplyStatus::Blocked => 3,
        }
    }

    pub fn from_code(code: i8) -> Option<ApplyStatus> {
        match code {
            0 => Some(ApplyStatus::Pending),
            1 => Some(ApplyStatus::Accepted),
            2 => Some(ApplyStatus::Rejected),
            3 => Some(ApplyStatus::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Unsent,
    Sent,
}

impl MessageStatus {
    pub fn code(self) -> i8 {
        match self {
            MessageStatus::Unsent => 0,
            MessageStatus::Sent => 1,
        }
    }

    pub fn from_code(code: i8) -> Option<MessageStatus> {
        match code {
            0 => Some(MessageStatus::Unsent),
            1 => Some(MessageStatus::Sent),
            _ => None,
        }
    }
}

pub(crate) fn decode<T>(entity: &str, code: i8, value: Option<T>) -> Result<T, ChatError> {
    value.ok_or_else(|| ChatError::Corrupt(format!("{entity} status code {code} out of range")))
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub uuid: String,
    pub nickname: String,
    pub telephone: String,
    pub avatar: String,
    pub status: UserStatus,
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub uuid: String,
    pub name: String,
    pub notice: String,
    pub owner_id: String,
    pub add_mode: GroupAddMode,
    pub member_ids: Vec<String>,
    pub member_count: i64,
    pub avatar: String,
    pub status: GroupStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub uuid: String,
    pub send_id: String,
    pub receive_id: String,
    pub receive_name: String,
    pub avatar: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub user_id: String,
    pub contact_id: String,
    pub contact_type: ContactKind,
    pub status: ContactStatus,
}

#[derive(Debug, Clone)]
pub struct ApplyRecord {
    pub uuid: String,
    pub user_id: String,
    pub contact_id: String,
    pub contact_type: ContactKind,
    pub status: ApplyStatus,
    pub message: String,
    pub last_applied_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub uuid: String,
    pub session_id: String,
    pub kind: MessageType,
    pub content: String,
    pub url: String,
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    pub file_size: String,
    pub file_type: String,
    pub file_name: String,
    pub status: MessageStatus,
    pub av_payload: String,
    pub created_at: NaiveDateTime,
}

impl MessageRecord {
    pub fn to_direct_item(&self) -> MessageItem {
        MessageItem {
            send_id: self.send_id.clone(),
            send_name: self.send_name.clone(),
            send_avatar: self.send_avatar.clone(),
            receive_id: self.receive_id.clone(),
            kind: self.kind,
            content: self.content.clone(),
            url: self.url.clone(),
            file_size: self.file_size.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            created_at: self.created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn to_group_item(&self) -> GroupMessageItem {
        GroupMessageItem {
            send_id: self.send_id.clone(),
            send_name: self.send_name.clone(),
            send_avatar: self.send_avatar.clone(),
            receive_id: self.receive_id.clone(),
            kind: self.kind,
            content: self.content.clone(),
            url: self.url.clone(),
            file_size: self.file_size.clone(),
            file_name: self.file_name.clone(),
            file_type: self.file_type.clone(),
            created_at: self.created_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_survive_the_round_trip() {
        assert_eq!(ContactStatus::from_code(ContactStatus::LeftGroup.code()), Some(ContactStatus::LeftGroup));
        assert_eq!(ApplyStatus::from_code(ApplyStatus::Blocked.code()), Some(ApplyStatus::Blocked));
        assert_eq!(GroupStatus::from_code(GroupStatus::Dissolved.code()), Some(GroupStatus::Dissolved));
        assert_eq!(MessageStatus::from_code(MessageStatus::Sent.code()), Some(MessageStatus::Sent));
        assert!(ContactStatus::from_code(8).is_none());
        assert!(UserStatus::from_code(2).is_none());
    }

    #[test]
    fn message_record_formats_created_at_for_the_wire() {
        let record = MessageRecord {
            uuid: "M123".into(),
            session_id: "S123".into(),
            kind: MessageType::Text,
            content: "hi".into(),
            url: String::new(),
            send_id: "U001".into(),
            send_name: "alice".into(),
            send_avatar: "/static/avatars/a.png".into(),
            receive_id: "U002".into(),
            file_size: "0B".into(),
            file_type: String::new(),
            file_name: String::new(),
            status: MessageStatus::Unsent,
            av_payload: String::new(),
            created_at: chrono::NaiveDate::from_ymd_opt(2026, 3, 15)
                .unwrap()
                .and_hms_opt(12, 30, 0)
                .unwrap(),
        };

        let item = record.to_direct_item();
        assert_eq!(item.created_at, "2026-03-15 12:30:00");
        assert_eq!(item.send_id, "U001");
    }
}
