// chat-protocol: socket envelope and egress shapes for the chat server.
//
// Ingress frames (client -> server) all use the `ChatMessageRequest` envelope.
// Egress frames (server -> client) use one of three shapes depending on the
// routing decision: direct, group, or audio/video signaling.

use serde::{Deserialize, Serialize};

/// Wire format for `created_at` on every egress shape.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ---------------------------------------------------------------------------
// Message type discriminant
// ---------------------------------------------------------------------------

/// Numeric message-type discriminant carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MessageType {
    Text,
    Voice,
    File,
    AudioVideo,
}

impl TryFrom<u8> for MessageType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Text),
            1 => Ok(MessageType::Voice),
            2 => Ok(MessageType::File),
            3 => Ok(MessageType::AudioVideo),
            other => Err(format!("unknown message type {other}")),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Text => 0,
            MessageType::Voice => 1,
            MessageType::File => 2,
            MessageType::AudioVideo => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient routing
// ---------------------------------------------------------------------------

/// Routing discriminator taken from the first byte of a recipient id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientKind {
    User,
    Group,
}

impl RecipientKind {
    /// Classifies a recipient id, or `None` for ids with an unknown tag.
    pub fn of(id: &str) -> Option<RecipientKind> {
        match id.as_bytes().first() {
            Some(b'U') => Some(RecipientKind::User),
            Some(b'G') => Some(RecipientKind::Group),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ingress envelope
// ---------------------------------------------------------------------------

/// One chat event as submitted by a connected client.
///
/// Fields that do not apply to the message type are sent empty; the server
/// decides what to persist and what to relay from `type` alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessageRequest {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub send_id: String,
    #[serde(default)]
    pub send_name: String,
    #[serde(default)]
    pub send_avatar: String,
    #[serde(default)]
    pub receive_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub file_size: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_name: String,
    /// Opaque AV signaling blob; only `AvControl` fields are interpreted.
    #[serde(default)]
    pub av_payload: String,
}

// ---------------------------------------------------------------------------
// Egress shapes
// ---------------------------------------------------------------------------

/// Direct-chat egress payload, also the element type of cached direct
/// history lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageItem {
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub url: String,
    pub file_size: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: String,
}

/// Group-chat egress payload and cached group history element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessageItem {
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub url: String,
    pub file_size: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: String,
}

/// Audio/video signaling egress payload; `av_payload` is relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvMessage {
    pub send_id: String,
    pub send_name: String,
    pub send_avatar: String,
    pub receive_id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub url: String,
    pub file_size: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: String,
    pub av_payload: String,
}

// ---------------------------------------------------------------------------
// AV signaling control fields
// ---------------------------------------------------------------------------

/// The recognized control fields inside an `av_payload` blob.
///
/// Everything else in the blob is client-to-client and passes through
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvControl {
    #[serde(default)]
    pub message_id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

impl AvControl {
    /// Proxied call-control frames are the only AV frames the server persists.
    const PERSISTED_KINDS: [&'static str; 3] = ["start_call", "receive_call", "reject_call"];

    pub fn parse(av_payload: &str) -> Option<AvControl> {
        serde_json::from_str(av_payload).ok()
    }

    /// True when this signaling frame must be recorded before relay.
    pub fn is_persisted_signal(&self) -> bool {
        self.message_id == "PROXY" && Self::PERSISTED_KINDS.contains(&self.kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_maps_to_wire_discriminants() {
        for (kind, wire) in [
            (MessageType::Text, 0),
            (MessageType::Voice, 1),
            (MessageType::File, 2),
            (MessageType::AudioVideo, 3),
        ] {
            assert_eq!(u8::from(kind), wire);
            assert_eq!(MessageType::try_from(wire).unwrap(), kind);
        }
        assert!(MessageType::try_from(9).is_err());
    }

    #[test]
    fn recipient_kind_uses_the_first_byte() {
        assert_eq!(RecipientKind::of("U123"), Some(RecipientKind::User));
        assert_eq!(RecipientKind::of("G123"), Some(RecipientKind::Group));
        assert_eq!(RecipientKind::of("X123"), None);
        assert_eq!(RecipientKind::of(""), None);
    }

    #[test]
    fn av_control_recognizes_proxied_call_signals() {
        let control = AvControl::parse(r#"{"message_id":"PROXY","type":"start_call"}"#).unwrap();
        assert!(control.is_persisted_signal());

        let relay_only = AvControl::parse(r#"{"message_id":"PROXY","type":"ice_candidate"}"#)
            .unwrap();
        assert!(!relay_only.is_persisted_signal());

        let no_proxy = AvControl::parse(r#"{"message_id":"M123","type":"start_call"}"#).unwrap();
        assert!(!no_proxy.is_persisted_signal());
    }
}
