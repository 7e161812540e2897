//! Envelope type tags and the routing header every envelope carries.
//!
//! Envelopes are JSON objects. The relay only reads the handful of fields it
//! routes on; everything else (including `payload`) is opaque and is
//! forwarded as the inbound text.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// Envelope type tags understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    Auth,
    Ping,
    Pong,

    Register,
    Relay,

    JoinFileRoom,
    LeaveFileRoom,
    JoinGroupRoom,
    LeaveGroupRoom,

    AnnounceChunk,

    GroupMessage,
    FileMetadata,
    FileChunk,
    FileComment,
    FileTag,

    Message,
    Typing,
    DownloadRequest,
    GroupInvite,
    FriendRequest,
    FriendAccept,
    FriendReject,
}

impl MsgType {
    /// Every known tag, in declaration order.
    pub const ALL: [MsgType; 22] = [
        MsgType::Auth,
        MsgType::Ping,
        MsgType::Pong,
        MsgType::Register,
        MsgType::Relay,
        MsgType::JoinFileRoom,
        MsgType::LeaveFileRoom,
        MsgType::JoinGroupRoom,
        MsgType::LeaveGroupRoom,
        MsgType::AnnounceChunk,
        MsgType::GroupMessage,
        MsgType::FileMetadata,
        MsgType::FileChunk,
        MsgType::FileComment,
        MsgType::FileTag,
        MsgType::Message,
        MsgType::Typing,
        MsgType::DownloadRequest,
        MsgType::GroupInvite,
        MsgType::FriendRequest,
        MsgType::FriendAccept,
        MsgType::FriendReject,
    ];

    /// The wire tag for this type.
    pub fn as_str(self) -> &'static str {
        match self {
            MsgType::Auth => "auth",
            MsgType::Ping => "ping",
            MsgType::Pong => "pong",
            MsgType::Register => "register",
            MsgType::Relay => "relay",
            MsgType::JoinFileRoom => "join_file_room",
            MsgType::LeaveFileRoom => "leave_file_room",
            MsgType::JoinGroupRoom => "join_group_room",
            MsgType::LeaveGroupRoom => "leave_group_room",
            MsgType::AnnounceChunk => "announce_chunk",
            MsgType::GroupMessage => "group_message",
            MsgType::FileMetadata => "file_metadata",
            MsgType::FileChunk => "file_chunk",
            MsgType::FileComment => "file_comment",
            MsgType::FileTag => "file_tag",
            MsgType::Message => "message",
            MsgType::Typing => "typing",
            MsgType::DownloadRequest => "download_request",
            MsgType::GroupInvite => "group_invite",
            MsgType::FriendRequest => "friend_request",
            MsgType::FriendAccept => "friend_accept",
            MsgType::FriendReject => "friend_reject",
        }
    }

    /// Look up a wire tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == tag)
    }
}

impl std::fmt::Display for MsgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The routing-relevant fields of an inbound envelope.
///
/// Unknown fields are ignored. Correlating ids accept strings or numbers;
/// empty strings count as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    /// Raw type tag, kept as a string so unknown types can still be logged.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_id")]
    pub to: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub group_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub file_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub username: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub peer_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub target_peer_id: Option<String>,
    /// Opaque payload, preserved byte for byte.
    #[serde(default)]
    pub payload: Option<Box<RawValue>>,
}

impl EnvelopeHeader {
    /// The parsed type tag, if it is one the relay knows.
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_tag(&self.kind)
    }
}

/// Envelope the signaling variant forwards for `relay`.
///
/// The sender id is injected from the relaying connection; it is `null`
/// when the sender never registered.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayForward<'a> {
    #[serde(rename = "type")]
    pub kind: MsgType,
    pub sender_peer_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<&'a RawValue>,
}

/// Reply to a `ping`.
#[derive(Debug, Serialize)]
pub struct Pong {
    #[serde(rename = "type")]
    pub kind: MsgType,
}

impl Default for Pong {
    fn default() -> Self {
        Self {
            kind: MsgType::Pong,
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
