//! Wire-compatible protocol types for the Undercover room stream.
//!
//! Every outbound frame is `{"request_type": .., "data": {..}}` and every
//! inbound frame is `{"response_type": .., "data": {..} | null, "error_message": ..}`.
//! Field names here follow the server's JSON exactly; the rest of the crate
//! works with the types in [`model`](crate::model) and [`event`](crate::event).
//!
//! Roles and stages stay plain strings at this layer. The
//! [`codec`](crate::codec) decides what an unfamiliar value means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Room creation (HTTP) ────────────────────────────────────────────

/// Body of the HTTP request that mints a new room id.
///
/// Creating a room does not add anyone to it; membership only comes from the
/// `JoinGame` handshake on the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRoomRequest {
    pub room_name: String,
}

/// Response to [`CreateRoomRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

// ── Shared structs ──────────────────────────────────────────────────

/// A player as the server describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
}

// ── Client → server ─────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "request_type", content = "data")]
pub enum ClientMessage {
    /// Enter a room. The only way a participant becomes a member.
    JoinGame { room_id: String, joiner_name: String },
    /// Replace the room's word list (admin, while waiting).
    SetWords {
        set_player_id: String,
        word_list: Vec<String>,
    },
    /// Start the game (admin).
    StartGame { start_player_id: String },
    /// Describe one's word / chat.
    Describe {
        req_player_id: String,
        message: String,
    },
    /// Cast a vote against `target_id`.
    Vote { voter_id: String, target_id: String },
}

impl ClientMessage {
    /// The wire discriminator of this message.
    pub fn request_type(&self) -> &'static str {
        match self {
            Self::JoinGame { .. } => "JoinGame",
            Self::SetWords { .. } => "SetWords",
            Self::StartGame { .. } => "StartGame",
            Self::Describe { .. } => "Describe",
            Self::Vote { .. } => "Vote",
        }
    }
}

// ── Server → client ─────────────────────────────────────────────────

/// Untyped inbound envelope, exactly as it arrives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerFrame {
    pub response_type: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Payload of an inbound `JoinGame` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinGamePayload {
    pub joiner: PlayerInfo,
    pub room_id: String,
    pub stage: String,
    #[serde(default)]
    pub players: Vec<PlayerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_id: Option<String>,
}

/// Payload of an inbound `ExitGame` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExitGamePayload {
    pub left_player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_player_name: Option<String>,
}

/// Payload of an inbound `SetWords` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetWordsPayload {
    pub word_list: Vec<String>,
}

/// Payload of an inbound `StartGame` frame. Sent to each player separately,
/// carrying that player's own role and word.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StartGamePayload {
    pub assigned_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_word: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<PlayerInfo>>,
}

/// Payload of an inbound `Describe` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DescribePayload {
    pub speaker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    pub message: String,
}

/// Payload of an inbound `Vote` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VotePayload {
    pub voter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voter_name: Option<String>,
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

/// Payload of an inbound `GameState` heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStatePayload {
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
}

/// Payload of an inbound `Eliminate` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EliminatePayload {
    pub eliminated_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated_word: Option<String>,
}

/// Payload of the terminal `GameResult` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResultPayload {
    pub winner: String,
    pub answer_word: String,
    pub spy_word: String,
    #[serde(default)]
    pub player_roles: BTreeMap<String, String>,
    #[serde(default)]
    pub player_words: BTreeMap<String, String>,
}

/// Typed inbound messages, one variant per discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Error { message: String },
    JoinGame(Box<JoinGamePayload>),
    ExitGame(ExitGamePayload),
    SetWords(SetWordsPayload),
    StartGame(StartGamePayload),
    Describe(DescribePayload),
    Vote(VotePayload),
    GameState(GameStatePayload),
    Eliminate(EliminatePayload),
    GameResult(GameResultPayload),
}

impl ServerMessage {
    /// The wire discriminator of this message.
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::Error { .. } => "Error",
            Self::JoinGame(_) => "JoinGame",
            Self::ExitGame(_) => "ExitGame",
            Self::SetWords(_) => "SetWords",
            Self::StartGame(_) => "StartGame",
            Self::Describe(_) => "Describe",
            Self::Vote(_) => "Vote",
            Self::GameState(_) => "GameState",
            Self::Eliminate(_) => "Eliminate",
            Self::GameResult(_) => "GameResult",
        }
    }

    /// Wrap this message in the untyped envelope the server puts on the wire.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a payload cannot be turned into JSON.
    pub fn into_frame(self) -> Result<ServerFrame, serde_json::Error> {
        let response_type = self.response_type().to_string();
        let (data, error_message) = match self {
            Self::Error { message } => (None, Some(message)),
            Self::JoinGame(p) => (Some(serde_json::to_value(*p)?), None),
            Self::ExitGame(p) => (Some(serde_json::to_value(p)?), None),
            Self::SetWords(p) => (Some(serde_json::to_value(p)?), None),
            Self::StartGame(p) => (Some(serde_json::to_value(p)?), None),
            Self::Describe(p) => (Some(serde_json::to_value(p)?), None),
            Self::Vote(p) => (Some(serde_json::to_value(p)?), None),
            Self::GameState(p) => (Some(serde_json::to_value(p)?), None),
            Self::Eliminate(p) => (Some(serde_json::to_value(p)?), None),
            Self::GameResult(p) => (Some(serde_json::to_value(p)?), None),
        };
        Ok(ServerFrame {
            response_type,
            data,
            error_message,
        })
    }

    /// Serialize this message as one JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a payload cannot be turned into JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.clone().into_frame()?)
    }
}
