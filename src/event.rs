//! Typed requests and events flowing through the engine.
//!
//! [`Request`] is what the command façade asks the server to do;
//! [`RoomEvent`] is what the server (or, for [`RoomEvent::Disconnected`], the
//! connection manager itself) reports back. The [`codec`](crate::codec)
//! translates both to and from the wire.

use crate::model::{GameResult, Player, PlayerId, Role, RoomId, Stage, TurnPointer};

/// Outbound requests, in the engine's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Join {
        room_id: RoomId,
        player_name: String,
    },
    SetWords {
        player_id: PlayerId,
        words: Vec<String>,
    },
    StartGame {
        player_id: PlayerId,
    },
    Describe {
        player_id: PlayerId,
        message: String,
    },
    Vote {
        voter_id: PlayerId,
        target_id: PlayerId,
    },
}

/// Inbound domain events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// The server reported an error.
    Error { message: String },

    /// Someone (possibly us) joined. Carries the full authoritative roster.
    Joined {
        joiner: Player,
        room_id: RoomId,
        stage: Stage,
        players: Vec<Player>,
        master_id: Option<PlayerId>,
    },

    /// A player left the room.
    PlayerLeft {
        player_id: PlayerId,
        player_name: Option<String>,
    },

    /// The room word list was replaced.
    WordsSet { words: Vec<String> },

    /// The game started; carries *our* role and word.
    Started {
        role: Role,
        word: Option<String>,
        players: Option<Vec<Player>>,
    },

    /// A chat line / word description.
    Described {
        speaker_id: PlayerId,
        speaker_name: Option<String>,
        message: String,
    },

    /// A vote was cast.
    VoteCast {
        voter_id: PlayerId,
        voter_name: Option<String>,
        target_id: PlayerId,
        target_name: Option<String>,
    },

    /// Phase/turn heartbeat.
    StageChanged { stage: Stage, turn: TurnPointer },

    /// A player was voted out.
    Eliminated {
        player_id: PlayerId,
        player_name: Option<String>,
        word: Option<String>,
    },

    /// The game ended.
    Finished(GameResult),

    /// Synthetic: the connection dropped. Never decoded from the wire.
    Disconnected {
        reason: Option<String>,
        /// `true` while the reconnect policy still has attempts left.
        will_retry: bool,
    },
}

impl RoomEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::Joined { .. } => "joined",
            Self::PlayerLeft { .. } => "player_left",
            Self::WordsSet { .. } => "words_set",
            Self::Started { .. } => "started",
            Self::Described { .. } => "describe",
            Self::VoteCast { .. } => "vote",
            Self::StageChanged { .. } => "state",
            Self::Eliminated { .. } => "eliminate",
            Self::Finished(_) => "result",
            Self::Disconnected { .. } => "disconnected",
        }
    }
}
