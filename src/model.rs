//! Domain types shared by the codec, the reducer and the client façade.
//!
//! These are the engine's own types; the wire shapes live in
//! [`protocol`](crate::protocol) and only the [`codec`](crate::codec) converts
//! between the two.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned player identifier, unique within a room.
pub type PlayerId = String;

/// Opaque room identifier.
pub type RoomId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// A participant's role in the game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    /// First participant of a room; may set the word list and start the game.
    Admin,
    /// Majority role holding the common word.
    Normal,
    /// Minority role holding a different word.
    Spy,
    /// Minority role holding no word at all.
    Blank,
    /// Eliminated or non-playing participant.
    Observer,
}

impl Role {
    /// Parse a wire role string.
    ///
    /// `"Civilian"` is accepted as [`Role::Normal`]. Unrecognized strings map to
    /// [`Role::Observer`]: a participant the client cannot classify cannot act.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "Admin" => Self::Admin,
            "Normal" | "Civilian" => Self::Normal,
            "Spy" => Self::Spy,
            "Blank" => Self::Blank,
            "Observer" => Self::Observer,
            other => {
                debug!(role = other, "unknown role on the wire, treating as observer");
                Self::Observer
            }
        }
    }

    /// Wire spelling of this role.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Normal => "Normal",
            Self::Spy => "Spy",
            Self::Blank => "Blank",
            Self::Observer => "Observer",
        }
    }

    /// Whether a participant with this role may still vote or take a turn.
    pub fn can_act(self) -> bool {
        !matches!(self, Self::Observer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Room lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Stage {
    #[default]
    Waiting,
    Preparing,
    Speaking,
    Voting,
    Judging,
    Finished,
}

impl Stage {
    /// Parse a wire stage string. The legacy `"AssigningRoles"` maps to
    /// [`Stage::Preparing`]; anything else unknown yields `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "Waiting" => Some(Self::Waiting),
            "Preparing" | "AssigningRoles" => Some(Self::Preparing),
            "Speaking" => Some(Self::Speaking),
            "Voting" => Some(Self::Voting),
            "Judging" => Some(Self::Judging),
            "Finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Wire spelling of this stage.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Preparing => "Preparing",
            Self::Speaking => "Speaking",
            Self::Voting => "Voting",
            Self::Judging => "Judging",
            Self::Finished => "Finished",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A participant in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Secret word; present only for roles that receive one, after the game started.
    pub word: Option<String>,
}

impl Player {
    /// Create a player without a word.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            word: None,
        }
    }

    /// Attach a secret word.
    #[must_use]
    pub fn with_word(mut self, word: impl Into<String>) -> Self {
        self.word = Some(word.into());
        self
    }
}

/// Whose turn it is, as announced by the last stage heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TurnPointer {
    pub player_id: Option<PlayerId>,
    pub player_name: Option<String>,
    pub round: Option<u32>,
}

impl TurnPointer {
    /// Returns `true` if the heartbeat named nobody and no round.
    pub fn is_empty(&self) -> bool {
        self.player_id.is_none() && self.player_name.is_none() && self.round.is_none()
    }
}

/// The end-of-game reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    /// Winning side label, as sent by the server (e.g. `"卧底胜利"`).
    pub winner: String,
    pub answer_word: String,
    pub spy_word: String,
    /// Player name → role.
    pub player_roles: BTreeMap<String, Role>,
    /// Player name → assigned word.
    pub player_words: BTreeMap<String, String>,
}

/// Decide whether `candidate` describes the local participant.
///
/// Once the server has told us our id, only the id counts. Before that the
/// only thing we know is the name we joined with, so an exact name match is
/// taken as ours. Two participants joining concurrently under the same name
/// can be confused by this.
pub fn is_self(self_id: Option<&str>, self_name: Option<&str>, candidate: &Player) -> bool {
    match (self_id, self_name) {
        (Some(id), _) => candidate.id == id,
        (None, Some(name)) => candidate.name == name,
        (None, None) => false,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn legacy_stage_spelling_maps_to_preparing() {
        assert_eq!(Stage::from_wire("AssigningRoles"), Some(Stage::Preparing));
        assert_eq!(Stage::from_wire("Voting"), Some(Stage::Voting));
        assert_eq!(Stage::from_wire("voting"), None);
    }

    #[test]
    fn civilian_is_normal_and_unknown_roles_cannot_act() {
        assert_eq!(Role::from_wire("Civilian"), Role::Normal);
        assert_eq!(Role::from_wire("Juggernaut"), Role::Observer);
        assert!(!Role::from_wire("Juggernaut").can_act());
        assert!(Role::Spy.can_act());
    }

    #[test]
    fn self_attribution_prefers_id_over_name() {
        let alice = Player::new("p1", "Alice", Role::Admin);
        let other_alice = Player::new("p9", "Alice", Role::Normal);

        assert!(is_self(None, Some("Alice"), &alice));
        assert!(is_self(None, Some("Alice"), &other_alice));
        assert!(is_self(Some("p1"), Some("Alice"), &alice));
        assert!(!is_self(Some("p1"), Some("Alice"), &other_alice));
        assert!(!is_self(None, None, &alice));
    }
}
