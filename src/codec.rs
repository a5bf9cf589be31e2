//! Envelope codec: the only place that understands the untyped wire shape.
//!
//! Encoding is total. Decoding is partial and never fails loudly: a frame that
//! cannot be understood is logged at debug level and dropped, so a
//! version-skewed server can never take the engine down.

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;
use crate::event::{Request, RoomEvent};
use crate::model::{GameResult, Player, Role, Stage, TurnPointer};
use crate::protocol::{
    ClientMessage, DescribePayload, EliminatePayload, ExitGamePayload, GameResultPayload,
    GameStatePayload, JoinGamePayload, PlayerInfo, ServerFrame, ServerMessage, SetWordsPayload,
    StartGamePayload, VotePayload,
};

/// Message used when an `Error` frame carries no text.
const UNKNOWN_SERVER_ERROR: &str = "unknown server error";

// ── Outbound ────────────────────────────────────────────────────────

/// Translate a request into its wire message.
pub fn encode(request: &Request) -> ClientMessage {
    match request {
        Request::Join {
            room_id,
            player_name,
        } => ClientMessage::JoinGame {
            room_id: room_id.clone(),
            joiner_name: player_name.clone(),
        },
        Request::SetWords { player_id, words } => ClientMessage::SetWords {
            set_player_id: player_id.clone(),
            word_list: words.clone(),
        },
        Request::StartGame { player_id } => ClientMessage::StartGame {
            start_player_id: player_id.clone(),
        },
        Request::Describe { player_id, message } => ClientMessage::Describe {
            req_player_id: player_id.clone(),
            message: message.clone(),
        },
        Request::Vote {
            voter_id,
            target_id,
        } => ClientMessage::Vote {
            voter_id: voter_id.clone(),
            target_id: target_id.clone(),
        },
    }
}

/// Translate a request into one JSON text frame.
///
/// # Errors
///
/// Returns [`UndercoverError::Serialization`](crate::UndercoverError::Serialization)
/// if JSON serialization fails.
pub fn encode_text(request: &Request) -> Result<String> {
    Ok(serde_json::to_string(&encode(request))?)
}

/// Parse a client frame back into a request. Used by servers and test doubles.
pub fn decode_request(text: &str) -> Option<Request> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("discarding unreadable client frame: {e}");
            return None;
        }
    };
    Some(match message {
        ClientMessage::JoinGame {
            room_id,
            joiner_name,
        } => Request::Join {
            room_id,
            player_name: joiner_name,
        },
        ClientMessage::SetWords {
            set_player_id,
            word_list,
        } => Request::SetWords {
            player_id: set_player_id,
            words: word_list,
        },
        ClientMessage::StartGame { start_player_id } => Request::StartGame {
            player_id: start_player_id,
        },
        ClientMessage::Describe {
            req_player_id,
            message,
        } => Request::Describe {
            player_id: req_player_id,
            message,
        },
        ClientMessage::Vote {
            voter_id,
            target_id,
        } => Request::Vote {
            voter_id,
            target_id,
        },
    })
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Decode one JSON text frame into a domain event.
///
/// Returns `None` for anything that is not a well-formed, known frame.
pub fn decode(text: &str) -> Option<RoomEvent> {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => decode_frame(frame),
        Err(e) => {
            debug!("discarding unparsable frame: {e}");
            None
        }
    }
}

/// Decode an already-parsed envelope into a domain event.
pub fn decode_frame(frame: ServerFrame) -> Option<RoomEvent> {
    let message = parse_message(frame)?;
    to_event(message)
}

/// Lift an envelope into a typed wire message.
///
/// Any frame that carries a non-empty `error_message` is an error, whatever
/// its discriminator says.
pub fn parse_message(frame: ServerFrame) -> Option<ServerMessage> {
    let ServerFrame {
        response_type,
        data,
        error_message,
    } = frame;

    if let Some(message) = error_message.filter(|m| !m.is_empty()) {
        return Some(ServerMessage::Error { message });
    }

    let message = match response_type.as_str() {
        "Error" => ServerMessage::Error {
            message: data
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or(UNKNOWN_SERVER_ERROR)
                .to_string(),
        },
        "JoinGame" => {
            ServerMessage::JoinGame(Box::new(payload::<JoinGamePayload>(&response_type, data)?))
        }
        "ExitGame" => ServerMessage::ExitGame(payload::<ExitGamePayload>(&response_type, data)?),
        "SetWords" => ServerMessage::SetWords(payload::<SetWordsPayload>(&response_type, data)?),
        "StartGame" => {
            ServerMessage::StartGame(payload::<StartGamePayload>(&response_type, data)?)
        }
        "Describe" => ServerMessage::Describe(payload::<DescribePayload>(&response_type, data)?),
        "Vote" => ServerMessage::Vote(payload::<VotePayload>(&response_type, data)?),
        "GameState" => {
            ServerMessage::GameState(payload::<GameStatePayload>(&response_type, data)?)
        }
        "Eliminate" => {
            ServerMessage::Eliminate(payload::<EliminatePayload>(&response_type, data)?)
        }
        "GameResult" => {
            ServerMessage::GameResult(payload::<GameResultPayload>(&response_type, data)?)
        }
        other => {
            debug!(response_type = other, "discarding frame with unknown discriminator");
            return None;
        }
    };
    Some(message)
}

fn payload<T: DeserializeOwned>(
    response_type: &str,
    data: Option<serde_json::Value>,
) -> Option<T> {
    let Some(data) = data else {
        debug!(response_type, "discarding frame without a payload");
        return None;
    };
    match serde_json::from_value(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(response_type, "discarding malformed payload: {e}");
            None
        }
    }
}

fn player(info: PlayerInfo) -> Player {
    Player {
        id: info.id,
        name: info.name,
        role: Role::from_wire(&info.role),
        word: info.word,
    }
}

fn stage(raw: &str) -> Option<Stage> {
    let stage = Stage::from_wire(raw);
    if stage.is_none() {
        debug!(stage = raw, "discarding frame with unknown stage");
    }
    stage
}

/// Map a typed wire message onto the engine's event vocabulary.
pub fn to_event(message: ServerMessage) -> Option<RoomEvent> {
    let event = match message {
        ServerMessage::Error { message } => RoomEvent::Error { message },
        ServerMessage::JoinGame(p) => {
            let JoinGamePayload {
                joiner,
                room_id,
                stage: raw_stage,
                players,
                master_id,
            } = *p;
            RoomEvent::Joined {
                joiner: player(joiner),
                room_id,
                stage: stage(&raw_stage)?,
                players: players.into_iter().map(player).collect(),
                master_id,
            }
        }
        ServerMessage::ExitGame(p) => RoomEvent::PlayerLeft {
            player_id: p.left_player_id,
            player_name: p.left_player_name,
        },
        ServerMessage::SetWords(p) => RoomEvent::WordsSet { words: p.word_list },
        ServerMessage::StartGame(p) => RoomEvent::Started {
            role: Role::from_wire(&p.assigned_role),
            word: p.assigned_word.filter(|w| !w.is_empty()),
            players: p.players.map(|ps| ps.into_iter().map(player).collect()),
        },
        ServerMessage::Describe(p) => RoomEvent::Described {
            speaker_id: p.speaker_id,
            speaker_name: p.speaker_name,
            message: p.message,
        },
        ServerMessage::Vote(p) => RoomEvent::VoteCast {
            voter_id: p.voter_id,
            voter_name: p.voter_name,
            target_id: p.target_id,
            target_name: p.target_name,
        },
        ServerMessage::GameState(p) => RoomEvent::StageChanged {
            stage: stage(&p.stage)?,
            turn: TurnPointer {
                player_id: p.current_turn_id,
                player_name: p.current_turn_name,
                round: p.round,
            },
        },
        ServerMessage::Eliminate(p) => RoomEvent::Eliminated {
            player_id: p.eliminated_id,
            player_name: p.eliminated_name,
            word: p.eliminated_word,
        },
        ServerMessage::GameResult(p) => RoomEvent::Finished(GameResult {
            winner: p.winner,
            answer_word: p.answer_word,
            spy_word: p.spy_word,
            player_roles: p
                .player_roles
                .into_iter()
                .map(|(name, role)| (name, Role::from_wire(&role)))
                .collect(),
            player_words: p.player_words,
        }),
    };
    Some(event)
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
    use serde_json::json;

    #[test]
    fn encode_uses_wire_key_names() {
        let frame = encode_text(&Request::Describe {
            player_id: "p1".into(),
            message: "it is red".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({
                "request_type": "Describe",
                "data": { "req_player_id": "p1", "message": "it is red" }
            })
        );
    }

    #[test]
    fn join_request_carries_joiner_name() {
        let frame = encode_text(&Request::Join {
            room_id: "R1".into(),
            player_name: "Alice".into(),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["request_type"], "JoinGame");
        assert_eq!(value["data"]["room_id"], "R1");
        assert_eq!(value["data"]["joiner_name"], "Alice");
    }

    #[test]
    fn decode_request_inverts_encode() {
        let request = Request::Vote {
            voter_id: "p1".into(),
            target_id: "p2".into(),
        };
        let text = encode_text(&request).unwrap();
        assert_eq!(decode_request(&text), Some(request));
    }

    #[test]
    fn unknown_discriminator_is_ignored() {
        let text = json!({ "response_type": "Teleport", "data": {} }).to_string();
        assert_eq!(decode(&text), None);
    }

    #[test]
    fn garbage_is_ignored() {
        assert_eq!(decode("not json"), None);
        assert_eq!(decode("{}"), None);
        assert_eq!(decode("[1,2,3]"), None);
    }

    #[test]
    fn missing_payload_is_ignored() {
        let text = json!({ "response_type": "Describe", "data": null }).to_string();
        assert_eq!(decode(&text), None);
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let text = json!({ "response_type": "Vote", "data": { "voter_id": 7 } }).to_string();
        assert_eq!(decode(&text), None);
    }

    #[test]
    fn error_frame_decodes_to_error_event() {
        let text = json!({
            "response_type": "Error",
            "data": null,
            "error_message": "room not found"
        })
        .to_string();
        assert_eq!(
            decode(&text),
            Some(RoomEvent::Error {
                message: "room not found".into()
            })
        );
    }

    #[test]
    fn error_frame_without_text_still_decodes() {
        let text = json!({ "response_type": "Error", "data": null }).to_string();
        assert_eq!(
            decode(&text),
            Some(RoomEvent::Error {
                message: UNKNOWN_SERVER_ERROR.into()
            })
        );
    }

    #[test]
    fn error_message_on_any_frame_wins() {
        let text = json!({
            "response_type": "JoinGame",
            "data": null,
            "error_message": "name taken"
        })
        .to_string();
        assert_eq!(
            decode(&text),
            Some(RoomEvent::Error {
                message: "name taken".into()
            })
        );
    }

    #[test]
    fn empty_error_message_is_not_an_error() {
        let text = json!({
            "response_type": "SetWords",
            "data": { "word_list": ["a", "b"] },
            "error_message": ""
        })
        .to_string();
        assert_eq!(
            decode(&text),
            Some(RoomEvent::WordsSet {
                words: vec!["a".into(), "b".into()]
            })
        );
    }

    #[test]
    fn unknown_stage_drops_the_frame() {
        let text = json!({ "response_type": "GameState", "data": { "stage": "Intermission" } })
            .to_string();
        assert_eq!(decode(&text), None);
    }

    #[test]
    fn empty_assigned_word_means_no_word() {
        let text = json!({
            "response_type": "StartGame",
            "data": { "assigned_role": "Blank", "assigned_word": "" }
        })
        .to_string();
        assert_eq!(
            decode(&text),
            Some(RoomEvent::Started {
                role: Role::Blank,
                word: None,
                players: None
            })
        );
    }
}
