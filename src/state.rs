//! Client-visible game state and the reducer that folds events into it.
//!
//! [`GameState`] is the single source of truth for what the presentation layer
//! shows. It only changes through [`GameState::apply`] (or its functional form
//! [`reduce`]), one [`Action`] at a time, in delivery order. There is no
//! reordering and no deduplication: replaying the same event sequence
//! reproduces the same state, and a duplicated event produces a duplicated
//! log entry.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;
use uuid::Uuid;

use crate::event::RoomEvent;
use crate::model::{is_self, GameResult, Player, PlayerId, Role, RoomId, Stage, TurnPointer};

// ── Log ─────────────────────────────────────────────────────────────

/// One line of the game log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Locally generated, unique per entry.
    pub id: Uuid,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub kind: LogKind,
}

impl LogEntry {
    fn new(kind: LogKind) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self {
            id: Uuid::new_v4(),
            timestamp_ms,
            kind,
        }
    }
}

/// What a log entry records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogKind {
    Chat {
        player_id: PlayerId,
        player_name: Option<String>,
        message: String,
    },
    Join {
        player: Player,
    },
    /// Phase-change banner. `assigned_word` is only ever set on our own
    /// game-start entry.
    Stage {
        stage: Stage,
        assigned_word: Option<String>,
        turn: Option<TurnPointer>,
    },
    Vote {
        voter_id: PlayerId,
        voter_name: Option<String>,
        target_id: PlayerId,
        target_name: Option<String>,
    },
    Eliminated {
        player_id: PlayerId,
        player_name: Option<String>,
        word: Option<String>,
    },
    System(Notice),
}

/// System notices. `Display` gives a default English rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PlayerLeft { name: String },
    WordsUpdated { count: usize },
    GameOver { winner: String },
    Disconnected { reason: Option<String> },
    ServerError { message: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlayerLeft { name } => write!(f, "{name} left the room"),
            Self::WordsUpdated { count } => write!(f, "word list updated ({count})"),
            Self::GameOver { winner } => write!(f, "game over, {winner}"),
            Self::Disconnected { reason: Some(reason) } => {
                write!(f, "disconnected from server: {reason}")
            }
            Self::Disconnected { reason: None } => f.write_str("disconnected from server"),
            Self::ServerError { message } => f.write_str(message),
        }
    }
}

// ── Vote ────────────────────────────────────────────────────────────

/// The local participant's vote in the current voting round.
///
/// `pending` is the optimistic target recorded when we sent a vote; it is
/// folded into `voted_for` when the server echoes a vote from us.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoteState {
    voted_for: Option<PlayerId>,
    pending: Option<PlayerId>,
}

impl VoteState {
    /// `true` once we sent a vote this round or the server confirmed one.
    pub fn has_voted(&self) -> bool {
        self.voted_for.is_some() || self.pending.is_some()
    }

    /// The server-confirmed target.
    pub fn voted_for(&self) -> Option<&str> {
        self.voted_for.as_deref()
    }

    /// The optimistic target still awaiting the server echo.
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    fn mark_pending(&mut self, target: PlayerId) {
        self.pending = Some(target);
    }

    fn confirm(&mut self, target: PlayerId) {
        if let Some(pending) = self.pending.take() {
            if pending != target {
                debug!(%pending, %target, "server recorded a different vote than we sent");
            }
        }
        self.voted_for = Some(target);
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Every ballot seen in the current voting round, one per voter.
///
/// A voter's latest echo replaces their earlier ballot, so a duplicated echo
/// never counts twice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoteTally {
    ballots: BTreeMap<PlayerId, PlayerId>,
}

impl VoteTally {
    /// Votes per target.
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for target in self.ballots.values() {
            *counts.entry(target.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// How many ballots name `target_id`.
    pub fn votes_for(&self, target_id: &str) -> usize {
        self.ballots.values().filter(|t| *t == target_id).count()
    }

    /// Whom `voter_id` voted for this round.
    pub fn ballot(&self, voter_id: &str) -> Option<&str> {
        self.ballots.get(voter_id).map(String::as_str)
    }

    /// Number of ballots cast.
    pub fn len(&self) -> usize {
        self.ballots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ballots.is_empty()
    }

    fn record(&mut self, voter_id: PlayerId, target_id: PlayerId) {
        if let Some(previous) = self.ballots.insert(voter_id, target_id) {
            debug!(%previous, "ballot replaced");
        }
    }

    fn clear(&mut self) {
        self.ballots.clear();
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// Join progress as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinStatus {
    #[default]
    Idle,
    Connecting,
    Joined,
    Failed,
}

/// Everything the reducer understands: decoded room events plus the
/// engine's own lifecycle notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// A join attempt is starting.
    Connecting { room_id: RoomId, player_name: String },
    /// The join handshake resolved.
    Connected,
    /// The join handshake failed.
    ConnectFailed { reason: String },
    /// We sent a vote and are waiting for the echo.
    VoteSent { target_id: PlayerId },
    /// Explicit leave: forget everything.
    Reset,
    Event(RoomEvent),
}

impl From<RoomEvent> for Action {
    fn from(event: RoomEvent) -> Self {
        Self::Event(event)
    }
}

// ── State ───────────────────────────────────────────────────────────

/// Everything the client knows about the room it is in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameState {
    room_id: Option<RoomId>,
    self_id: Option<PlayerId>,
    self_name: Option<String>,
    role: Option<Role>,
    word: Option<String>,
    master_id: Option<PlayerId>,
    stage: Stage,
    turn: Option<TurnPointer>,
    vote: VoteState,
    tally: VoteTally,
    join_status: JoinStatus,
    join_error: Option<String>,
    connected: bool,
    retrying: bool,
    players: Vec<Player>,
    log: Vec<LogEntry>,
    word_list: Vec<String>,
    eliminated_ids: Vec<PlayerId>,
    result: Option<GameResult>,
}

/// Fold one action into a state.
pub fn reduce(mut state: GameState, action: impl Into<Action>) -> GameState {
    state.apply(action);
    state
}

impl GameState {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    /// Our server-assigned id, once the join echo arrived.
    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    /// The name we joined with.
    pub fn self_name(&self) -> Option<&str> {
        self.self_name.as_deref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Our secret word, if our role has one and the game started.
    pub fn word(&self) -> Option<&str> {
        self.word.as_deref()
    }

    pub fn master_id(&self) -> Option<&str> {
        self.master_id.as_deref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Turn pointer from the most recent heartbeat.
    pub fn current_turn(&self) -> Option<&TurnPointer> {
        self.turn.as_ref()
    }

    pub fn vote(&self) -> &VoteState {
        &self.vote
    }

    pub fn has_voted(&self) -> bool {
        self.vote.has_voted()
    }

    /// Ballots echoed by the server since the last voting announcement.
    pub fn tally(&self) -> &VoteTally {
        &self.tally
    }

    pub fn join_status(&self) -> JoinStatus {
        self.join_status
    }

    pub fn join_error(&self) -> Option<&str> {
        self.join_error.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `true` while an automatic reconnect is in progress.
    pub fn is_retrying(&self) -> bool {
        self.retrying
    }

    /// `true` when we were in a room, lost the connection, and automatic
    /// reconnection gave up.
    pub fn needs_manual_retry(&self) -> bool {
        !self.connected && !self.retrying && self.self_id.is_some()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// `true` if we are the room admin.
    pub fn is_master(&self) -> bool {
        matches!((&self.self_id, &self.master_id), (Some(me), Some(master)) if me == master)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn word_list(&self) -> &[String] {
        &self.word_list
    }

    pub fn eliminated_ids(&self) -> &[PlayerId] {
        &self.eliminated_ids
    }

    pub fn result(&self) -> Option<&GameResult> {
        self.result.as_ref()
    }

    /// Fold one action into this state.
    pub fn apply(&mut self, action: impl Into<Action>) {
        match action.into() {
            Action::Connecting {
                room_id,
                player_name,
            } => {
                self.room_id = Some(room_id);
                self.self_name = Some(player_name);
                self.word_list.clear();
                self.join_status = JoinStatus::Connecting;
                self.join_error = None;
                self.connected = false;
                self.retrying = false;
            }
            Action::Connected => {
                self.join_status = JoinStatus::Joined;
                self.join_error = None;
                self.connected = true;
                self.retrying = false;
            }
            Action::ConnectFailed { reason } => {
                self.join_status = JoinStatus::Failed;
                self.join_error = Some(reason);
                self.connected = false;
                self.retrying = false;
            }
            Action::VoteSent { target_id } => self.vote.mark_pending(target_id),
            Action::Reset => *self = Self::default(),
            Action::Event(event) => self.apply_event(event),
        }
    }

    fn apply_event(&mut self, event: RoomEvent) {
        debug!(event = event.kind(), "reducing room event");
        match event {
            RoomEvent::Error { message } => {
                if self.join_status == JoinStatus::Connecting {
                    self.join_status = JoinStatus::Failed;
                    self.join_error = Some(message.clone());
                }
                self.push(LogKind::System(Notice::ServerError { message }));
            }

            RoomEvent::Joined {
                joiner,
                room_id,
                stage,
                players,
                master_id,
            } => {
                if is_self(self.self_id(), self.self_name(), &joiner) {
                    // Once known, attribution is by id, so the id can never change here.
                    if self.self_id.is_none() {
                        self.self_id = Some(joiner.id.clone());
                    }
                    self.role = Some(joiner.role);
                    self.word = joiner.word.clone();
                    self.join_status = JoinStatus::Joined;
                    self.join_error = None;
                    self.connected = true;
                    self.retrying = false;
                    self.vote.reset();
                }
                self.players = roster(players, &joiner);
                self.room_id = Some(room_id);
                self.stage = stage;
                self.master_id = master_id;
                self.push(LogKind::Join { player: joiner });
            }

            RoomEvent::PlayerLeft {
                player_id,
                player_name,
            } => {
                let name = self
                    .player(&player_id)
                    .map(|p| p.name.clone())
                    .or(player_name)
                    .unwrap_or_else(|| player_id.clone());
                self.players.retain(|p| p.id != player_id);
                self.push(LogKind::System(Notice::PlayerLeft { name }));
            }

            RoomEvent::WordsSet { words } => {
                let count = words.len();
                self.word_list = words;
                self.push(LogKind::System(Notice::WordsUpdated { count }));
            }

            RoomEvent::Started {
                role,
                word,
                players,
            } => {
                self.role = Some(role);
                self.word = word.clone();
                self.stage = Stage::Preparing;
                self.vote.reset();
                self.tally.clear();
                if let Some(players) = players {
                    self.players = dedup_by_id(players);
                }
                self.push(LogKind::Stage {
                    stage: Stage::Preparing,
                    assigned_word: word,
                    turn: None,
                });
            }

            RoomEvent::Described {
                speaker_id,
                speaker_name,
                message,
            } => self.push(LogKind::Chat {
                player_id: speaker_id,
                player_name: speaker_name,
                message,
            }),

            RoomEvent::VoteCast {
                voter_id,
                voter_name,
                target_id,
                target_name,
            } => {
                if self.self_id.as_deref() == Some(voter_id.as_str()) {
                    self.vote.confirm(target_id.clone());
                }
                self.tally.record(voter_id.clone(), target_id.clone());
                self.push(LogKind::Vote {
                    voter_id,
                    voter_name,
                    target_id,
                    target_name,
                });
            }

            RoomEvent::StageChanged { stage, turn } => {
                self.stage = stage;
                if stage == Stage::Voting {
                    self.vote.reset();
                    self.tally.clear();
                }
                let turn = (!turn.is_empty()).then_some(turn);
                self.turn.clone_from(&turn);
                self.push(LogKind::Stage {
                    stage,
                    assigned_word: None,
                    turn,
                });
            }

            RoomEvent::Eliminated {
                player_id,
                player_name,
                word,
            } => {
                for p in self.players.iter_mut().filter(|p| p.id == player_id) {
                    p.role = Role::Observer;
                }
                if self.self_id.as_deref() == Some(player_id.as_str()) {
                    self.role = Some(Role::Observer);
                }
                if !self.eliminated_ids.contains(&player_id) {
                    self.eliminated_ids.push(player_id.clone());
                }
                self.push(LogKind::Eliminated {
                    player_id,
                    player_name,
                    word,
                });
            }

            RoomEvent::Finished(result) => {
                self.stage = Stage::Finished;
                self.vote.reset();
                self.tally.clear();
                let winner = result.winner.clone();
                if self.result.is_none() {
                    self.result = Some(result);
                } else {
                    debug!("game result already recorded, keeping the first one");
                }
                self.push(LogKind::System(Notice::GameOver { winner }));
            }

            RoomEvent::Disconnected { reason, will_retry } => {
                self.join_status = JoinStatus::Idle;
                self.connected = false;
                self.retrying = will_retry;
                self.push(LogKind::System(Notice::Disconnected { reason }));
            }
        }
    }

    fn push(&mut self, kind: LogKind) {
        self.log.push(LogEntry::new(kind));
    }
}

/// Keep the last occurrence of each id, in first-seen order.
fn dedup_by_id(players: Vec<Player>) -> Vec<Player> {
    let mut out: Vec<Player> = Vec::with_capacity(players.len());
    for player in players {
        match out.iter_mut().find(|p| p.id == player.id) {
            Some(existing) => *existing = player,
            None => out.push(player),
        }
    }
    out
}

/// The roster carried on a join event, with the joiner guaranteed present.
fn roster(players: Vec<Player>, joiner: &Player) -> Vec<Player> {
    let mut players = dedup_by_id(players);
    if !players.iter().any(|p| p.id == joiner.id) {
        players.push(joiner.clone());
    }
    players
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
    use std::collections::BTreeMap;

    // ── Helpers ─────────────────────────────────────────────────────

    fn alice() -> Player {
        Player::new("p1", "Alice", Role::Admin)
    }

    fn bob() -> Player {
        Player::new("p2", "Bob", Role::Normal)
    }

    fn joined(joiner: Player, players: Vec<Player>) -> RoomEvent {
        RoomEvent::Joined {
            joiner,
            room_id: "R1".into(),
            stage: Stage::Waiting,
            players,
            master_id: Some("p1".into()),
        }
    }

    /// Alice has joined room R1 and Bob is in the room too.
    fn joined_as_alice() -> GameState {
        let mut state = GameState::new();
        state.apply(Action::Connecting {
            room_id: "R1".into(),
            player_name: "Alice".into(),
        });
        state.apply(joined(alice(), vec![alice()]));
        state.apply(joined(bob(), vec![alice(), bob()]));
        state
    }

    fn stage(stage: Stage) -> RoomEvent {
        RoomEvent::StageChanged {
            stage,
            turn: TurnPointer::default(),
        }
    }

    fn vote(voter: &str, target: &str) -> RoomEvent {
        RoomEvent::VoteCast {
            voter_id: voter.into(),
            voter_name: None,
            target_id: target.into(),
            target_name: None,
        }
    }

    fn result() -> GameResult {
        GameResult {
            winner: "卧底胜利".into(),
            answer_word: "苹果".into(),
            spy_word: "香蕉".into(),
            player_roles: BTreeMap::from([
                ("Alice".to_string(), Role::Normal),
                ("Bob".to_string(), Role::Spy),
            ]),
            player_words: BTreeMap::from([
                ("Alice".to_string(), "苹果".to_string()),
                ("Bob".to_string(), "香蕉".to_string()),
            ]),
        }
    }

    // ── Join ────────────────────────────────────────────────────────

    #[test]
    fn self_join_sets_identity_by_name() {
        let state = joined_as_alice();
        assert_eq!(state.self_id(), Some("p1"));
        assert_eq!(state.role(), Some(Role::Admin));
        assert_eq!(state.join_status(), JoinStatus::Joined);
        assert!(state.is_connected());
        assert!(state.is_master());
        assert_eq!(state.stage(), Stage::Waiting);
        assert_eq!(state.players().len(), 2);
    }

    #[test]
    fn other_join_does_not_touch_identity() {
        let state = joined_as_alice();
        assert_eq!(state.self_id(), Some("p1"));
        assert_eq!(state.role(), Some(Role::Admin));
    }

    #[test]
    fn same_name_after_identity_is_someone_else() {
        let mut state = joined_as_alice();
        let impostor = Player::new("p7", "Alice", Role::Normal);
        state.apply(joined(impostor.clone(), vec![alice(), bob(), impostor]));

        assert_eq!(state.self_id(), Some("p1"));
        assert_eq!(state.role(), Some(Role::Admin));
        assert_eq!(state.players().len(), 3);
    }

    #[test]
    fn join_roster_is_replaced_not_merged() {
        let mut state = joined_as_alice();
        let carol = Player::new("p3", "Carol", Role::Normal);
        // Bob is missing from the authoritative roster.
        state.apply(joined(carol.clone(), vec![alice(), carol]));

        let ids: Vec<_> = state.players().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p3"]);
    }

    #[test]
    fn join_roster_never_holds_duplicate_ids() {
        let mut state = GameState::new();
        let renamed = Player::new("p2", "Bobby", Role::Normal);
        state.apply(joined(bob(), vec![alice(), bob(), alice(), renamed]));

        let ids: Vec<_> = state.players().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["p1", "p2"]);
        assert_eq!(state.player("p2").unwrap().name, "Bobby");
    }

    #[test]
    fn joiner_missing_from_roster_is_added() {
        let mut state = GameState::new();
        state.apply(joined(bob(), vec![alice()]));
        assert!(state.player("p2").is_some());
    }

    #[test]
    fn join_appends_log_entry() {
        let state = joined_as_alice();
        assert_eq!(state.log().len(), 2);
        assert!(matches!(&state.log()[1].kind, LogKind::Join { player } if player.name == "Bob"));
    }

    // ── Errors ──────────────────────────────────────────────────────

    #[test]
    fn error_while_connecting_fails_the_join() {
        let mut state = GameState::new();
        state.apply(Action::Connecting {
            room_id: "R9".into(),
            player_name: "Alice".into(),
        });
        state.apply(RoomEvent::Error {
            message: "room not found".into(),
        });

        assert_eq!(state.join_status(), JoinStatus::Failed);
        assert_eq!(state.join_error(), Some("room not found"));
        assert_eq!(state.log().len(), 1);
    }

    #[test]
    fn error_after_join_only_logs() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::Error {
            message: "not your turn".into(),
        });
        assert_eq!(state.join_status(), JoinStatus::Joined);
        assert_eq!(state.join_error(), None);
        assert!(matches!(
            &state.log().last().unwrap().kind,
            LogKind::System(Notice::ServerError { message }) if message == "not your turn"
        ));
    }

    // ── Leaving ─────────────────────────────────────────────────────

    #[test]
    fn player_left_uses_last_known_name() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::PlayerLeft {
            player_id: "p2".into(),
            player_name: Some("stale".into()),
        });

        assert!(state.player("p2").is_none());
        assert_eq!(
            state.log().last().unwrap().kind,
            LogKind::System(Notice::PlayerLeft { name: "Bob".into() })
        );
    }

    #[test]
    fn unknown_player_left_falls_back_to_event_name() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::PlayerLeft {
            player_id: "p9".into(),
            player_name: Some("Ghost".into()),
        });
        assert_eq!(state.players().len(), 2);
        assert_eq!(
            state.log().last().unwrap().kind,
            LogKind::System(Notice::PlayerLeft {
                name: "Ghost".into()
            })
        );
    }

    // ── Words ───────────────────────────────────────────────────────

    #[test]
    fn words_set_twice_keeps_one_list_and_two_entries() {
        let mut state = joined_as_alice();
        let before = state.log().len();
        let event = RoomEvent::WordsSet {
            words: vec!["苹果".into(), "香蕉".into()],
        };
        state.apply(event.clone());
        state.apply(event);

        assert_eq!(state.word_list(), ["苹果", "香蕉"]);
        assert_eq!(state.log().len(), before + 2);
        assert_eq!(state.stage(), Stage::Waiting);
    }

    // ── Start ───────────────────────────────────────────────────────

    #[test]
    fn started_assigns_role_and_word() {
        let mut state = joined_as_alice();
        state.apply(Action::VoteSent {
            target_id: "p2".into(),
        });
        state.apply(RoomEvent::Started {
            role: Role::Spy,
            word: Some("香蕉".into()),
            players: None,
        });

        assert_eq!(state.role(), Some(Role::Spy));
        assert_eq!(state.word(), Some("香蕉"));
        assert_eq!(state.stage(), Stage::Preparing);
        assert!(!state.has_voted());
        assert_eq!(state.players().len(), 2);
        assert!(matches!(
            &state.log().last().unwrap().kind,
            LogKind::Stage { stage: Stage::Preparing, assigned_word: Some(w), .. } if w == "香蕉"
        ));
    }

    #[test]
    fn started_with_roster_replaces_it() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::Started {
            role: Role::Normal,
            word: Some("苹果".into()),
            players: Some(vec![alice()]),
        });
        assert_eq!(state.players().len(), 1);
    }

    // ── Chat ────────────────────────────────────────────────────────

    #[test]
    fn chat_lines_keep_arrival_order() {
        let mut state = joined_as_alice();
        for text in ["first", "second", "third"] {
            state.apply(RoomEvent::Described {
                speaker_id: "p2".into(),
                speaker_name: Some("Bob".into()),
                message: text.into(),
            });
        }
        let lines: Vec<_> = state
            .log()
            .iter()
            .filter_map(|e| match &e.kind {
                LogKind::Chat { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, ["first", "second", "third"]);
    }

    // ── Voting ──────────────────────────────────────────────────────

    #[test]
    fn voting_announcement_resets_vote() {
        let mut state = joined_as_alice();
        state.apply(vote("p1", "p2"));
        assert!(state.has_voted());

        state.apply(stage(Stage::Voting));
        assert!(!state.has_voted());
        assert_eq!(state.vote().voted_for(), None);
    }

    #[test]
    fn repeated_voting_announcement_resets_again() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(Action::VoteSent {
            target_id: "p2".into(),
        });
        state.apply(stage(Stage::Voting));
        assert!(!state.has_voted());
    }

    #[test]
    fn non_voting_stage_keeps_vote() {
        let mut state = joined_as_alice();
        state.apply(vote("p1", "p2"));
        state.apply(stage(Stage::Judging));
        assert!(state.has_voted());
    }

    #[test]
    fn optimistic_vote_then_echo_is_confirmed_once() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(Action::VoteSent {
            target_id: "p2".into(),
        });
        assert!(state.has_voted());
        assert_eq!(state.vote().pending(), Some("p2"));
        assert_eq!(state.vote().voted_for(), None);

        state.apply(vote("p1", "p2"));
        assert!(state.has_voted());
        assert_eq!(state.vote().pending(), None);
        assert_eq!(state.vote().voted_for(), Some("p2"));
    }

    #[test]
    fn echo_without_optimistic_vote_confirms() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p1", "p2"));
        assert!(state.has_voted());
        assert_eq!(state.vote().voted_for(), Some("p2"));
    }

    #[test]
    fn other_players_votes_only_log() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p2", "p1"));
        assert!(!state.has_voted());
        assert!(matches!(
            &state.log().last().unwrap().kind,
            LogKind::Vote { voter_id, .. } if voter_id == "p2"
        ));
    }

    #[test]
    fn tally_counts_one_ballot_per_voter() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p1", "p2"));
        state.apply(vote("p3", "p2"));
        state.apply(vote("p2", "p1"));

        assert_eq!(state.tally().len(), 3);
        assert_eq!(state.tally().votes_for("p2"), 2);
        assert_eq!(state.tally().ballot("p2"), Some("p1"));
        assert_eq!(
            state.tally().counts(),
            BTreeMap::from([("p1", 1), ("p2", 2)])
        );
    }

    #[test]
    fn duplicate_echo_does_not_inflate_tally() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p3", "p2"));
        state.apply(vote("p3", "p2"));
        assert_eq!(state.tally().votes_for("p2"), 1);

        state.apply(vote("p3", "p1"));
        assert_eq!(state.tally().votes_for("p2"), 0);
        assert_eq!(state.tally().votes_for("p1"), 1);
    }

    #[test]
    fn tally_resets_on_voting_start_and_result() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p2", "p1"));
        state.apply(stage(Stage::Judging));
        assert_eq!(state.tally().len(), 1);

        state.apply(stage(Stage::Voting));
        assert!(state.tally().is_empty());

        state.apply(vote("p2", "p1"));
        state.apply(RoomEvent::Started {
            role: Role::Normal,
            word: Some("苹果".into()),
            players: None,
        });
        assert!(state.tally().is_empty());

        state.apply(vote("p2", "p1"));
        state.apply(RoomEvent::Finished(result()));
        assert!(state.tally().is_empty());
    }

    #[test]
    fn duplicate_vote_echo_is_idempotent_except_log() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        let before = state.log().len();
        state.apply(vote("p1", "p2"));
        state.apply(vote("p1", "p2"));
        assert_eq!(state.vote().voted_for(), Some("p2"));
        assert_eq!(state.log().len(), before + 2);
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    #[test]
    fn heartbeat_sets_turn_pointer() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::StageChanged {
            stage: Stage::Speaking,
            turn: TurnPointer {
                player_id: Some("p2".into()),
                player_name: Some("Bob".into()),
                round: Some(1),
            },
        });
        assert_eq!(state.stage(), Stage::Speaking);
        let turn = state.current_turn().unwrap();
        assert_eq!(turn.player_id.as_deref(), Some("p2"));
        assert_eq!(turn.round, Some(1));

        state.apply(stage(Stage::Voting));
        assert!(state.current_turn().is_none());
    }

    // ── Elimination ─────────────────────────────────────────────────

    #[test]
    fn self_elimination_downgrades_role_once() {
        let mut state = joined_as_alice();
        let event = RoomEvent::Eliminated {
            player_id: "p1".into(),
            player_name: Some("Alice".into()),
            word: Some("苹果".into()),
        };
        state.apply(event.clone());
        state.apply(event);

        assert_eq!(state.role(), Some(Role::Observer));
        assert_eq!(state.player("p1").unwrap().role, Role::Observer);
        assert_eq!(state.eliminated_ids(), ["p1"]);
        assert_eq!(state.players().len(), 2);
    }

    #[test]
    fn other_elimination_keeps_our_role() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::Eliminated {
            player_id: "p2".into(),
            player_name: None,
            word: None,
        });
        assert_eq!(state.role(), Some(Role::Admin));
        assert_eq!(state.player("p2").unwrap().role, Role::Observer);
    }

    // ── Result ──────────────────────────────────────────────────────

    #[test]
    fn result_is_recorded_exactly_once() {
        let mut state = joined_as_alice();
        state.apply(stage(Stage::Voting));
        state.apply(vote("p1", "p2"));
        state.apply(RoomEvent::Finished(result()));

        let mut second = result();
        second.winner = "平民胜利".into();
        state.apply(RoomEvent::Finished(second));

        assert_eq!(state.stage(), Stage::Finished);
        assert!(!state.has_voted());
        let recorded = state.result().unwrap();
        assert_eq!(recorded.winner, "卧底胜利");
        assert_eq!(recorded.player_roles.get("Bob"), Some(&Role::Spy));
        assert_eq!(
            recorded.player_words.get("Alice").map(String::as_str),
            Some("苹果")
        );
    }

    // ── Disconnect ──────────────────────────────────────────────────

    #[test]
    fn disconnect_keeps_history() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::WordsSet {
            words: vec!["a".into(), "b".into()],
        });
        let log_before = state.log().to_vec();

        state.apply(RoomEvent::Disconnected {
            reason: Some("closed by server".into()),
            will_retry: true,
        });

        assert_eq!(state.join_status(), JoinStatus::Idle);
        assert!(!state.is_connected());
        assert!(state.is_retrying());
        assert!(!state.needs_manual_retry());
        assert_eq!(state.players().len(), 2);
        assert_eq!(state.word_list().len(), 2);
        assert_eq!(state.self_id(), Some("p1"));
        assert_eq!(&state.log()[..log_before.len()], log_before.as_slice());
        assert_eq!(state.log().len(), log_before.len() + 1);
    }

    #[test]
    fn exhausted_reconnect_needs_manual_retry() {
        let mut state = joined_as_alice();
        state.apply(RoomEvent::Disconnected {
            reason: None,
            will_retry: false,
        });
        assert!(state.needs_manual_retry());
    }

    #[test]
    fn reset_forgets_everything() {
        let state = reduce(joined_as_alice(), Action::Reset);
        assert_eq!(state, GameState::default());
    }

    #[test]
    fn log_ids_are_unique() {
        let state = joined_as_alice();
        let mut ids: Vec<_> = state.log().iter().map(|e| e.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), state.log().len());
    }

    #[test]
    fn notices_render_readably() {
        assert_eq!(
            Notice::WordsUpdated { count: 3 }.to_string(),
            "word list updated (3)"
        );
        assert_eq!(
            Notice::Disconnected { reason: None }.to_string(),
            "disconnected from server"
        );
    }
}
