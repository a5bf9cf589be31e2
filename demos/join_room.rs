//! # Join Room Example
//!
//! Joins an Undercover room over WebSocket and plays from the terminal.
//!
//! Every line typed is sent as a description, except for these commands:
//!
//! | Input               | Action                         |
//! |---------------------|--------------------------------|
//! | `/words a/b c/d`    | replace the room word list     |
//! | `/start`            | start the game (room admin)    |
//! | `/vote <player-id>` | vote during the voting stage   |
//! | `/who`              | print the roster               |
//! | `/retry`            | rejoin after reconnects gave up|
//! | `/quit`             | leave and exit                 |
//!
//! ## Running
//!
//! ```sh
//! # With a game server on 127.0.0.1:8888:
//! cargo run --example join_room -- R1 Alice
//!
//! # Override the endpoint:
//! UNDERCOVER_WS_URL=ws://my-server:8888/api/v1/ws cargo run --example join_room -- R1 Alice
//! ```

use tokio::io::{AsyncBufReadExt, BufReader};
use undercover_client::transports::WebSocketConnector;
use undercover_client::{
    ClientConfig, GameClient, JsonFileSessionStore, LogKind, RoomEvent, Stage,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let room_id = args.next().unwrap_or_else(|| "R1".to_string());
    let name = args.next().unwrap_or_else(|| "RustPlayer".to_string());

    let config = ClientConfig::from_env();
    tracing::info!("Connecting to {}", config.server_url);

    let store = JsonFileSessionStore::new(std::env::temp_dir().join("undercover-session.json"));
    let mut client = GameClient::new(WebSocketConnector::from_config(&config), &config)
        .with_session_store(store);
    if let Some(previous) = client.restored_session() {
        tracing::info!(
            "Last session: room {:?} as {:?}",
            previous.room_id,
            previous.player_name
        );
    }

    let me = client.join(room_id.as_str(), name.as_str()).await?;
    tracing::info!("Joined {room_id} as {} ({})", me.name, me.id);

    let mut events = client.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                client.process_pending();
                show(&client, &event);
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !command(&mut client, line.trim()).await {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                break;
            }
        }
    }

    client.leave().await;
    Ok(())
}

/// Handle one line of input. Returns `false` to quit.
async fn command(client: &mut GameClient<WebSocketConnector>, line: &str) -> bool {
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let sent = match head {
        "" => return true,
        "/quit" => return false,
        "/start" => client.start_game(),
        "/vote" => client.cast_vote(rest.trim()),
        "/words" => client.update_word_list(rest.split_whitespace()),
        "/who" => {
            for p in client.state().players() {
                println!("  {} {} [{}]", p.id, p.name, p.role);
            }
            true
        }
        "/retry" => match client.retry().await {
            Ok(me) => {
                tracing::info!("Rejoined as {}", me.id);
                true
            }
            Err(e) => {
                tracing::warn!("Retry failed: {e}");
                true
            }
        },
        _ => client.send_chat(line),
    };
    if !sent {
        println!("(not sent)");
    }
    true
}

fn show(client: &GameClient<WebSocketConnector>, event: &RoomEvent) {
    let state = client.state();
    match event {
        RoomEvent::Started { role, word, .. } => {
            println!(
                "== game started: you are {role}, your word is {}",
                word.as_deref().unwrap_or("(none)")
            );
        }
        RoomEvent::StageChanged { stage, turn } => {
            println!("== {stage}");
            if let Some(name) = &turn.player_name {
                println!("   {name} to speak");
            }
            if *stage == Stage::Voting {
                println!("   /vote <player-id> to vote");
            }
        }
        RoomEvent::Finished(result) => {
            println!(
                "== {} (word {}, spy word {})",
                result.winner, result.answer_word, result.spy_word
            );
        }
        RoomEvent::Disconnected { will_retry, .. } => {
            if state.needs_manual_retry() {
                println!("== connection lost; /retry to rejoin");
            } else if *will_retry {
                println!("== connection lost; reconnecting");
            }
        }
        _ => {
            if let Some(entry) = state.log().last() {
                match &entry.kind {
                    LogKind::Chat {
                        player_name,
                        player_id,
                        message,
                    } => println!(
                        "{}: {message}",
                        player_name.as_deref().unwrap_or(player_id)
                    ),
                    LogKind::Join { player } => println!("-> {} joined", player.name),
                    LogKind::Vote {
                        voter_id,
                        target_id,
                        ..
                    } => println!("   {voter_id} voted for {target_id}"),
                    LogKind::Eliminated { player_id, .. } => println!("xx {player_id} is out"),
                    LogKind::System(notice) => println!("** {notice}"),
                    LogKind::Stage { .. } => {}
                }
            }
        }
    }
}
