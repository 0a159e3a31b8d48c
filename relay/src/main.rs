// src/main.rs

use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use irc_relay::config::{MemoryStore, SettingsStore, load_settings};
use irc_relay::error::Result as AppResult;
use irc_relay::irc::{GameChat, GameSink};
use irc_relay::relay::{Bridge, ChatEvent, ChatTarget, MessageKind, PlayerRecord, Team};

/// Prints chat relayed from IRC, standing in for the game's message broadcast.
struct ConsoleSink;

impl GameSink for ConsoleSink {
    fn deliver(&self, chat: GameChat) {
        println!("[{}] {}", chat.received_at.format("%H:%M:%S"), chat.rendered());
    }
}

enum ConsoleCommand {
    Say(String),
    Me(String),
    TeamSay(String),
    Whisper(i32, String),
    Join(PlayerRecord),
    Part(String),
    Set(String, String),
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(ConsoleCommand::Say(line.to_string()));
    };

    let (verb, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let command = match verb {
        "quit" => ConsoleCommand::Quit,
        "me" => ConsoleCommand::Me(args.to_string()),
        "team" => ConsoleCommand::TeamSay(args.to_string()),
        "msg" => match args.split_once(' ').map(|(id, text)| (id.parse::<i32>(), text)) {
            Some((Ok(id), text)) => ConsoleCommand::Whisper(id, text.to_string()),
            _ => ConsoleCommand::Unknown(line.to_string()),
        },
        "part" => ConsoleCommand::Part(args.trim().to_string()),
        "set" => match args.split_once(' ') {
            Some((key, value)) => ConsoleCommand::Set(key.to_string(), value.to_string()),
            None => ConsoleCommand::Set(args.to_string(), String::new()),
        },
        "join" => {
            let mut parts = args.split_whitespace();
            match (parts.next(), parts.next().map(str::parse::<i32>), parts.next()) {
                (Some(callsign), Some(Ok(team)), Some(ip)) => {
                    ConsoleCommand::Join(PlayerRecord::new(callsign, Team(team), ip))
                }
                _ => ConsoleCommand::Unknown(line.to_string()),
            }
        }
        _ => ConsoleCommand::Unknown(line.to_string()),
    };
    Some(command)
}

#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{}=info", env!("CARGO_CRATE_NAME")).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let app_settings = load_settings()?;
    tracing::info!(
        irc.server = %app_settings.irc.address,
        irc.channel = %app_settings.irc.channel,
        "Configuration loaded"
    );

    let store = Arc::new(app_settings.to_store());
    let console = PlayerRecord::new(
        app_settings.console.callsign.as_str(),
        Team(app_settings.console.team),
        "127.0.0.1",
    );

    let bridge = Bridge::start(store.clone() as Arc<dyn SettingsStore>, Arc::new(ConsoleSink));
    tracing::info!("IRC relay started, type to chat or /quit to exit");

    run_console(&bridge, &store, &console).await?;

    bridge.cleanup().await;
    tracing::info!("IRC relay shut down");
    Ok(())
}

async fn run_console(bridge: &Bridge, store: &MemoryStore, console: &PlayerRecord) -> AppResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut players: HashMap<String, PlayerRecord> = HashMap::new();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl-C received, shutting down");
                return Ok(());
            }
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => return Ok(()),
            },
        };

        match parse_command(&line) {
            None => {}
            Some(ConsoleCommand::Quit) => return Ok(()),
            Some(ConsoleCommand::Say(text)) => {
                bridge
                    .on_chat(&ChatEvent::broadcast(console.clone(), text, MessageKind::Chat))
                    .await;
            }
            Some(ConsoleCommand::Me(text)) => {
                bridge
                    .on_chat(&ChatEvent::broadcast(console.clone(), text, MessageKind::Action))
                    .await;
            }
            Some(ConsoleCommand::TeamSay(text)) => {
                let event = ChatEvent::broadcast(console.clone(), text, MessageKind::Chat)
                    .addressed_to(ChatTarget::Team(console.team));
                bridge.on_chat(&event).await;
            }
            Some(ConsoleCommand::Whisper(id, text)) => {
                let event = ChatEvent::broadcast(console.clone(), text, MessageKind::Chat)
                    .addressed_to(ChatTarget::Player(id));
                bridge.on_chat(&event).await;
            }
            Some(ConsoleCommand::Join(player)) => {
                bridge.on_player_join(&player).await;
                players.insert(player.callsign.clone(), player);
            }
            Some(ConsoleCommand::Part(callsign)) => {
                let player = players
                    .remove(&callsign)
                    .unwrap_or_else(|| PlayerRecord::new(callsign, Team::OBSERVER, ""));
                bridge.on_player_part(&player).await;
            }
            Some(ConsoleCommand::Set(key, value)) => {
                store.set(&key, value.as_str());
                bridge.on_config_changed(&key, &value).await;
            }
            Some(ConsoleCommand::Unknown(line)) => {
                tracing::warn!(input = %line, "Unknown console command");
            }
        }
    }
}
