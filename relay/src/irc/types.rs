use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Handshaking,
    Authenticating,
    Joining,
    Joined,
    Stopped,
}

impl ConnectionStatus {
    /// True in every state where a socket handle may be live.
    pub fn has_handle(self) -> bool {
        !matches!(
            self,
            ConnectionStatus::Disconnected | ConnectionStatus::Stopped
        )
    }

    pub fn is_stopped(self) -> bool {
        self == ConnectionStatus::Stopped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatStyle {
    Plain,
    Action,
}

/// One line of IRC channel chat on its way into the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameChat {
    pub sender_nick: String,
    pub text: String,
    pub style: ChatStyle,
    pub received_at: DateTime<Utc>,
}

impl GameChat {
    /// The line as the game shows it: `nick: text` for chat, `nick text` for actions.
    pub fn rendered(&self) -> String {
        match (self.style, self.sender_nick.is_empty()) {
            (_, true) => self.text.clone(),
            (ChatStyle::Plain, false) => format!("{}: {}", self.sender_nick, self.text),
            (ChatStyle::Action, false) => format!("{} {}", self.sender_nick, self.text),
        }
    }
}

/// Host side receiving chat relayed from the IRC channel.
pub trait GameSink: Send + Sync {
    fn deliver(&self, chat: GameChat);
}
