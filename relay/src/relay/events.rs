use serde::{Deserialize, Serialize};

/// Game team index as the host reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team(pub i32);

impl Team {
    pub const ROGUE: Team = Team(0);
    pub const RED: Team = Team(1);
    pub const GREEN: Team = Team(2);
    pub const BLUE: Team = Team(3);
    pub const PURPLE: Team = Team(4);
    pub const OBSERVER: Team = Team(5);
    pub const RABBIT: Team = Team(6);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub callsign: String,
    pub team: Team,
    pub ip_address: String,
}

impl PlayerRecord {
    pub fn new(callsign: impl Into<String>, team: Team, ip_address: impl Into<String>) -> Self {
        Self {
            callsign: callsign.into(),
            team,
            ip_address: ip_address.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatTarget {
    AllPlayers,
    Team(Team),
    Player(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessageKind {
    #[default]
    Chat,
    Action,
}

/// A chat line raised by the game. `from` is `None` for server-originated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub from: Option<PlayerRecord>,
    pub to: ChatTarget,
    pub text: String,
    pub kind: MessageKind,
}

impl ChatEvent {
    pub fn broadcast(from: PlayerRecord, text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            from: Some(from),
            to: ChatTarget::AllPlayers,
            text: text.into(),
            kind,
        }
    }

    /// Same event addressed to `to` instead of everyone.
    pub fn addressed_to(mut self, to: ChatTarget) -> Self {
        self.to = to;
        self
    }
}
