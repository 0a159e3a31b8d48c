use super::events::{ChatEvent, MessageKind, PlayerRecord, Team};
use crate::config::RelayConfig;
use crate::irc::irc_parser::{CMD_PRIVMSG, CTCP_ACTION_PREFIX, CTCP_DELIMITER};

pub const COLOR_RESET: &str = "\x0f";
/// Chat text the host uses as a liveness check. Never relayed.
pub const HEALTH_PROBE_TEXT: &str = "bzadminping";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamStyle {
    pub color: &'static str,
    pub role: &'static str,
}

const UNKNOWN_TEAM: TeamStyle = TeamStyle {
    color: COLOR_RESET,
    role: "player",
};

const TEAM_STYLES: [(Team, TeamStyle); 7] = [
    (Team::ROGUE, TeamStyle { color: "\x0307", role: "rogue" }),
    (Team::RED, TeamStyle { color: "\x0304", role: "red player" }),
    (Team::GREEN, TeamStyle { color: "\x0303", role: "green player" }),
    (Team::BLUE, TeamStyle { color: "\x0302", role: "blue player" }),
    (Team::PURPLE, TeamStyle { color: "\x0306", role: "purple player" }),
    (Team::OBSERVER, TeamStyle { color: "\x0310", role: "observer" }),
    (Team::RABBIT, TeamStyle { color: "\x0314", role: "rabbit" }),
];

impl Team {
    pub fn style(self) -> TeamStyle {
        TEAM_STYLES
            .iter()
            .find(|(team, _)| *team == self)
            .map(|(_, style)| *style)
            .unwrap_or(UNKNOWN_TEAM)
    }
}

/// Renders game events as `PRIVMSG #channel :...` lines.
#[derive(Debug, Clone)]
pub struct OutboundFormatter {
    channel: String,
    prefix: String,
}

impl OutboundFormatter {
    pub fn new(channel: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.channel.as_str(), config.prefix.as_str())
    }

    pub fn chat(&self, event: &ChatEvent) -> Option<String> {
        let speaker = event.from.as_ref()?;
        if event.text.starts_with('/') || event.text == HEALTH_PROBE_TEXT {
            return None;
        }

        let color = speaker.team.style().color;
        let body = match event.kind {
            MessageKind::Action => format!(
                "{}{}{}{} {}{}",
                CTCP_ACTION_PREFIX, self.prefix, color, speaker.callsign, event.text, CTCP_DELIMITER
            ),
            MessageKind::Chat => format!(
                "{}{}{}: {}{}",
                self.prefix, color, speaker.callsign, COLOR_RESET, event.text
            ),
        };
        Some(self.privmsg(&body))
    }

    pub fn join(&self, player: &PlayerRecord) -> Option<String> {
        let style = player.team.style();
        self.presence(
            player,
            &format!("joined as a {} from {}", style.role, player.ip_address),
        )
    }

    pub fn part(&self, player: &PlayerRecord) -> Option<String> {
        self.presence(player, "left the game")
    }

    // Empty callsigns are host health checks, not players.
    fn presence(&self, player: &PlayerRecord, what: &str) -> Option<String> {
        if player.callsign.is_empty() {
            return None;
        }
        let body = format!(
            "{}{}{}{} {}",
            self.prefix,
            player.team.style().color,
            player.callsign,
            COLOR_RESET,
            what
        );
        Some(self.privmsg(&body))
    }

    fn privmsg(&self, body: &str) -> String {
        format!("{} #{} :{}", CMD_PRIVMSG, self.channel, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::events::ChatTarget;

    fn formatter() -> OutboundFormatter {
        OutboundFormatter::new("chan", "")
    }

    #[test]
    fn red_chat_is_colored_and_reset() {
        let event = ChatEvent::broadcast(
            PlayerRecord::new("Alice", Team::RED, "1.2.3.4"),
            "hi",
            MessageKind::Chat,
        );
        assert_eq!(
            formatter().chat(&event).as_deref(),
            Some("PRIVMSG #chan :\x0304Alice: \x0fhi")
        );
    }

    #[test]
    fn prefix_precedes_color() {
        let event = ChatEvent::broadcast(
            PlayerRecord::new("Alice", Team::BLUE, "1.2.3.4"),
            "hi",
            MessageKind::Chat,
        );
        assert_eq!(
            OutboundFormatter::new("chan", "[league] ").chat(&event).as_deref(),
            Some("PRIVMSG #chan :[league] \x0302Alice: \x0fhi")
        );
    }

    #[test]
    fn action_chat_is_wrapped_in_ctcp() {
        let event = ChatEvent::broadcast(
            PlayerRecord::new("Bob", Team::GREEN, "1.2.3.4"),
            "waves",
            MessageKind::Action,
        );
        assert_eq!(
            formatter().chat(&event).as_deref(),
            Some("PRIVMSG #chan :\x01ACTION \x0303Bob waves\x01")
        );
    }

    #[test]
    fn commands_and_health_checks_are_suppressed() {
        let player = PlayerRecord::new("Alice", Team::RED, "1.2.3.4");
        for text in ["/kick bob", HEALTH_PROBE_TEXT, "/"] {
            let event = ChatEvent::broadcast(player.clone(), text, MessageKind::Chat);
            assert_eq!(formatter().chat(&event), None, "{:?} should be dropped", text);
        }
        let event = ChatEvent::broadcast(player, "bzadminping!", MessageKind::Chat);
        assert!(formatter().chat(&event).is_some());
    }

    #[test]
    fn team_and_private_chat_are_relayed_like_broadcasts() {
        let player = PlayerRecord::new("Alice", Team::RED, "1.2.3.4");
        let broadcast = ChatEvent::broadcast(player, "push left", MessageKind::Chat);
        let expected = formatter().chat(&broadcast);
        assert!(expected.is_some());

        for target in [ChatTarget::Team(Team::RED), ChatTarget::Player(3)] {
            let event = broadcast.clone().addressed_to(target);
            assert_eq!(formatter().chat(&event), expected, "{:?}", target);
        }
    }

    #[test]
    fn server_chat_is_not_relayed() {
        let event = ChatEvent {
            from: None,
            to: ChatTarget::AllPlayers,
            text: "Server restarting".into(),
            kind: MessageKind::Chat,
        };
        assert_eq!(formatter().chat(&event), None);
    }

    #[test]
    fn join_names_role_and_address() {
        let player = PlayerRecord::new("Obs", Team::OBSERVER, "10.0.0.1");
        assert_eq!(
            formatter().join(&player).as_deref(),
            Some("PRIVMSG #chan :\x0310Obs\x0f joined as a observer from 10.0.0.1")
        );
        let player = PlayerRecord::new("Pu", Team::PURPLE, "10.0.0.2");
        assert_eq!(
            formatter().join(&player).as_deref(),
            Some("PRIVMSG #chan :\x0306Pu\x0f joined as a purple player from 10.0.0.2")
        );
    }

    #[test]
    fn part_line() {
        let player = PlayerRecord::new("Rab", Team::RABBIT, "10.0.0.1");
        assert_eq!(
            formatter().part(&player).as_deref(),
            Some("PRIVMSG #chan :\x0314Rab\x0f left the game")
        );
    }

    #[test]
    fn empty_callsign_suppresses_presence() {
        let ghost = PlayerRecord::new("", Team::ROGUE, "127.0.0.1");
        assert_eq!(formatter().join(&ghost), None);
        assert_eq!(formatter().part(&ghost), None);
    }

    #[test]
    fn unknown_team_falls_back_to_reset() {
        let style = Team(42).style();
        assert_eq!(style.color, COLOR_RESET);
        assert_eq!(style.role, "player");
        assert_eq!(Team::ROGUE.style().role, "rogue");
    }
}
