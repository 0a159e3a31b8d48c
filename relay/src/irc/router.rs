use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use super::irc_parser::{CMD_PING, CMD_PONG, CMD_PRIVMSG, IrcMessage, strip_ctcp_action};
use super::types::{ChatStyle, GameChat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteAction {
    /// Keepalive reply, already formatted as `PONG <token>`.
    Pong(String),
    Forward(GameChatLine),
    Ignored { nick: String },
}

/// Chat routed towards the game, before it is timestamped for the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameChatLine {
    pub nick: String,
    pub text: String,
    pub style: ChatStyle,
}

impl GameChatLine {
    pub fn into_game_chat(self) -> GameChat {
        GameChat {
            sender_nick: self.nick,
            text: self.text,
            style: self.style,
            received_at: Utc::now(),
        }
    }
}

/// Decides what a single inbound line means for the bridge.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    ignored_nicks: Arc<HashSet<String>>,
}

impl MessageRouter {
    pub fn new(ignored_nicks: Arc<HashSet<String>>) -> Self {
        Self { ignored_nicks }
    }

    /// Actions for one line, keepalive first.
    pub fn route(&self, line: &str) -> Vec<RouteAction> {
        let mut actions = Vec::new();

        if let Some(rest) = line
            .strip_prefix(CMD_PING)
            .filter(|rest| rest.is_empty() || rest.starts_with(' '))
        {
            let token = rest.strip_prefix(' ').unwrap_or(rest);
            let pong = if token.is_empty() {
                CMD_PONG.to_string()
            } else {
                format!("{} {}", CMD_PONG, token)
            };
            actions.push(RouteAction::Pong(pong));
        }

        let message = IrcMessage::parse(line);
        if message.mentions_command(CMD_PRIVMSG) {
            actions.push(self.route_privmsg(&message));
        }

        actions
    }

    fn route_privmsg(&self, message: &IrcMessage<'_>) -> RouteAction {
        let (nick, body) = match (message.prefix_nick(), message.privmsg_text()) {
            (Some(nick), Some(body)) => (nick, body),
            _ => {
                tracing::debug!(
                    raw_line = %message.raw(),
                    "PRIVMSG without nick or trailing text, forwarding raw line"
                );
                ("", message.raw())
            }
        };

        if self.ignored_nicks.contains(nick) {
            tracing::debug!(irc.nick = %nick, "Dropping message from ignored nick");
            return RouteAction::Ignored {
                nick: nick.to_string(),
            };
        }

        let (text, style) = match strip_ctcp_action(body) {
            Some(action) => (action, ChatStyle::Action),
            None => (body, ChatStyle::Plain),
        };

        RouteAction::Forward(GameChatLine {
            nick: nick.to_string(),
            text: text.to_string(),
            style,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_ignoring(nicks: &[&str]) -> MessageRouter {
        MessageRouter::new(Arc::new(nicks.iter().map(|n| n.to_string()).collect()))
    }

    fn forwarded(actions: &[RouteAction]) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                RouteAction::Forward(line) => Some(line.clone().into_game_chat().rendered()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn plain_privmsg_is_forwarded() {
        let actions = router_ignoring(&[]).route(":nick!user@host PRIVMSG #chan :hello");
        assert_eq!(forwarded(&actions), vec!["nick: hello"]);
    }

    #[test]
    fn ping_gets_pong_with_same_token() {
        let actions = router_ignoring(&[]).route("PING :server123");
        assert_eq!(actions, vec![RouteAction::Pong("PONG :server123".into())]);
    }

    #[test]
    fn bare_ping_gets_bare_pong() {
        let actions = router_ignoring(&[]).route("PING");
        assert_eq!(actions, vec![RouteAction::Pong("PONG".into())]);
    }

    #[test]
    fn ignored_nicks_never_forwarded() {
        let router = router_ignoring(&["bob", "carol"]);
        for nick in ["bob", "carol"] {
            let line = format!(":{nick}!u@h PRIVMSG #chan :spam");
            let actions = router.route(&line);
            assert!(forwarded(&actions).is_empty());
            assert_eq!(
                actions,
                vec![RouteAction::Ignored {
                    nick: nick.to_string()
                }]
            );
        }
    }

    #[test]
    fn ignore_is_case_sensitive() {
        let actions = router_ignoring(&["bob"]).route(":Bob!u@h PRIVMSG #chan :hi");
        assert_eq!(forwarded(&actions), vec!["Bob: hi"]);
    }

    #[test]
    fn ctcp_action_is_forwarded_as_action() {
        let actions = router_ignoring(&[]).route(":ann!u@h PRIVMSG #chan :\x01ACTION waves\x01");
        match &actions[..] {
            [RouteAction::Forward(line)] => {
                assert_eq!(line.style, ChatStyle::Action);
                assert_eq!(line.clone().into_game_chat().rendered(), "ann waves");
            }
            other => panic!("unexpected actions: {:?}", other),
        }
    }

    #[test]
    fn malformed_privmsg_falls_back_to_raw_line() {
        let actions = router_ignoring(&[]).route("garbage PRIVMSG without delimiters");
        assert_eq!(
            forwarded(&actions),
            vec!["garbage PRIVMSG without delimiters"]
        );
    }

    #[test]
    fn server_privmsg_without_bang_falls_back() {
        let actions = router_ignoring(&[]).route(":irc.example.org PRIVMSG #chan :maintenance");
        assert_eq!(
            forwarded(&actions),
            vec![":irc.example.org PRIVMSG #chan :maintenance"]
        );
    }

    #[test]
    fn unrelated_lines_produce_nothing() {
        let router = router_ignoring(&[]);
        assert!(router.route(":srv 001 relay :Welcome").is_empty());
        assert!(router.route(":srv NOTICE * :Looking up your hostname").is_empty());
        assert!(router.route(":x!y@z JOIN #chan").is_empty());
        assert!(router.route("PINGER :not a keepalive").is_empty());
    }

    #[test]
    fn pong_comes_before_chat_on_same_line() {
        let actions = router_ignoring(&[]).route("PING :tok PRIVMSG");
        assert!(matches!(actions.first(), Some(RouteAction::Pong(p)) if p == "PONG :tok PRIVMSG"));
    }
}
