pub const CMD_PASS: &str = "PASS";
pub const CMD_NICK: &str = "NICK";
pub const CMD_USER: &str = "USER";
pub const CMD_JOIN: &str = "JOIN";
pub const CMD_PING: &str = "PING";
pub const CMD_PONG: &str = "PONG";
pub const CMD_PRIVMSG: &str = "PRIVMSG";
pub const CMD_NOTICE: &str = "NOTICE";
pub const RPL_WELCOME: &str = "001";
pub const RPL_LOGGEDIN: &str = "900";
pub const ERR_SASLFAIL: &str = "904";

pub const CTCP_DELIMITER: char = '\x01';
pub const CTCP_ACTION_PREFIX: &str = "\x01ACTION ";

#[derive(Debug, Default)]
pub struct IrcMessage<'a> {
    raw: &'a str,
    tags: Option<&'a str>,
    prefix: Option<&'a str>,
    command: Option<&'a str>,
    params: Vec<&'a str>,
}

impl<'a> IrcMessage<'a> {
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn command(&self) -> Option<&'a str> {
        self.command
    }

    /// Raw IRCv3 tag section without the leading `@`.
    pub fn tags(&self) -> Option<&'a str> {
        self.tags
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.prefix
    }

    pub fn params(&self) -> &[&'a str] {
        &self.params
    }

    pub fn parse(line: &'a str) -> Self {
        let mut message = IrcMessage {
            raw: line,
            ..Default::default()
        };
        let mut remainder = line.trim_end_matches(['\r', '\n']);

        if let Some(stripped) = remainder.strip_prefix('@') {
            match stripped.split_once(' ') {
                Some((tags, rest)) => {
                    message.tags = Some(tags);
                    remainder = rest;
                }
                None => {
                    message.tags = Some(stripped);
                    return message;
                }
            }
        }
        if let Some(stripped) = remainder.strip_prefix(':') {
            match stripped.split_once(' ') {
                Some((prefix, rest)) => {
                    message.prefix = Some(prefix);
                    remainder = rest;
                }
                None => {
                    message.prefix = Some(stripped);
                    return message;
                }
            }
        }
        let (head, trailing) = match remainder.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (remainder, None),
        };
        let mut parts = head.split(' ').filter(|s| !s.is_empty());
        message.command = parts.next();
        message.params.extend(parts);
        if let Some(trailing) = trailing {
            message.params.push(trailing);
        }
        message
    }

    /// Nickname part of a `nick!user@host` prefix. `None` when the prefix is
    /// absent or carries no `!` (server-originated lines).
    pub fn prefix_nick(&self) -> Option<&'a str> {
        self.prefix
            .and_then(|p| p.split_once('!'))
            .map(|(nick, _)| nick)
            .filter(|nick| !nick.is_empty())
    }

    /// Bare nickname or server name of the prefix, with or without `!user@host`.
    pub fn prefix_name(&self) -> Option<&'a str> {
        self.prefix.and_then(|p| p.split('!').next())
    }

    /// Trailing text of a PRIVMSG, only when the line had a real `:` trailing marker.
    pub fn privmsg_text(&self) -> Option<&'a str> {
        if self.command != Some(CMD_PRIVMSG) || self.params.len() < 2 {
            return None;
        }
        let text = self.params.last().copied()?;
        let has_trailing_marker = self
            .raw
            .trim_end_matches(['\r', '\n'])
            .ends_with(&format!(" :{}", text));
        has_trailing_marker.then_some(text)
    }

    pub fn mentions_command(&self, command: &str) -> bool {
        self.command == Some(command) || self.raw.split(' ').any(|token| token == command)
    }
}

/// Strips a CTCP ACTION wrapper, returning the action text.
pub fn strip_ctcp_action(text: &str) -> Option<&str> {
    let inner = text.strip_prefix(CTCP_ACTION_PREFIX)?;
    Some(inner.strip_suffix(CTCP_DELIMITER).unwrap_or(inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_privmsg() {
        let msg = IrcMessage::parse(":nick!user@host PRIVMSG #chan :hello there\r\n");
        assert_eq!(msg.prefix(), Some("nick!user@host"));
        assert_eq!(msg.command(), Some("PRIVMSG"));
        assert_eq!(msg.params(), &["#chan", "hello there"]);
        assert_eq!(msg.prefix_nick(), Some("nick"));
        assert_eq!(msg.privmsg_text(), Some("hello there"));
    }

    #[test]
    fn parses_tags_before_prefix() {
        let msg = IrcMessage::parse("@time=2024-01-01T00:00:00Z :a!b@c PRIVMSG #x :hi");
        assert_eq!(msg.tags(), Some("time=2024-01-01T00:00:00Z"));
        assert_eq!(msg.prefix_nick(), Some("a"));
        assert_eq!(msg.privmsg_text(), Some("hi"));
    }

    #[test]
    fn trailing_with_colons_is_kept_whole() {
        let msg = IrcMessage::parse(":n!u@h PRIVMSG #c :time is 12:30: ok");
        assert_eq!(msg.privmsg_text(), Some("time is 12:30: ok"));
    }

    #[test]
    fn server_prefix_has_no_nick() {
        let msg = IrcMessage::parse(":irc.example.org PRIVMSG #c :notice");
        assert_eq!(msg.prefix_nick(), None);
        assert_eq!(msg.prefix_name(), Some("irc.example.org"));
    }

    #[test]
    fn privmsg_without_trailing_marker_has_no_text() {
        let msg = IrcMessage::parse(":n!u@h PRIVMSG #c word");
        assert_eq!(msg.privmsg_text(), None);
    }

    #[test]
    fn ping_params() {
        let msg = IrcMessage::parse("PING :server123");
        assert_eq!(msg.command(), Some(CMD_PING));
        assert_eq!(msg.params(), &["server123"]);
    }

    #[test]
    fn degenerate_lines_never_panic() {
        for line in ["", ":", "@", ": ", "@tag", "::", " :", "PRIVMSG", ":x PRIVMSG"] {
            let msg = IrcMessage::parse(line);
            let _ = msg.prefix_nick();
            let _ = msg.privmsg_text();
        }
    }

    #[test]
    fn strips_action_wrapper() {
        assert_eq!(strip_ctcp_action("\x01ACTION waves\x01"), Some("waves"));
        assert_eq!(strip_ctcp_action("\x01ACTION waves"), Some("waves"));
        assert_eq!(strip_ctcp_action("waves"), None);
        assert_eq!(strip_ctcp_action("\x01VERSION\x01"), None);
    }
}
