use crate::error::{ConfigError, Result as AppResult};
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

pub const KEY_ADDRESS: &str = "_ircAddress";
pub const KEY_PORT: &str = "_ircPort";
pub const KEY_CHANNEL: &str = "_ircChannel";
pub const KEY_NICK: &str = "_ircNick";
pub const KEY_PASS: &str = "_ircPass";
pub const KEY_AUTH_TYPE: &str = "_ircAuthType";
pub const KEY_AUTH_PASS: &str = "_ircAuthPass";
pub const KEY_IGNORE: &str = "_ircIgnore";
pub const KEY_PREFIX: &str = "_ircPrefix";

pub const DEFAULT_PORT: u16 = 6667;

/// Keys whose change forces the live connection down so the next attempt
/// picks up the new values.
pub fn requires_reconnect(key: &str) -> bool {
    matches!(
        key,
        KEY_ADDRESS | KEY_PORT | KEY_CHANNEL | KEY_PASS | KEY_AUTH_TYPE | KEY_AUTH_PASS
    )
}

/// Host-owned configuration variables, read as point-in-time strings.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    None,
    AuthServ,
    NickServ,
    Q,
}

impl AuthType {
    /// Service nick and command verb used for the login PRIVMSG.
    pub fn service(self) -> Option<(&'static str, &'static str)> {
        match self {
            AuthType::None => None,
            AuthType::AuthServ => Some(("AuthServ", "AUTH")),
            AuthType::NickServ => Some(("NickServ", "IDENTIFY")),
            AuthType::Q => Some(("Q@CServe.quakenet.org", "AUTH")),
        }
    }
}

impl FromStr for AuthType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(AuthType::None),
            "authserv" => Ok(AuthType::AuthServ),
            "nickserv" => Ok(AuthType::NickServ),
            "q" => Ok(AuthType::Q),
            other => Err(ConfigError::InvalidValue(format!(
                "{} must be one of none, authserv, nickserv, q (got '{}')",
                KEY_AUTH_TYPE, other
            ))),
        }
    }
}

/// Immutable snapshot of everything one connection attempt needs.
#[derive(Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub address: String,
    pub port: u16,
    pub channel: String,
    pub nick: String,
    pub pass: Option<String>,
    pub auth_type: AuthType,
    pub auth_pass: Option<String>,
    pub prefix: String,
    pub ignored_nicks: Arc<HashSet<String>>,
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("channel", &self.channel)
            .field("nick", &self.nick)
            .field("pass", &self.pass.as_ref().map(|_| "<redacted>"))
            .field("auth_type", &self.auth_type)
            .field("auth_pass", &self.auth_pass.as_ref().map(|_| "<redacted>"))
            .field("prefix", &self.prefix)
            .field("ignored_nicks", &self.ignored_nicks)
            .finish()
    }
}

impl RelayConfig {
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, ConfigError> {
        let required = |key: &str| -> Result<String, ConfigError> {
            store
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::Missing(key.to_string()))
        };
        let optional = |key: &str| -> Option<String> {
            store
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let address = required(KEY_ADDRESS)?;
        let channel = required(KEY_CHANNEL)?
            .trim_start_matches('#')
            .to_string();
        if channel.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "{} must name a channel",
                KEY_CHANNEL
            )));
        }
        let nick = required(KEY_NICK)?;

        let port = match optional(KEY_PORT) {
            Some(raw) => raw.parse::<u16>().ok().filter(|p| *p != 0).ok_or_else(|| {
                ConfigError::InvalidValue(format!("{} is not a valid port: '{}'", KEY_PORT, raw))
            })?,
            None => DEFAULT_PORT,
        };

        let auth_type = optional(KEY_AUTH_TYPE)
            .map(|raw| raw.parse::<AuthType>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            address,
            port,
            channel,
            nick,
            pass: optional(KEY_PASS),
            auth_type,
            auth_pass: optional(KEY_AUTH_PASS),
            prefix: store.get(KEY_PREFIX).unwrap_or_default(),
            ignored_nicks: Arc::new(parse_ignore_list(
                &store.get(KEY_IGNORE).unwrap_or_default(),
            )),
        })
    }

    pub fn server_label(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

pub fn parse_ignore_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|nick| !nick.is_empty())
        .map(str::to_string)
        .collect()
}

/// Settings store backed by an in-memory map, used by the console host.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.into());
        }
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IrcSettings {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub auth_pass: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_list")]
    pub ignore: Vec<String>,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_console_callsign")]
    pub callsign: String,
    #[serde(default)]
    pub team: i32,
}

fn default_console_callsign() -> String {
    "console".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub irc: IrcSettings,
    #[serde(default)]
    pub console: ConsoleSettings,
}

impl AppSettings {
    /// Seeds a host store with the loaded values, keyed like the host's variables.
    pub fn to_store(&self) -> MemoryStore {
        let store = MemoryStore::new();
        let irc = &self.irc;
        store.set(KEY_ADDRESS, irc.address.as_str());
        store.set(
            KEY_PORT,
            irc.port.unwrap_or(DEFAULT_PORT).to_string(),
        );
        store.set(KEY_CHANNEL, irc.channel.as_str());
        store.set(KEY_NICK, irc.nick.as_str());
        store.set(KEY_PASS, irc.pass.clone().unwrap_or_default());
        store.set(KEY_AUTH_TYPE, irc.auth_type.clone().unwrap_or_default());
        store.set(KEY_AUTH_PASS, irc.auth_pass.clone().unwrap_or_default());
        store.set(KEY_IGNORE, irc.ignore.join(","));
        store.set(KEY_PREFIX, irc.prefix.as_str());
        store
    }
}

pub fn load_settings() -> AppResult<AppSettings> {
    let settings = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("IRCRELAY")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()).into())
}

fn deserialize_string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(parse_ignore_list(&s).into_iter().collect()),
        Value::Array(arr) => arr
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                _ => Err(D::Error::custom("Array must contain only strings")),
            })
            .filter(|item| !matches!(item, Ok(s) if s.is_empty()))
            .collect(),
        _ => Err(D::Error::custom("Expected string or array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(pairs: &[(&str, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (key, value) in pairs {
            store.set(key, *value);
        }
        store
    }

    fn minimal() -> MemoryStore {
        store_with(&[
            (KEY_ADDRESS, "irc.example.org"),
            (KEY_CHANNEL, "bzflag"),
            (KEY_NICK, "relay"),
        ])
    }

    #[test]
    fn minimal_store_uses_defaults() {
        let config = RelayConfig::from_store(&minimal()).expect("config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.auth_type, AuthType::None);
        assert_eq!(config.pass, None);
        assert!(config.ignored_nicks.is_empty());
        assert_eq!(config.prefix, "");
    }

    #[test]
    fn missing_required_keys_are_reported() {
        for key in [KEY_ADDRESS, KEY_CHANNEL, KEY_NICK] {
            let store = minimal();
            store.set(key, "   ");
            match RelayConfig::from_store(&store) {
                Err(ConfigError::Missing(missing)) => assert_eq!(missing, key),
                other => panic!("expected Missing({}), got {:?}", key, other),
            }
        }
    }

    #[test]
    fn channel_hash_is_stripped() {
        let store = minimal();
        store.set(KEY_CHANNEL, "#bzflag");
        let config = RelayConfig::from_store(&store).expect("config");
        assert_eq!(config.channel, "bzflag");
    }

    #[test]
    fn bad_port_and_auth_type_are_invalid() {
        let store = minimal();
        store.set(KEY_PORT, "notaport");
        assert!(matches!(
            RelayConfig::from_store(&store),
            Err(ConfigError::InvalidValue(_))
        ));

        let store = minimal();
        store.set(KEY_AUTH_TYPE, "kerberos");
        assert!(matches!(
            RelayConfig::from_store(&store),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn auth_and_ignore_are_parsed() {
        let store = minimal();
        store.set(KEY_PORT, "6697");
        store.set(KEY_AUTH_TYPE, "NickServ");
        store.set(KEY_AUTH_PASS, "hunter2");
        store.set(KEY_IGNORE, "bob, carol,,Bob ");
        let config = RelayConfig::from_store(&store).expect("config");
        assert_eq!(config.port, 6697);
        assert_eq!(config.auth_type, AuthType::NickServ);
        assert_eq!(config.auth_pass.as_deref(), Some("hunter2"));
        let expected: HashSet<String> = ["bob", "carol", "Bob"].iter().map(|s| s.to_string()).collect();
        assert_eq!(*config.ignored_nicks, expected);
    }

    #[test]
    fn debug_output_redacts_passwords() {
        let store = minimal();
        store.set(KEY_PASS, "serverpass");
        store.set(KEY_AUTH_PASS, "authpass");
        let rendered = format!("{:?}", RelayConfig::from_store(&store).expect("config"));
        assert!(!rendered.contains("serverpass"));
        assert!(!rendered.contains("authpass"));
    }

    #[test]
    fn reconnect_keys() {
        assert!(requires_reconnect(KEY_ADDRESS));
        assert!(requires_reconnect(KEY_AUTH_PASS));
        assert!(!requires_reconnect(KEY_NICK));
        assert!(!requires_reconnect(KEY_PREFIX));
        assert!(!requires_reconnect(KEY_IGNORE));
    }

    #[test]
    fn auth_services() {
        assert_eq!(AuthType::None.service(), None);
        assert_eq!(AuthType::Q.service(), Some(("Q@CServe.quakenet.org", "AUTH")));
    }

    #[test]
    fn settings_seed_store() {
        let settings = AppSettings {
            irc: IrcSettings {
                address: "10.0.0.1".into(),
                channel: "#league".into(),
                nick: "ref".into(),
                ignore: vec!["spam".into()],
                ..Default::default()
            },
            console: ConsoleSettings::default(),
        };
        let config = RelayConfig::from_store(&settings.to_store()).expect("config");
        assert_eq!(config.address, "10.0.0.1");
        assert_eq!(config.channel, "league");
        assert!(config.ignored_nicks.contains("spam"));
    }

    #[test]
    fn ignore_list_deserializes_from_string_or_array() {
        let from_string: IrcSettings =
            serde_json::from_str(r#"{"ignore": "a, b"}"#).expect("string form");
        assert_eq!(from_string.ignore.len(), 2);
        let from_array: IrcSettings =
            serde_json::from_str(r#"{"ignore": ["a", " ", "c"]}"#).expect("array form");
        assert_eq!(from_array.ignore, vec!["a".to_string(), "c".to_string()]);
    }
}
