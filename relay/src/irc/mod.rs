pub mod connection;
pub mod error;
pub mod framer;
pub mod irc_parser;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod types;

pub use connection::{ConnectionManager, InboundSession};
pub use error::IrcError;
pub use scheduler::{BackoffPolicy, ReconnectScheduler};
pub use state::ConnectionState;
pub use types::{ChatStyle, ConnectionStatus, GameChat, GameSink};
