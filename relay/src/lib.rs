pub mod config;
pub mod error;
pub mod irc;
pub mod relay;
