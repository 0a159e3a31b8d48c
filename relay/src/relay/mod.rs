pub mod bridge;
pub mod events;
pub mod formatter;

pub use bridge::Bridge;
pub use events::{ChatEvent, ChatTarget, MessageKind, PlayerRecord, Team};
pub use formatter::OutboundFormatter;
