//! Channel abstraction for message I/O.

pub mod channel;
pub mod cli;
pub mod manager;
pub mod onebot;

pub use channel::*;
pub use cli::{CliChannel, InboundLine, StdoutSender};
pub use manager::SenderManager;
pub use onebot::OneBotSender;
