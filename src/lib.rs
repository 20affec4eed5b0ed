//! Discord → QQ message bridge: routing and delivery core.

pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
