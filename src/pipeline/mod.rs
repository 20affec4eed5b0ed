//! Forwarding pipeline.
//!
//! Every inbound event flows through:
//! 1. `normalize()`: raw platform event to `BridgeMessage`
//! 2. `BridgeProcessor` skip checks: empty content, automated senders
//! 3. `route()`: rule store snapshot to destinations
//! 4. `Dispatcher::deliver()`: format, truncate, compose, send per destination

pub mod dispatch;
pub mod format;
pub mod normalize;
pub mod processor;
pub mod router;
pub mod types;
