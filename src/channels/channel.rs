//! Outbound send interface.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::pipeline::types::ContentPart;

/// Delivers an ordered part sequence to a destination address of the form
/// `adapterName:GroupMessage:groupId`.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Adapter name, as used in destination addresses.
    fn name(&self) -> &str;

    /// Send `parts` to `address`, preserving their order.
    async fn send(&self, address: &str, parts: &[ContentPart]) -> Result<(), ChannelError>;
}
