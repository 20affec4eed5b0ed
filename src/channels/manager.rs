//! Sender manager: routes sends to the adapter named in the address.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::channels::MessageSender;
use crate::error::ChannelError;
use crate::pipeline::types::{ContentPart, SessionAddress};

/// Registry of outbound adapters, itself usable as a [`MessageSender`].
#[derive(Default)]
pub struct SenderManager {
    adapters: HashMap<String, Arc<dyn MessageSender>>,
}

impl SenderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name, replacing any previous one.
    pub fn add(&mut self, sender: Arc<dyn MessageSender>) {
        self.adapters.insert(sender.name().to_string(), sender);
    }

    /// Register an adapter under an explicit name.
    pub fn add_as(&mut self, name: &str, sender: Arc<dyn MessageSender>) {
        self.adapters.insert(name.to_string(), sender);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MessageSender>> {
        self.adapters.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl MessageSender for SenderManager {
    fn name(&self) -> &str {
        "manager"
    }

    async fn send(&self, address: &str, parts: &[ContentPart]) -> Result<(), ChannelError> {
        let parsed = SessionAddress::parse(address)
            .ok_or_else(|| ChannelError::InvalidAddress(address.to_string()))?;
        let adapter = self
            .adapters
            .get(&parsed.adapter_name)
            .ok_or_else(|| ChannelError::UnknownAdapter {
                name: parsed.adapter_name.clone(),
            })?;
        debug!(address, adapter = %parsed.adapter_name, parts = parts.len(), "Dispatching to adapter");
        adapter.send(address, parts).await
    }
}
