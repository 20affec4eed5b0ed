//! Shared types for the forwarding pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

// ── Inbound event ───────────────────────────────────────────────────

/// Raw event as handed over by the host framework.
///
/// `raw_message` is the platform-native payload; its shape is only known
/// once `platform` has been checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    /// Platform tag, e.g. "discord".
    pub platform: String,
    /// Plain-text rendering of the message, if the framework provides one.
    #[serde(default)]
    pub message_str: Option<String>,
    /// Platform-native payload.
    #[serde(default)]
    pub raw_message: Option<serde_json::Value>,
}

/// Platform identifiers arrive either as JSON strings or numbers; both are
/// kept as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

/// Deserialize an optional id that may be encoded as a string or a number.
pub(crate) fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let repr = Option::<IdRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| match r {
        IdRepr::Text(s) => s,
        IdRepr::Unsigned(n) => n.to_string(),
        IdRepr::Signed(n) => n.to_string(),
    }))
}

// ── Normalized message ──────────────────────────────────────────────

/// Canonical message produced by the normalizer. One per inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeMessage {
    /// Message body. The only field used for emptiness checks.
    pub content: String,
    pub author_name: String,
    pub source_group_name: String,
    pub source_channel_name: String,
    pub source_group_id: Option<String>,
    pub source_channel_id: Option<String>,
    /// Rendered as `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// Attachment URLs in source order.
    pub attachments: Vec<String>,
    /// Sent by a bot or service account.
    pub is_automated: bool,
}

impl BridgeMessage {
    /// True when the content is empty after trimming whitespace.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

// ── Destinations ────────────────────────────────────────────────────

/// A destination group plus the adapter that delivers to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub destination_group_id: String,
    pub adapter_name: String,
}

impl Destination {
    pub fn new(destination_group_id: impl Into<String>, adapter_name: impl Into<String>) -> Self {
        Self {
            destination_group_id: destination_group_id.into(),
            adapter_name: adapter_name.into(),
        }
    }

    /// Composite address handed to the send interface.
    pub fn address(&self) -> SessionAddress {
        SessionAddress {
            adapter_name: self.adapter_name.clone(),
            message_type: GROUP_MESSAGE.to_string(),
            target_id: self.destination_group_id.clone(),
        }
    }
}

/// Message type segment used for group destinations.
pub const GROUP_MESSAGE: &str = "GroupMessage";

/// `adapterName:MessageType:targetId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionAddress {
    pub adapter_name: String,
    pub message_type: String,
    pub target_id: String,
}

impl SessionAddress {
    /// Parse an address string. The target id may itself contain `:`.
    pub fn parse(address: &str) -> Option<Self> {
        let mut parts = address.splitn(3, ':');
        let adapter_name = parts.next().filter(|s| !s.is_empty())?;
        let message_type = parts.next().filter(|s| !s.is_empty())?;
        let target_id = parts.next().filter(|s| !s.is_empty())?;
        Some(Self {
            adapter_name: adapter_name.to_string(),
            message_type: message_type.to_string(),
            target_id: target_id.to_string(),
        })
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.adapter_name, self.message_type, self.target_id
        )
    }
}

// ── Outbound parts ──────────────────────────────────────────────────

/// One element of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }
}

// ── Delivery results ────────────────────────────────────────────────

/// Result of delivering to a single destination.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub destination: Destination,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of one forwarded event.
#[derive(Debug)]
pub struct ForwardReport {
    pub message: BridgeMessage,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl ForwardReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}
