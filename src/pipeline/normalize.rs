//! Message normalizer: raw platform events into [`BridgeMessage`].
//!
//! The raw payload is parsed into a typed [`SourcePayload`] up front; every
//! field the bridge reads is optional there, so a sparse payload (a DM with
//! no guild, an author without a display name) still normalizes. Anything
//! that cannot be parsed at all is a silent skip.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::pipeline::types::{BridgeMessage, RawEvent, deserialize_optional_id};

/// Display format for message timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset-less layouts accepted for source timestamps, after RFC 3339.
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Shown as the guild name for direct messages.
pub const PRIVATE_GUILD_NAME: &str = "private";
/// Shown when a guild is present but carries no name.
pub const UNKNOWN_GUILD_NAME: &str = "unknown-guild";
pub const UNKNOWN_CHANNEL_NAME: &str = "unknown-channel";
pub const UNKNOWN_USER_NAME: &str = "unknown-user";

/// Platform-native payload, one variant per supported source platform.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    Discord(DiscordMessage),
}

impl SourcePayload {
    /// Parse the payload for `platform`. Unsupported platforms and
    /// malformed payloads yield `None`.
    pub fn parse(platform: &str, raw: &serde_json::Value) -> Option<Self> {
        match platform {
            "discord" => match DiscordMessage::deserialize(raw) {
                Ok(msg) => Some(Self::Discord(msg)),
                Err(e) => {
                    debug!(error = %e, "Discord payload did not parse");
                    None
                }
            },
            other => {
                debug!(platform = other, "No payload parser for platform");
                None
            }
        }
    }
}

/// The subset of a Discord message object the bridge reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub guild: Option<DiscordGuild>,
    #[serde(default)]
    pub channel: Option<DiscordChannel>,
    #[serde(default)]
    pub author: Option<DiscordAuthor>,
    /// Kept raw so an unparseable time falls back instead of failing the
    /// whole payload.
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default)]
    pub attachments: Option<Vec<DiscordAttachment>>,
}

impl DiscordMessage {
    /// Wall time of the first readable creation field, as written at its
    /// own offset.
    fn created_time(&self) -> Option<NaiveDateTime> {
        [&self.created_at, &self.timestamp]
            .into_iter()
            .flatten()
            .find_map(|value| {
                let parsed = value.as_str().and_then(parse_source_time);
                if parsed.is_none() {
                    debug!(value = %value, "Unreadable message timestamp");
                }
                parsed
            })
    }
}

/// Parse RFC 3339, or an ISO-8601 date-time without an offset.
pub fn parse_source_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Some(t.naive_local());
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordGuild {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordChannel {
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordAuthor {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot: Option<bool>,
    #[serde(default)]
    pub system: Option<bool>,
}

impl DiscordAuthor {
    fn resolved_name(&self) -> Option<&str> {
        [&self.display_name, &self.global_name, &self.username]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscordAttachment {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl DiscordAttachment {
    fn resolved_url(&self) -> Option<&str> {
        [&self.url, &self.proxy_url]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }
}

/// Normalize an inbound event, or `None` when it is not a usable message
/// from `source_platform`.
pub fn normalize(event: &RawEvent, source_platform: &str) -> Option<BridgeMessage> {
    if event.platform != source_platform {
        debug!(
            platform = %event.platform,
            expected = source_platform,
            "Event is not from the bridged platform"
        );
        return None;
    }

    let Some(raw) = event.raw_message.as_ref() else {
        debug!(platform = %event.platform, "Event carries no raw message");
        return None;
    };

    let SourcePayload::Discord(payload) = SourcePayload::parse(&event.platform, raw)?;
    Some(from_discord(event, payload, Utc::now()))
}

fn from_discord(event: &RawEvent, payload: DiscordMessage, now: DateTime<Utc>) -> BridgeMessage {
    let (source_group_name, source_group_id) = match &payload.guild {
        Some(guild) => (
            guild
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_GUILD_NAME.to_string()),
            guild.id.clone(),
        ),
        None => (PRIVATE_GUILD_NAME.to_string(), None),
    };

    let (source_channel_name, source_channel_id) = match &payload.channel {
        Some(channel) => (
            channel
                .name
                .clone()
                .unwrap_or_else(|| UNKNOWN_CHANNEL_NAME.to_string()),
            channel.id.clone(),
        ),
        None => (UNKNOWN_CHANNEL_NAME.to_string(), None),
    };

    let author_name = payload
        .author
        .as_ref()
        .and_then(DiscordAuthor::resolved_name)
        .unwrap_or(UNKNOWN_USER_NAME)
        .to_string();

    let is_automated = payload
        .author
        .as_ref()
        .map(|a| a.bot.unwrap_or(false) || a.system.unwrap_or(false))
        .unwrap_or(false);

    let timestamp = payload
        .created_time()
        .unwrap_or_else(|| now.naive_utc())
        .format(TIMESTAMP_FORMAT)
        .to_string();

    let attachments = payload
        .attachments
        .iter()
        .flatten()
        .filter_map(DiscordAttachment::resolved_url)
        .map(str::to_string)
        .collect();

    let content = event
        .message_str
        .clone()
        .or(payload.content)
        .unwrap_or_default();

    BridgeMessage {
        content,
        author_name,
        source_group_name,
        source_channel_name,
        source_group_id,
        source_channel_id,
        timestamp,
        attachments,
        is_automated,
    }
}
