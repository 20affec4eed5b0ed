//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::format::Template;

/// Default template used when neither the environment nor the rule file
/// provides one.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "🔗 Discord message\n\nServer: {guildName}\nChannel: #{channelName}\nAuthor: {authorName}\nTime: {timestamp}\n\nContent:\n{content}";

/// Adapter name of the OneBot (aiocqhttp) transport.
pub const DEFAULT_ADAPTER_NAME: &str = "aiocqhttp";

/// Platform tag of the bridged source platform.
pub const DEFAULT_SOURCE_PLATFORM: &str = "discord";

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Path of the persisted rule file.
    pub rules_path: PathBuf,
    /// Template rendered for every forwarded message.
    pub message_template: String,
    /// Maximum formatted text length in characters.
    pub max_message_length: usize,
    /// Send raster-image attachments as image parts instead of links.
    pub enable_image_forward: bool,
    /// Forward messages authored by bots / automated accounts.
    pub forward_bot_messages: bool,
    /// Adapter used for rules that do not name one.
    pub default_adapter_name: String,
    /// Only events tagged with this platform are normalized.
    pub source_platform: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rules_path: PathBuf::from("data/bridge_config.json"),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
            max_message_length: 1000,
            enable_image_forward: true,
            forward_bot_messages: false,
            default_adapter_name: DEFAULT_ADAPTER_NAME.to_string(),
            source_platform: DEFAULT_SOURCE_PLATFORM.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Build from `BRIDGE_*` environment variables, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let rules_path = std::env::var("BRIDGE_RULES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.rules_path);

        let message_template =
            std::env::var("BRIDGE_MESSAGE_TEMPLATE").unwrap_or(defaults.message_template);

        let max_message_length: usize = std::env::var("BRIDGE_MAX_MESSAGE_LENGTH")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_message_length);

        let enable_image_forward = std::env::var("BRIDGE_ENABLE_IMAGE_FORWARD")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.enable_image_forward);

        let forward_bot_messages = std::env::var("BRIDGE_FORWARD_BOT_MESSAGES")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.forward_bot_messages);

        let default_adapter_name = std::env::var("BRIDGE_DEFAULT_ADAPTER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.default_adapter_name);

        let source_platform = std::env::var("BRIDGE_SOURCE_PLATFORM")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.source_platform);

        Self {
            rules_path,
            message_template,
            max_message_length,
            enable_image_forward,
            forward_bot_messages,
            default_adapter_name,
            source_platform,
        }
    }

    /// Reject settings the forwarding path cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BRIDGE_MAX_MESSAGE_LENGTH".into(),
                message: "must be greater than zero".into(),
            });
        }
        Template::parse(&self.message_template)?;
        Ok(())
    }
}

/// OneBot HTTP endpoint configuration.
#[derive(Debug, Clone)]
pub struct OneBotConfig {
    /// Base URL of the OneBot HTTP API, e.g. `http://127.0.0.1:5700`.
    pub base_url: String,
    /// Optional access token sent as a bearer token.
    pub access_token: Option<SecretString>,
}

impl OneBotConfig {
    /// Returns `None` unless `ONEBOT_HTTP_URL` is set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("ONEBOT_HTTP_URL").ok()?;
        let access_token = std::env::var("ONEBOT_ACCESS_TOKEN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
