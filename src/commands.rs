//! `/bridge` commands issued from destination groups.
//!
//! ```text
//! /bridge enable [guild_id] [channel_id]
//! /bridge disable
//! /bridge status
//! /bridge template [new template]
//! ```
//!
//! Permission checks belong to the host; this module only parses and
//! applies commands against the rule store.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::CommandError;
use crate::pipeline::format::{Placeholder, Template};
use crate::store::rules::RuleStore;

const COMMAND_GROUP: &str = "bridge";

/// A parsed bridge command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable {
        guild_id: Option<String>,
        channel_id: Option<String>,
    },
    Disable,
    Status,
    /// `None` shows the current template.
    Template(Option<String>),
}

impl Command {
    /// Parse `text`. Returns `None` when it is not a bridge command at all.
    pub fn parse(text: &str) -> Option<Result<Self, CommandError>> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/').unwrap_or(text);
        let rest = rest.strip_prefix(COMMAND_GROUP)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return None;
        }

        let rest = rest.trim_start();
        let (sub, args) = match rest.find(char::is_whitespace) {
            Some(idx) => (&rest[..idx], rest[idx..].trim_start()),
            None => (rest, ""),
        };

        Some(match sub {
            "enable" => {
                let mut words = args.split_whitespace();
                let guild_id = words.next().map(str::to_string);
                let channel_id = words.next().map(str::to_string);
                if words.next().is_some() {
                    Err(CommandError::TooManyArguments {
                        command: "enable".into(),
                        max: 2,
                    })
                } else {
                    Ok(Self::Enable {
                        guild_id,
                        channel_id,
                    })
                }
            }
            "disable" => Ok(Self::Disable),
            "status" | "" => Ok(Self::Status),
            "template" => {
                let template = args.trim_end();
                Ok(Self::Template(
                    (!template.is_empty()).then(|| template.to_string()),
                ))
            }
            other => Err(CommandError::UnknownSubcommand(other.to_string())),
        })
    }
}

/// Applies bridge commands and renders their replies.
pub struct BridgeService {
    store: Arc<RuleStore>,
    default_adapter: String,
    default_template: String,
}

impl BridgeService {
    pub fn new(store: Arc<RuleStore>, default_adapter: &str, default_template: &str) -> Self {
        Self {
            store,
            default_adapter: default_adapter.to_string(),
            default_template: default_template.to_string(),
        }
    }

    /// Parse and run `text` issued from `group_id`. `None` when the text is
    /// not a bridge command.
    pub async fn handle_text(&self, group_id: Option<&str>, text: &str) -> Option<String> {
        let reply = match Command::parse(text)? {
            Ok(command) => self.execute(group_id, command).await,
            Err(e) => format!("❌ {e}"),
        };
        Some(reply)
    }

    pub async fn execute(&self, group_id: Option<&str>, command: Command) -> String {
        match command {
            Command::Enable {
                guild_id,
                channel_id,
            } => {
                self.enable(group_id, guild_id.as_deref(), channel_id.as_deref())
                    .await
            }
            Command::Disable => self.disable(group_id).await,
            Command::Status => self.status().await,
            Command::Template(template) => self.template(template.as_deref()).await,
        }
    }

    pub async fn enable(
        &self,
        group_id: Option<&str>,
        guild_id: Option<&str>,
        channel_id: Option<&str>,
    ) -> String {
        let Some(group_id) = group_id.filter(|g| !g.is_empty()) else {
            return "❌ This command can only be used in a group".to_string();
        };

        let rule = self
            .store
            .add_rule(group_id, &self.default_adapter, guild_id, channel_id)
            .await;

        let mut reply = "✅ Discord bridge enabled for this group".to_string();
        if !rule.filter.is_unrestricted() {
            reply.push_str(&format!(
                "\n📍 Filter: guild={}, channel={}",
                rule.filter.guild().unwrap_or("any"),
                rule.filter.channel().unwrap_or("any"),
            ));
        }
        reply
    }

    pub async fn disable(&self, group_id: Option<&str>) -> String {
        let Some(group_id) = group_id.filter(|g| !g.is_empty()) else {
            return "❌ This command can only be used in a group".to_string();
        };
        if self.store.remove_rule(group_id).await {
            "✅ Discord bridge disabled for this group".to_string()
        } else {
            "❌ The Discord bridge is not enabled for this group".to_string()
        }
    }

    pub async fn status(&self) -> String {
        let rules = self.store.list_rules().await;
        if rules.is_empty() {
            return "📊 Discord bridge status\n\n❌ No groups have the bridge enabled".to_string();
        }

        let mut lines = vec!["📊 Discord bridge status\n".to_string()];
        for (group_id, rule) in &rules {
            let mut filters = Vec::new();
            if let Some(guild) = rule.filter.guild() {
                filters.push(format!("guild ID: {guild}"));
            }
            if let Some(channel) = rule.filter.channel() {
                filters.push(format!("channel ID: {channel}"));
            }
            let filter_text = if filters.is_empty() {
                "all Discord messages".to_string()
            } else {
                filters.join(" | ")
            };
            let enabled_at = rule.enabled_at.to_rfc3339();
            let enabled_at: String = enabled_at.chars().take(19).collect();

            lines.push(format!("🔗 Group {group_id}"));
            lines.push(format!("   📍 Filter: {filter_text}"));
            lines.push(format!("   ⏰ Enabled at: {enabled_at}"));
            lines.push(String::new());
        }
        lines.join("\n")
    }

    /// Show the current template, or validate and store a new one.
    pub async fn template(&self, template: Option<&str>) -> String {
        let Some(template) = template else {
            let current = self
                .store
                .template()
                .await
                .unwrap_or_else(|| self.default_template.clone());
            return format!("📝 Current message template:\n\n{current}");
        };

        if let Err(e) = Template::parse(template) {
            warn!(error = %e, "Rejected message template");
            return format!(
                "❌ Invalid template: {e}\nAvailable placeholders: {}",
                placeholder_help()
            );
        }

        self.store.set_template(template).await;
        info!("Message template replaced via command");
        "✅ Message template updated".to_string()
    }
}

fn placeholder_help() -> String {
    Placeholder::ALL
        .iter()
        .map(|p| format!("{{{}}}", p.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn service() -> (TempDir, Arc<RuleStore>, BridgeService) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RuleStore::load(dir.path().join("rules.json")).await);
        let service = BridgeService::new(Arc::clone(&store), "aiocqhttp", "{content}");
        (dir, store, service)
    }

    #[test]
    fn parses_enable_with_filters() {
        assert_eq!(
            Command::parse("/bridge enable 111 222"),
            Some(Ok(Command::Enable {
                guild_id: Some("111".into()),
                channel_id: Some("222".into()),
            }))
        );
        assert_eq!(
            Command::parse("bridge enable"),
            Some(Ok(Command::Enable {
                guild_id: None,
                channel_id: None,
            }))
        );
    }

    #[test]
    fn parses_other_subcommands() {
        assert_eq!(Command::parse("/bridge disable"), Some(Ok(Command::Disable)));
        assert_eq!(Command::parse("/bridge status"), Some(Ok(Command::Status)));
        assert_eq!(Command::parse("/bridge"), Some(Ok(Command::Status)));
        assert_eq!(
            Command::parse("/bridge template"),
            Some(Ok(Command::Template(None)))
        );
    }

    #[test]
    fn template_keeps_inner_whitespace() {
        assert_eq!(
            Command::parse("/bridge template {authorName}:\n  {content}"),
            Some(Ok(Command::Template(Some("{authorName}:\n  {content}".into()))))
        );
    }

    #[test]
    fn non_bridge_text_is_ignored() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/bridges status"), None);
        assert_eq!(Command::parse("/help"), None);
    }

    #[test]
    fn bad_commands_are_errors() {
        assert_eq!(
            Command::parse("/bridge explode"),
            Some(Err(CommandError::UnknownSubcommand("explode".into())))
        );
        assert!(matches!(
            Command::parse("/bridge enable 1 2 3"),
            Some(Err(CommandError::TooManyArguments { .. }))
        ));
    }

    #[tokio::test]
    async fn enable_requires_group() {
        let (_dir, store, service) = service().await;
        let reply = service.enable(None, None, None).await;
        assert!(reply.starts_with("❌"));
        assert!(store.list_rules().await.is_empty());
    }

    #[tokio::test]
    async fn enable_and_status() {
        let (_dir, store, service) = service().await;
        let reply = service
            .handle_text(Some("123"), "/bridge enable 111")
            .await
            .unwrap();
        assert!(reply.contains("guild=111"));
        assert!(reply.contains("channel=any"));

        let rule = store.rule("123").await.unwrap();
        assert_eq!(rule.adapter_name.as_deref(), Some("aiocqhttp"));

        let status = service.status().await;
        assert!(status.contains("Group 123"));
        assert!(status.contains("guild ID: 111"));
    }

    #[tokio::test]
    async fn unrestricted_status_line() {
        let (_dir, _store, service) = service().await;
        service.enable(Some("1"), None, None).await;
        assert!(service.status().await.contains("all Discord messages"));
    }

    #[tokio::test]
    async fn disable_reports_missing_rule() {
        let (_dir, _store, service) = service().await;
        assert!(service.disable(Some("1")).await.contains("not enabled"));
        service.enable(Some("1"), None, None).await;
        assert!(service.disable(Some("1")).await.starts_with("✅"));
    }

    #[tokio::test]
    async fn empty_status() {
        let (_dir, _store, service) = service().await;
        assert!(service.status().await.contains("No groups"));
    }

    #[tokio::test]
    async fn template_show_and_set() {
        let (_dir, store, service) = service().await;
        assert!(service.template(None).await.ends_with("{content}"));

        let reply = service.template(Some("{authorName} says {content}")).await;
        assert!(reply.starts_with("✅"));
        assert_eq!(
            store.template().await.as_deref(),
            Some("{authorName} says {content}")
        );
        assert!(service
            .template(None)
            .await
            .ends_with("{authorName} says {content}"));
    }

    #[tokio::test]
    async fn invalid_template_is_rejected() {
        let (_dir, store, service) = service().await;
        let reply = service.template(Some("{who}")).await;
        assert!(reply.starts_with("❌"));
        assert!(reply.contains("{guildName}"));
        assert!(store.template().await.is_none());
    }

    #[tokio::test]
    async fn unknown_subcommand_reply() {
        let (_dir, _store, service) = service().await;
        let reply = service.handle_text(Some("1"), "/bridge nope").await.unwrap();
        assert!(reply.contains("Unknown subcommand"));
        assert!(service.handle_text(Some("1"), "hi there").await.is_none());
    }
}
