//! End-to-end tests for the forwarding pipeline.
//!
//! Each test builds a real rule store in a temp directory, wires the
//! processor to recording adapters through a `SenderManager`, and feeds it
//! raw event JSON the way the CLI channel would.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Mutex;

use discord_qq_bridge::channels::{MessageSender, SenderManager};
use discord_qq_bridge::commands::BridgeService;
use discord_qq_bridge::config::BridgeConfig;
use discord_qq_bridge::error::{ChannelError, DeliveryError};
use discord_qq_bridge::pipeline::dispatch::Dispatcher;
use discord_qq_bridge::pipeline::processor::BridgeProcessor;
use discord_qq_bridge::pipeline::types::{ContentPart, RawEvent};
use discord_qq_bridge::store::RuleStore;

/// Adapter that records sends and fails for chosen group ids.
struct TestAdapter {
    name: String,
    sent: Mutex<Vec<(String, Vec<ContentPart>)>>,
    fail_groups: Vec<String>,
}

impl TestAdapter {
    fn new(name: &str, fail_groups: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
            fail_groups: fail_groups.iter().map(|s| s.to_string()).collect(),
        })
    }
}

#[async_trait]
impl MessageSender for TestAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, address: &str, parts: &[ContentPart]) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .await
            .push((address.to_string(), parts.to_vec()));
        if self.fail_groups.iter().any(|g| address.ends_with(&format!(":{g}"))) {
            return Err(ChannelError::SendFailed {
                name: self.name.clone(),
                reason: "simulated outage".into(),
            });
        }
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<RuleStore>,
    service: BridgeService,
    processor: BridgeProcessor,
}

async fn harness(config: BridgeConfig, adapters: Vec<Arc<TestAdapter>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let config = BridgeConfig {
        rules_path: dir.path().join("bridge_config.json"),
        ..config
    };
    let store = Arc::new(RuleStore::load(config.rules_path.clone()).await);

    let mut senders = SenderManager::new();
    for adapter in adapters {
        senders.add(adapter);
    }

    let service = BridgeService::new(
        Arc::clone(&store),
        &config.default_adapter_name,
        &config.message_template,
    );
    let processor = BridgeProcessor::new(
        config,
        Arc::clone(&store),
        Dispatcher::new(Arc::new(senders)),
    );
    Harness {
        _dir: dir,
        store,
        service,
        processor,
    }
}

fn discord_event(raw: serde_json::Value) -> RawEvent {
    serde_json::from_value(json!({
        "platform": "discord",
        "raw_message": raw,
    }))
    .unwrap()
}

fn guild_message(content: &str, guild: &str, channel: &str) -> RawEvent {
    discord_event(json!({
        "content": content,
        "guild": {"id": guild, "name": "Rust Server"},
        "channel": {"id": channel, "name": "announcements"},
        "author": {"display_name": "Ferris"},
        "created_at": "2024-03-01T12:34:56+00:00"
    }))
}

#[tokio::test]
async fn mentions_and_markup_are_cleaned_end_to_end() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(
        BridgeConfig {
            message_template: "{authorName}@{guildName}/#{channelName} {timestamp}\n{content}".into(),
            ..BridgeConfig::default()
        },
        vec![qq.clone()],
    )
    .await;
    h.store.add_rule("10001", "aiocqhttp", None, None).await;

    let report = h
        .processor
        .handle(&guild_message("**hi** <@123> go to <#456>", "1", "2"))
        .await
        .unwrap();
    assert_eq!(report.delivered(), 1);

    let sent = qq.sent.lock().await;
    assert_eq!(sent[0].0, "aiocqhttp:GroupMessage:10001");
    assert_eq!(
        sent[0].1,
        vec![ContentPart::text(
            "Ferris@Rust Server/#announcements 2024-03-01 12:34:56\nhi @user123 go to #channel456"
        )]
    );
}

#[tokio::test]
async fn fan_out_isolates_failures() {
    let qq = TestAdapter::new("aiocqhttp", &["20002"]);
    let h = harness(BridgeConfig::default(), vec![qq.clone()]).await;
    h.store.add_rule("20001", "aiocqhttp", None, None).await;
    h.store.add_rule("20002", "aiocqhttp", Some("1"), None).await;
    h.store.add_rule("20003", "aiocqhttp", Some("1"), Some("2")).await;

    let report = h
        .processor
        .handle(&guild_message("release day", "1", "2"))
        .await
        .unwrap();

    assert_eq!(qq.sent.lock().await.len(), 3);
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.delivered(), 2);
    assert_eq!(report.failed(), 1);
    let failed = report.outcomes.iter().find(|o| !o.is_success()).unwrap();
    assert_eq!(failed.destination.destination_group_id, "20002");
    assert!(matches!(failed.result, Err(DeliveryError::Send(_))));
}

#[tokio::test]
async fn filters_select_destinations() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(BridgeConfig::default(), vec![qq.clone()]).await;
    h.store.add_rule("30001", "aiocqhttp", Some("1"), None).await;
    h.store.add_rule("30002", "aiocqhttp", Some("9"), None).await;
    h.store.add_rule("30003", "aiocqhttp", None, Some("2")).await;

    h.processor.handle(&guild_message("hello", "1", "2")).await.unwrap();

    let addresses: Vec<String> = qq.sent.lock().await.iter().map(|(a, _)| a.clone()).collect();
    assert_eq!(
        addresses.len(),
        2,
        "expected 30001 and 30003, got {addresses:?}"
    );
    assert!(addresses.contains(&"aiocqhttp:GroupMessage:30001".to_string()));
    assert!(addresses.contains(&"aiocqhttp:GroupMessage:30003".to_string()));
}

#[tokio::test]
async fn direct_messages_only_reach_unfiltered_rules() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(BridgeConfig::default(), vec![qq.clone()]).await;
    h.store.add_rule("40001", "aiocqhttp", Some("1"), None).await;
    h.store.add_rule("40002", "aiocqhttp", None, None).await;

    let dm = discord_event(json!({"content": "psst", "author": {"username": "ferris"}}));
    let report = h.processor.handle(&dm).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].destination.destination_group_id, "40002");
    assert_eq!(report.message.source_group_name, "private");
}

#[tokio::test]
async fn attachments_become_image_or_link_parts() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(
        BridgeConfig {
            message_template: "{content}".into(),
            ..BridgeConfig::default()
        },
        vec![qq.clone()],
    )
    .await;
    h.store.add_rule("50001", "aiocqhttp", None, None).await;

    let event = discord_event(json!({
        "content": "look",
        "attachments": [
            {"url": "https://cdn.example/pic.png?ex=abc"},
            {"url": "https://cdn.example/notes.pdf"}
        ]
    }));
    h.processor.handle(&event).await.unwrap();

    let sent = qq.sent.lock().await;
    assert_eq!(
        sent[0].1,
        vec![
            ContentPart::text("look"),
            ContentPart::image("https://cdn.example/pic.png?ex=abc"),
            ContentPart::text("\n📎 Attachment: https://cdn.example/notes.pdf"),
        ]
    );
}

#[tokio::test]
async fn image_forwarding_disabled_degrades_to_links() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(
        BridgeConfig {
            message_template: "{content}".into(),
            enable_image_forward: false,
            ..BridgeConfig::default()
        },
        vec![qq.clone()],
    )
    .await;
    h.store.add_rule("50002", "aiocqhttp", None, None).await;

    let event = discord_event(json!({
        "content": "look",
        "attachments": [{"url": "https://cdn.example/pic.png"}]
    }));
    h.processor.handle(&event).await.unwrap();

    let sent = qq.sent.lock().await;
    assert_eq!(
        sent[0].1,
        vec![
            ContentPart::text("look"),
            ContentPart::text("\n📎 Attachment: https://cdn.example/pic.png"),
        ]
    );
}

#[tokio::test]
async fn long_messages_are_truncated() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(
        BridgeConfig {
            message_template: "{content}".into(),
            max_message_length: 10,
            ..BridgeConfig::default()
        },
        vec![qq.clone()],
    )
    .await;
    h.store.add_rule("60001", "aiocqhttp", None, None).await;

    h.processor
        .handle(&guild_message("abcdefghijklmnopqrst", "1", "2"))
        .await
        .unwrap();

    let sent = qq.sent.lock().await;
    assert_eq!(sent[0].1, vec![ContentPart::text("abcdefg...")]);
}

#[tokio::test]
async fn rules_route_to_their_own_adapter() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let other = TestAdapter::new("napcat", &[]);
    let h = harness(BridgeConfig::default(), vec![qq.clone(), other.clone()]).await;
    h.store.add_rule("70001", "aiocqhttp", None, None).await;
    h.store.add_rule("70002", "napcat", None, None).await;

    h.processor.handle(&guild_message("hi", "1", "2")).await.unwrap();

    assert_eq!(qq.sent.lock().await[0].0, "aiocqhttp:GroupMessage:70001");
    assert_eq!(other.sent.lock().await[0].0, "napcat:GroupMessage:70002");
}

#[tokio::test]
async fn missing_adapter_fails_only_that_destination() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(BridgeConfig::default(), vec![qq.clone()]).await;
    h.store.add_rule("80001", "ghost", None, None).await;
    h.store.add_rule("80002", "aiocqhttp", None, None).await;

    let report = h.processor.handle(&guild_message("hi", "1", "2")).await.unwrap();
    assert_eq!(report.delivered(), 1);
    assert!(matches!(
        report.outcomes[0].result,
        Err(DeliveryError::Send(ChannelError::UnknownAdapter { .. }))
    ));
}

#[tokio::test]
async fn commands_drive_forwarding() {
    let qq = TestAdapter::new("aiocqhttp", &[]);
    let h = harness(BridgeConfig::default(), vec![qq.clone()]).await;

    let reply = h
        .service
        .handle_text(Some("90001"), "/bridge enable 1 2")
        .await
        .unwrap();
    assert!(reply.starts_with("✅"));

    let reply = h
        .service
        .handle_text(Some("90001"), "/bridge template >> {content}")
        .await
        .unwrap();
    assert!(reply.starts_with("✅"));

    h.processor.handle(&guild_message("ping", "1", "2")).await.unwrap();
    assert_eq!(qq.sent.lock().await[0].1, vec![ContentPart::text(">> ping")]);

    h.service
        .handle_text(Some("90001"), "/bridge disable")
        .await
        .unwrap();
    assert!(h.processor.handle(&guild_message("ping", "1", "2")).await.is_none());
}

#[tokio::test]
async fn corrupt_rule_file_starts_empty_and_recovers_on_save() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bridge_config.json");
    std::fs::write(&path, "{\"enabled_groups\": {\"1\": ").unwrap();

    let store = RuleStore::load(&path).await;
    assert!(store.list_rules().await.is_empty());

    store.add_rule("1", "aiocqhttp", None, None).await;
    let reloaded = RuleStore::load(&path).await;
    assert_eq!(reloaded.list_rules().await.len(), 1);
}
