use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use discord_qq_bridge::channels::{CliChannel, InboundLine, OneBotSender, SenderManager, StdoutSender};
use discord_qq_bridge::commands::BridgeService;
use discord_qq_bridge::config::{BridgeConfig, OneBotConfig};
use discord_qq_bridge::pipeline::dispatch::Dispatcher;
use discord_qq_bridge::pipeline::processor::BridgeProcessor;
use discord_qq_bridge::store::RuleStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = BridgeConfig::from_env();
    config.validate().context("invalid bridge configuration")?;

    eprintln!("🔗 Discord QQ Bridge v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Rules: {}", config.rules_path.display());
    eprintln!("   Source platform: {}", config.source_platform);
    eprintln!("   Default adapter: {}", config.default_adapter_name);
    eprintln!(
        "   Max length: {}, images: {}, bot messages: {}",
        config.max_message_length, config.enable_image_forward, config.forward_bot_messages
    );

    // ── Rule store ──────────────────────────────────────────────────────
    let store = Arc::new(RuleStore::load(config.rules_path.clone()).await);
    eprintln!("   Rules loaded: {}", store.list_rules().await.len());

    // ── Outbound adapters ───────────────────────────────────────────────
    let mut senders = SenderManager::new();
    match OneBotConfig::from_env() {
        Some(onebot) => {
            eprintln!("   OneBot: {}", onebot.base_url);
            senders.add_as(
                &config.default_adapter_name,
                Arc::new(OneBotSender::with_name(&config.default_adapter_name, onebot)),
            );
        }
        None => {
            eprintln!("   OneBot: not configured, printing to stdout");
            senders.add(Arc::new(StdoutSender::new(&config.default_adapter_name)));
        }
    }
    eprintln!("   Adapters: {}\n", senders.names().join(", "));

    let service = BridgeService::new(
        Arc::clone(&store),
        &config.default_adapter_name,
        &config.message_template,
    );
    let processor = Arc::new(BridgeProcessor::new(
        config,
        Arc::clone(&store),
        Dispatcher::new(Arc::new(senders)),
    ));

    // ── Inbound ─────────────────────────────────────────────────────────
    let mut inbound = CliChannel::new().start();
    let mut in_flight = tokio::task::JoinSet::new();
    while let Some(line) = inbound.next().await {
        match line {
            InboundLine::Event(event) => {
                // Events are independent; fan-out for one never blocks the next.
                let processor = Arc::clone(&processor);
                in_flight.spawn(async move {
                    processor.handle(&event).await;
                });
            }
            InboundLine::Command { group_id, text } => {
                if let Some(reply) = service.handle_text(group_id.as_deref(), &text).await {
                    println!("{reply}\n");
                }
            }
        }
    }

    while in_flight.join_next().await.is_some() {}

    if let Err(e) = store.save().await {
        tracing::error!(error = %e, "Final rule save failed");
    }
    Ok(())
}
