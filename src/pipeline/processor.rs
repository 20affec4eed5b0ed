//! Bridge processor: runs one raw event through the forwarding pipeline.
//!
//! Flow:
//! 1. Normalize (skip events that are not usable source messages)
//! 2. Drop empty content and, unless enabled, automated senders
//! 3. Route against a snapshot of the rule store
//! 4. Fan out through the dispatcher
//!
//! Nothing here returns an error: every skip and failure ends in a log line.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::pipeline::dispatch::Dispatcher;
use crate::pipeline::normalize::normalize;
use crate::pipeline::router::route;
use crate::pipeline::types::{ForwardReport, RawEvent};
use crate::store::rules::RuleStore;

/// Forwards source-platform events to the destinations their rules select.
pub struct BridgeProcessor {
    config: BridgeConfig,
    store: Arc<RuleStore>,
    dispatcher: Dispatcher,
}

impl BridgeProcessor {
    pub fn new(config: BridgeConfig, store: Arc<RuleStore>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            store,
            dispatcher,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Template in effect: the stored override, else the configured one.
    pub async fn effective_template(&self) -> String {
        self.store
            .template()
            .await
            .unwrap_or_else(|| self.config.message_template.clone())
    }

    /// Handle one event. Returns `None` when the event was skipped.
    pub async fn handle(&self, event: &RawEvent) -> Option<ForwardReport> {
        let Some(message) = normalize(event, &self.config.source_platform) else {
            debug!(platform = %event.platform, "Event skipped: not a bridgeable message");
            return None;
        };

        if message.is_empty() {
            debug!(author = %message.author_name, "Event skipped: empty content");
            return None;
        }

        if message.is_automated && !self.config.forward_bot_messages {
            debug!(author = %message.author_name, "Event skipped: automated sender");
            return None;
        }

        let rules = self.store.snapshot().await;
        let destinations = route(
            rules.as_slice(),
            &message,
            &self.config.default_adapter_name,
        );
        if destinations.is_empty() {
            debug!(
                guild = ?message.source_group_id,
                channel = ?message.source_channel_id,
                "Event skipped: no matching destination"
            );
            return None;
        }

        let template = self.effective_template().await;
        let outcomes = self
            .dispatcher
            .deliver(
                &destinations,
                &message,
                &template,
                self.config.max_message_length,
                self.config.enable_image_forward,
            )
            .await;

        let report = ForwardReport { message, outcomes };
        if report.failed() > 0 {
            warn!(
                delivered = report.delivered(),
                failed = report.failed(),
                "Message forwarded with failures"
            );
        } else {
            info!(delivered = report.delivered(), "Message forwarded");
        }
        Some(report)
    }
}
