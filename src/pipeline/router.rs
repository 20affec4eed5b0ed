//! Router: picks the destinations a message fans out to.
//!
//! Every rule is checked in store order and every match is returned. A set
//! filter must equal the message's id exactly; a message without that id
//! never matches it.

use tracing::debug;

use crate::pipeline::types::{BridgeMessage, Destination};
use crate::store::rules::{Rule, SourceFilter};

/// True when `filter` admits `msg`.
pub fn matches(filter: &SourceFilter, msg: &BridgeMessage) -> bool {
    field_matches(filter.guild(), msg.source_group_id.as_deref())
        && field_matches(filter.channel(), msg.source_channel_id.as_deref())
}

fn field_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(expected) => value == Some(expected),
    }
}

/// Destinations for `msg`, in rule order.
pub fn route(
    rules: &[(String, Rule)],
    msg: &BridgeMessage,
    default_adapter: &str,
) -> Vec<Destination> {
    let destinations: Vec<Destination> = rules
        .iter()
        .filter(|(_, rule)| matches(&rule.filter, msg))
        .map(|(id, rule)| {
            let adapter = rule
                .adapter_name
                .as_deref()
                .filter(|a| !a.is_empty())
                .unwrap_or(default_adapter);
            Destination::new(id.as_str(), adapter)
        })
        .collect();

    debug!(
        guild = ?msg.source_group_id,
        channel = ?msg.source_channel_id,
        rules = rules.len(),
        matched = destinations.len(),
        "Routed message"
    );
    destinations
}
