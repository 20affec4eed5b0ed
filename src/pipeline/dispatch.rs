//! Delivery dispatcher: fans a message out to its destinations.
//!
//! Each destination is formatted, truncated, composed into parts, and sent
//! on its own. Sends run concurrently; one destination failing never
//! affects another, and nothing is retried.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error};

use crate::channels::MessageSender;
use crate::error::DeliveryError;
use crate::pipeline::format::format;
use crate::pipeline::types::{BridgeMessage, ContentPart, DeliveryOutcome, Destination};

/// Attachment extensions sent as image parts.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Prefix for attachments sent as links.
pub const ATTACHMENT_MARKER: &str = "\n📎 Attachment: ";

/// Truncate to at most `max_length` characters, ending in [`ELLIPSIS`]
/// when anything was cut.
pub fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let marker_len = ELLIPSIS.chars().count();
    if max_length < marker_len {
        return text.chars().take(max_length).collect();
    }
    let mut out: String = text.chars().take(max_length - marker_len).collect();
    out.push_str(ELLIPSIS);
    out
}

/// True when the URL path ends in a known raster-image extension.
pub fn is_image_url(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Text part first, then one part per attachment in source order.
pub fn compose_parts(text: String, attachments: &[String], images_enabled: bool) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    parts.push(ContentPart::text(text));
    for url in attachments {
        if images_enabled && is_image_url(url) {
            parts.push(ContentPart::image(url.as_str()));
        } else {
            parts.push(ContentPart::text(format!("{ATTACHMENT_MARKER}{url}")));
        }
    }
    parts
}

/// Sends formatted messages through a [`MessageSender`].
pub struct Dispatcher {
    sender: Arc<dyn MessageSender>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self { sender }
    }

    /// Deliver `msg` to every destination. One outcome per destination, in
    /// the order given.
    pub async fn deliver(
        &self,
        destinations: &[Destination],
        msg: &BridgeMessage,
        template: &str,
        max_length: usize,
        images_enabled: bool,
    ) -> Vec<DeliveryOutcome> {
        let sends = destinations.iter().map(|destination| async move {
            let result = self
                .deliver_one(destination, msg, template, max_length, images_enabled)
                .await;
            DeliveryOutcome {
                destination: destination.clone(),
                result,
            }
        });
        join_all(sends).await
    }

    async fn deliver_one(
        &self,
        destination: &Destination,
        msg: &BridgeMessage,
        template: &str,
        max_length: usize,
        images_enabled: bool,
    ) -> Result<(), DeliveryError> {
        let address = destination.address().to_string();

        let text = format(msg, template).map_err(|e| {
            error!(destination = %address, error = %e, "Failed to format message");
            DeliveryError::from(e)
        })?;
        let parts = compose_parts(truncate(&text, max_length), &msg.attachments, images_enabled);

        match self.sender.send(&address, &parts).await {
            Ok(()) => {
                debug!(destination = %address, parts = parts.len(), "Message forwarded");
                Ok(())
            }
            Err(e) => {
                error!(destination = %address, error = %e, "Failed to forward message");
                Err(e.into())
            }
        }
    }
}
