//! OneBot v11 adapter: posts group messages to a OneBot HTTP endpoint.
//!
//! This is the `aiocqhttp` transport: each destination group receives one
//! `send_group_msg` call whose message array mirrors the part sequence.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use crate::channels::MessageSender;
use crate::config::{DEFAULT_ADAPTER_NAME, OneBotConfig};
use crate::error::ChannelError;
use crate::pipeline::types::{ContentPart, GROUP_MESSAGE, SessionAddress};

/// OneBot HTTP API client.
pub struct OneBotSender {
    name: String,
    config: OneBotConfig,
    client: reqwest::Client,
}

impl OneBotSender {
    pub fn new(config: OneBotConfig) -> Self {
        Self::with_name(DEFAULT_ADAPTER_NAME, config)
    }

    pub fn with_name(name: &str, config: OneBotConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, action: &str) -> String {
        format!("{}/{action}", self.config.base_url)
    }

    fn send_error(&self, reason: impl Into<String>) -> ChannelError {
        ChannelError::SendFailed {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// OneBot message segments for a part sequence.
pub fn build_segments(parts: &[ContentPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "data": {"text": text}}),
            ContentPart::Image { url } => json!({"type": "image", "data": {"file": url}}),
        })
        .collect()
}

/// Request body for `send_group_msg`. Numeric group ids are sent as numbers.
pub fn build_group_message_body(group_id: &str, parts: &[ContentPart]) -> Value {
    let group_id = match group_id.parse::<i64>() {
        Ok(n) => json!(n),
        Err(_) => json!(group_id),
    };
    json!({
        "group_id": group_id,
        "message": build_segments(parts),
    })
}

#[async_trait]
impl MessageSender for OneBotSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, address: &str, parts: &[ContentPart]) -> Result<(), ChannelError> {
        let addr = SessionAddress::parse(address)
            .ok_or_else(|| ChannelError::InvalidAddress(address.to_string()))?;
        if addr.message_type != GROUP_MESSAGE {
            return Err(self.send_error(format!(
                "unsupported message type {}",
                addr.message_type
            )));
        }

        let body = build_group_message_body(&addr.target_id, parts);
        let mut request = self.client.post(self.api_url("send_group_msg")).json(&body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(self.send_error(format!("send_group_msg returned {status}: {err}")));
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| self.send_error(format!("unreadable response: {e}")))?;
        check_response(&payload).map_err(|reason| self.send_error(reason))?;

        tracing::debug!(group_id = %addr.target_id, parts = parts.len(), "OneBot message sent");
        Ok(())
    }
}

/// OneBot reports failures in-band with `status != "ok"`.
fn check_response(payload: &Value) -> Result<(), String> {
    match payload.get("status").and_then(Value::as_str) {
        Some("ok") | Some("async") => Ok(()),
        Some(other) => {
            let retcode = payload.get("retcode").and_then(Value::as_i64).unwrap_or(-1);
            let message = payload
                .get("message")
                .or_else(|| payload.get("wording"))
                .and_then(Value::as_str)
                .unwrap_or("");
            Err(format!("status={other} retcode={retcode} {message}").trim_end().to_string())
        }
        None => Err("response has no status field".to_string()),
    }
}
