//! Telegram transport — Bot API implementation of the delivery traits.
//!
//! Posts are delivered with `sendMessage` / `sendPhoto` / `sendVideo` /
//! `sendDocument`; media is referenced by Telegram `file_id`, never
//! re-uploaded. Destinations resolve through `getChat`.

use async_trait::async_trait;
use serde_json::json;

use crate::delivery::{DeliveryAdapter, DeliveryContent, Notifier, ResolvedDestination};
use crate::error::DeliveryError;
use crate::model::MediaKind;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Telegram Bot API adapter.
pub struct TelegramAdapter {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramAdapter {
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.bot_token)
    }

    async fn post_api(
        &self,
        method: &str,
        body: &serde_json::Value,
        destination: &str,
    ) -> Result<serde_json::Value, DeliveryError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Send {
                destination: destination.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let data: serde_json::Value = resp.json().await.map_err(|e| DeliveryError::Send {
            destination: destination.to_string(),
            reason: format!("{method} response parse: {e}"),
        })?;

        if !status.is_success() || data.get("ok").and_then(serde_json::Value::as_bool) != Some(true)
        {
            let description = data
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("no description");
            return Err(DeliveryError::Send {
                destination: destination.to_string(),
                reason: format!("{method} returned {status}: {description}"),
            });
        }

        Ok(data)
    }

    /// Send a text message, trying Markdown first with plain text fallback.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_text_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    async fn send_text_chunk(&self, chat_id: &str, text: &str) -> Result<(), DeliveryError> {
        let markdown = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });
        match self.post_api("sendMessage", &markdown, chat_id).await {
            Ok(_) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    chat_id,
                    "sendMessage with Markdown failed ({e}); retrying without parse_mode"
                );
            }
        }

        let plain = json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.post_api("sendMessage", &plain, chat_id).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryAdapter for TelegramAdapter {
    async fn resolve_destination(
        &self,
        identifier: &str,
    ) -> Result<ResolvedDestination, DeliveryError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(DeliveryError::Resolve {
                identifier: identifier.to_string(),
                reason: "empty identifier".to_string(),
            });
        }

        let body = json!({ "chat_id": identifier });
        let resp = self
            .client
            .post(self.api_url("getChat"))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Resolve {
                identifier: identifier.to_string(),
                reason: e.to_string(),
            })?;

        let data: serde_json::Value = resp.json().await.map_err(|e| DeliveryError::Resolve {
            identifier: identifier.to_string(),
            reason: format!("getChat response parse: {e}"),
        })?;

        if data.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("chat not found");
            return Err(DeliveryError::Resolve {
                identifier: identifier.to_string(),
                reason: description.to_string(),
            });
        }

        let chat = &data["result"];
        // Prefer the stable numeric id; @username chats can be renamed.
        let destination_id = chat
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .map(|id| id.to_string())
            .unwrap_or_else(|| identifier.to_string());
        let display_name = chat
            .get("title")
            .or_else(|| chat.get("username"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or(identifier)
            .to_string();

        Ok(ResolvedDestination {
            destination_id,
            display_name,
        })
    }

    async fn deliver(
        &self,
        destination_id: &str,
        content: &DeliveryContent,
    ) -> Result<(), DeliveryError> {
        let Some(media) = &content.media else {
            return self.send_text(destination_id, &content.text).await;
        };

        // Media goes out with the text as caption, referenced by file_id.
        let (method, field) = match media.kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Video => ("sendVideo", "video"),
            MediaKind::Document => ("sendDocument", "document"),
        };
        let body = json!({
            "chat_id": destination_id,
            field: media.file_ref,
            "caption": content.text,
        });
        self.post_api(method, &body, destination_id).await?;
        tracing::info!(destination_id, method, "Media delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramAdapter {
    async fn notify_owner(&self, owner_id: i64, text: &str) {
        let chat_id = owner_id.to_string();
        if let Err(e) = self.send_text(&chat_id, text).await {
            tracing::warn!(owner_id, "Owner notification failed: {e}");
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // The limit is in bytes; never cut inside a UTF-8 sequence.
        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // max_len is smaller than the first character; take it whole.
            cut = remaining
                .chars()
                .next()
                .map_or(remaining.len(), char::len_utf8);
        }

        let chunk = &remaining[..cut];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(cut);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { cut } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
