//! Chat-bot wire types and the outbound messaging client.
//!
//! Inbound updates arrive on the webhook as Telegram Bot API `Update`
//! objects; only the fields the bot reads are modelled. Outbound calls go
//! through the [`Messenger`] trait so routes can be tested with a recording
//! implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use sitebot_core::config::BotConfig;
use sitebot_core::{Result, SiteError};

// ---------------------------------------------------------------------------
// Inbound update types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub voice: Option<Voice>,
}

impl Message {
    /// The typed text, or the caption of a photo or voice note.
    pub fn body(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }

    /// The largest rendition of an attached photo.
    pub fn largest_photo(&self) -> Option<&PhotoSize> {
        self.photo
            .as_ref()?
            .iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// A parsed confirm/cancel button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonPress<'a> {
    Confirm(&'a str),
    Cancel(&'a str),
}

impl<'a> ButtonPress<'a> {
    pub fn parse(data: &'a str) -> Option<Self> {
        if let Some(id) = data.strip_prefix("confirm:") {
            return Some(ButtonPress::Confirm(id));
        }
        data.strip_prefix("cancel:").map(ButtonPress::Cancel)
    }
}

// ---------------------------------------------------------------------------
// Messenger
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send `text` with confirm and cancel buttons bound to `pending_id`.
    async fn send_confirmation(&self, chat_id: i64, text: &str, pending_id: &str) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}

pub struct TelegramMessenger {
    client: Client,
    config: BotConfig,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramMessenger {
    pub fn new(config: BotConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token,
            method
        )
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value> {
        let resp = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        let reply: ApiReply = serde_json::from_str(&text).map_err(|_| SiteError::Remote {
            status,
            body: text.clone(),
        })?;
        if !reply.ok {
            return Err(SiteError::Remote {
                status,
                body: reply.description.unwrap_or(text),
            });
        }
        Ok(reply.result)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    async fn send_confirmation(&self, chat_id: i64, text: &str, pending_id: &str) -> Result<()> {
        let keyboard = json!({
            "inline_keyboard": [[
                { "text": "✅ Confirm", "callback_data": format!("confirm:{pending_id}") },
                { "text": "✖️ Cancel", "callback_data": format!("cancel:{pending_id}") },
            ]]
        });
        self.call(
            "sendMessage",
            json!({ "chat_id": chat_id, "text": text, "reply_markup": keyboard }),
        )
        .await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call("answerCallbackQuery", body).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.call("getFile", json!({ "file_id": file_id })).await?;
        let path = file
            .get("file_path")
            .and_then(Value::as_str)
            .ok_or_else(|| SiteError::Remote {
                status: 200,
                body: format!("getFile returned no file_path for {file_id}"),
            })?;
        let url = format!(
            "{}/file/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.token,
            path
        );
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SiteError::Remote {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn messenger_for(server: &mockito::ServerGuard) -> TelegramMessenger {
        TelegramMessenger::new(BotConfig {
            token: "T0K".into(),
            api_base: server.url(),
            webhook_secret: None,
            allowed_users: vec![1],
        })
    }

    #[test]
    fn button_data_parses() {
        assert_eq!(
            ButtonPress::parse("confirm:abc"),
            Some(ButtonPress::Confirm("abc"))
        );
        assert_eq!(
            ButtonPress::parse("cancel:abc"),
            Some(ButtonPress::Cancel("abc"))
        );
        assert_eq!(ButtonPress::parse("other"), None);
    }

    #[test]
    fn photo_update_picks_largest_rendition() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "from": {"id": 5},
                "chat": {"id": 9},
                "caption": "add to gallery",
                "photo": [
                    {"file_id": "small", "width": 90, "height": 60},
                    {"file_id": "big", "width": 1280, "height": 853}
                ]
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.body(), Some("add to gallery"));
        assert_eq!(message.largest_photo().unwrap().file_id, "big");
    }

    #[tokio::test]
    async fn confirmation_carries_callback_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botT0K/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 9,
                "reply_markup": {"inline_keyboard": [[
                    {"callback_data": "confirm:p1"},
                    {"callback_data": "cancel:p1"}
                ]]}
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"message_id": 3}}"#)
            .create_async()
            .await;

        messenger_for(&server)
            .send_confirmation(9, "Confirm?", "p1")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_failure_surfaces_description() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botT0K/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok": false, "description": "Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let err = messenger_for(&server).send_text(9, "hi").await.unwrap_err();
        match err {
            SiteError::Remote { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("chat not found"));
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn download_resolves_file_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botT0K/getFile")
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {"file_id": "f", "file_path": "voice/f.oga"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/file/botT0K/voice/f.oga")
            .with_status(200)
            .with_body(vec![1u8, 2, 3])
            .create_async()
            .await;

        let bytes = messenger_for(&server).download_file("f").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }
}
