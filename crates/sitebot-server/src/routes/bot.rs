//! Chat-bot webhook.
//!
//! Always answers `200 {"ok": true}`: the bot platform retries anything else,
//! and a retried update would re-run the interpreter or re-propose an action.
//! Every outcome, including failures, is reported to the operator as a chat
//! message instead.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use sitebot_core::interpreter::{Attachment, InterpretRequest, Interpretation};
use sitebot_core::pending::ConfirmOutcome;
use sitebot_core::revert::revert_commit;
use sitebot_core::Result;
use tracing::{info, warn};

use crate::state::AppState;
use crate::telegram::{ButtonPress, CallbackQuery, Message, Messenger, Update};

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub const HELP_TEXT: &str = "Tell me what to change on the website, for example:\n\
• \"Set the volunteers stat to 120\"\n\
• \"Add Maria Lopez to the team as Treasurer\"\n\
• \"Change the hero heading to Welcome home\"\n\
You can also send a photo with a caption, or a voice note.\n\
Every change is shown to you for confirmation first.\n\n\
Commands:\n\
/status  content counts\n\
/history  recent commits\n\
/revert <sha>  undo a commit\n\
/help  this message";

const REFUSAL: &str = "Sorry, you are not authorised to manage this website.";
const NO_STORE: &str = "⚠️ The content store is not configured.";
const NO_REPO: &str = "⚠️ The content repository is not configured.";
const NO_INTERPRETER: &str = "⚠️ The language interpreter is not configured.";
const NO_TRANSCRIBER: &str = "⚠️ Voice notes are not supported on this deployment.";
const EXPIRED: &str = "⌛ This request has expired. Please send it again.";

/// POST /api/bot/webhook
pub async fn webhook(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let ack = Json(json!({ "ok": true }));

    let Some(bot) = app.config.bot.as_ref() else {
        warn!("webhook called but no bot is configured");
        return ack;
    };
    if let Some(expected) = bot.webhook_secret.as_deref() {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("webhook secret mismatch, update ignored");
            return ack;
        }
    }
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "unparseable update ignored");
            return ack;
        }
    };
    let Some(messenger) = app.messenger.clone() else {
        warn!(update_id = update.update_id, "no messenger configured, update dropped");
        return ack;
    };

    let session = Session {
        app: &app,
        messenger: messenger.as_ref(),
        allowed: &bot.allowed_users,
    };
    session.handle(update).await;
    ack
}

// ---------------------------------------------------------------------------
// Update handling
// ---------------------------------------------------------------------------

struct Session<'a> {
    app: &'a AppState,
    messenger: &'a dyn Messenger,
    allowed: &'a [i64],
}

impl Session<'_> {
    async fn handle(&self, update: Update) {
        if let Some(callback) = update.callback_query {
            self.on_callback(callback).await;
        } else if let Some(message) = update.message {
            self.on_message(message).await;
        }
    }

    async fn say(&self, chat: i64, text: &str) {
        if let Err(e) = self.messenger.send_text(chat, text).await {
            warn!(chat, error = %e, "sending reply failed");
        }
    }

    async fn on_message(&self, message: Message) {
        let chat = message.chat.id;
        let user = message.from.as_ref().map(|u| u.id);
        if !user.is_some_and(|id| self.allowed.contains(&id)) {
            info!(?user, chat, "refused message from unlisted user");
            self.say(chat, REFUSAL).await;
            return;
        }

        let reply = match self.reply_to(&message).await {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                warn!(chat, error = %e, "message handling failed");
                format!("❌ Sorry, that failed: {e}")
            }
        };
        self.say(chat, &reply).await;
    }

    /// `Ok(None)` when the reply (a confirmation prompt) was already sent.
    async fn reply_to(&self, message: &Message) -> Result<Option<String>> {
        if let Some(command) = message.text.as_deref().and_then(|t| t.strip_prefix('/')) {
            return self.command(command).await.map(Some);
        }
        self.interpret(message).await
    }

    async fn command(&self, line: &str) -> Result<String> {
        let mut parts = line.split_whitespace();
        let name = parts
            .next()
            .and_then(|n| n.split('@').next())
            .unwrap_or("");
        match name {
            "start" | "help" => Ok(HELP_TEXT.to_string()),
            "status" => {
                let Ok(dispatcher) = self.app.dispatcher() else {
                    return Ok(NO_STORE.to_string());
                };
                let status = dispatcher.status().await?;
                let lines = status["message"].as_str().unwrap_or_default();
                Ok(format!("📊 Content status\n{lines}"))
            }
            "history" => {
                let Ok(repo) = self.app.repo() else {
                    return Ok(NO_REPO.to_string());
                };
                let commits = repo.list_commits(None, 5).await?;
                if commits.is_empty() {
                    return Ok("No commits yet.".to_string());
                }
                let lines: Vec<String> = commits
                    .iter()
                    .map(|c| {
                        let short = &c.sha[..c.sha.len().min(7)];
                        let subject = c.message.lines().next().unwrap_or_default();
                        format!("{short}  {subject}")
                    })
                    .collect();
                Ok(format!("🕘 Recent commits\n{}", lines.join("\n")))
            }
            "revert" => {
                let Some(sha) = parts.next() else {
                    return Ok("Usage: /revert <sha>".to_string());
                };
                let Ok(repo) = self.app.repo() else {
                    return Ok(NO_REPO.to_string());
                };
                match revert_commit(repo.as_ref(), sha).await {
                    Ok(report) => Ok(format!(
                        "↩️ Reverted {} file(s) in {} commit(s).",
                        report.reverted.len(),
                        report.commits.len()
                    )),
                    Err(e) => Ok(format!("❌ Revert failed: {e}")),
                }
            }
            _ => Ok("Unknown command. Try /help.".to_string()),
        }
    }

    async fn interpret(&self, message: &Message) -> Result<Option<String>> {
        let (Ok(pending), Ok(_)) = (self.app.pending(), self.app.dispatcher()) else {
            return Ok(Some(NO_STORE.to_string()));
        };
        let Some(interpreter) = self.app.interpreter.as_ref() else {
            return Ok(Some(NO_INTERPRETER.to_string()));
        };

        // Expired proposals are only cleaned up here.
        if let Err(e) = pending.purge_expired(self.app.pending_ttl()).await {
            warn!(error = %e, "pending purge failed");
        }

        let mut request = InterpretRequest {
            text: message.body().unwrap_or_default().to_string(),
            ..InterpretRequest::default()
        };
        if let Some(photo) = message.largest_photo() {
            let data = self.messenger.download_file(&photo.file_id).await?;
            request.image = Some(Attachment {
                mime_type: "image/jpeg".to_string(),
                data,
            });
        }
        if let Some(voice) = &message.voice {
            let Some(transcriber) = self.app.transcriber.as_ref() else {
                return Ok(Some(NO_TRANSCRIBER.to_string()));
            };
            let audio = Attachment {
                mime_type: voice
                    .mime_type
                    .clone()
                    .unwrap_or_else(|| "audio/ogg".to_string()),
                data: self.messenger.download_file(&voice.file_id).await?,
            };
            let transcript = transcriber.transcribe(&audio).await?;
            request.text = if request.text.is_empty() {
                transcript
            } else {
                format!("{}\n{}", request.text, transcript)
            };
        }
        if request.text.trim().is_empty() && request.image.is_none() {
            return Ok(Some(HELP_TEXT.to_string()));
        }

        match interpreter.interpret(&request).await? {
            Interpretation::Unknown { message: explanation } => Ok(Some(format!("🤔 {explanation}"))),
            Interpretation::Action {
                action,
                description,
            } => {
                let chat = message.chat.id;
                let id = pending
                    .propose(&chat.to_string(), &action, &description)
                    .await?;
                self.messenger
                    .send_confirmation(chat, &format!("Please confirm:\n{description}"), &id)
                    .await?;
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Buttons
    // -----------------------------------------------------------------------

    async fn on_callback(&self, callback: CallbackQuery) {
        if !self.allowed.contains(&callback.from.id) {
            info!(user = callback.from.id, "refused button press from unlisted user");
            if let Err(e) = self
                .messenger
                .answer_callback(&callback.id, Some(REFUSAL))
                .await
            {
                warn!(error = %e, "answering callback failed");
            }
            return;
        }
        if let Err(e) = self.messenger.answer_callback(&callback.id, None).await {
            warn!(error = %e, "answering callback failed");
        }

        let Some(chat) = callback.message.as_ref().map(|m| m.chat.id) else {
            return;
        };
        let replies = match callback.data.as_deref().and_then(ButtonPress::parse) {
            Some(ButtonPress::Confirm(id)) => self.confirm(id).await,
            Some(ButtonPress::Cancel(id)) => self.cancel(id).await,
            None => return,
        };
        for reply in replies {
            self.say(chat, &reply).await;
        }
    }

    async fn confirm(&self, id: &str) -> Vec<String> {
        let (Ok(pending), Ok(dispatcher)) = (self.app.pending(), self.app.dispatcher()) else {
            return vec![NO_STORE.to_string()];
        };
        match pending.confirm(id, dispatcher).await {
            Ok(ConfirmOutcome::Expired) => vec![EXPIRED.to_string()],
            Ok(ConfirmOutcome::Executed { result, .. }) if result.success => {
                let mut replies = vec![format!("✅ Done. {}", result.message().unwrap_or_default())
                    .trim_end()
                    .to_string()];
                if let Some(revalidator) = dispatcher.revalidator().filter(|r| r.deploys()) {
                    match revalidator.trigger_deploy().await {
                        Ok(true) => replies.push("🚀 Deploy triggered.".to_string()),
                        Ok(false) => {}
                        Err(e) => warn!(pending_id = id, error = %e, "deploy hook failed"),
                    }
                }
                replies
            }
            Ok(ConfirmOutcome::Executed { result, .. }) => {
                vec![format!("❌ Failed: {}", result.error.unwrap_or_default())]
            }
            Err(e) => {
                warn!(pending_id = id, error = %e, "confirm failed");
                vec![format!("❌ Failed: {e}")]
            }
        }
    }

    async fn cancel(&self, id: &str) -> Vec<String> {
        let Ok(pending) = self.app.pending() else {
            return vec![NO_STORE.to_string()];
        };
        match pending.cancel(id).await {
            Ok(_) => vec!["🚫 Cancelled.".to_string()],
            Err(e) => vec![format!("❌ Failed: {e}")],
        }
    }
}
