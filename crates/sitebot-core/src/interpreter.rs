//! Clients for the natural-language interpreter and the voice transcriber.
//!
//! The interpreter turns an operator's message (text, optionally with an
//! image or audio attachment) into one structured [`Action`] or an
//! explanation of why it could not. Models tend to wrap their JSON in prose
//! or markdown fences, so the reply is scanned for the first JSON object.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::action::Action;
use crate::config::{InterpreterConfig, TranscriberConfig};
use crate::error::{Result, SiteError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    fn to_json(&self) -> Value {
        json!({ "mime_type": self.mime_type, "data": BASE64.encode(&self.data) })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpretRequest {
    pub text: String,
    pub image: Option<Attachment>,
    pub audio: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    Action { action: Action, description: String },
    Unknown { message: String },
}

#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(&self, request: &InterpretRequest) -> Result<Interpretation>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Attachment) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Parse interpreter output into an [`Interpretation`].
///
/// Accepts bare JSON, fenced JSON, or JSON embedded in prose; the first
/// object found wins.
pub fn parse_interpretation(raw: &str) -> Result<Interpretation> {
    let start = raw
        .find('{')
        .ok_or_else(|| SiteError::InterpreterParse(format!("no JSON object in reply: {raw}")))?;
    let mut values = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<Value>();
    let value = match values.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(SiteError::InterpreterParse(e.to_string())),
        None => return Err(SiteError::InterpreterParse("empty reply".into())),
    };

    let tag = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| SiteError::InterpreterParse("reply has no 'action' tag".into()))?;

    if tag == "unknown" {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("I could not work out what to change.")
            .to_string();
        return Ok(Interpretation::Unknown { message });
    }

    let description = value
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);
    let action = Action::from_value(value)?;
    let description = description.unwrap_or_else(|| describe(&action));
    Ok(Interpretation::Action {
        action,
        description,
    })
}

/// Fallback confirmation text when the interpreter gives none.
fn describe(action: &Action) -> String {
    let fields = action.label_fields();
    if fields.is_empty() {
        action.tag().replace('_', " ")
    } else {
        format!("{}: {}", action.tag().replace('_', " "), fields.join(" / "))
    }
}

// ---------------------------------------------------------------------------
// HTTP clients
// ---------------------------------------------------------------------------

pub struct HttpInterpreter {
    client: Client,
    config: InterpreterConfig,
}

impl HttpInterpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct InterpretReply {
    output: String,
}

#[async_trait]
impl Interpreter for HttpInterpreter {
    async fn interpret(&self, request: &InterpretRequest) -> Result<Interpretation> {
        let mut body = json!({ "text": request.text });
        if let Some(model) = &self.config.model {
            body["model"] = json!(model);
        }
        if let Some(image) = &request.image {
            body["image"] = image.to_json();
        }
        if let Some(audio) = &request.audio {
            body["audio"] = audio.to_json();
        }

        let mut req = self.client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SiteError::Remote {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        let reply: InterpretReply = resp
            .json()
            .await
            .map_err(|e| SiteError::InterpreterParse(e.to_string()))?;
        debug!(chars = reply.output.len(), "interpreter replied");
        parse_interpretation(&reply.output)
    }
}

pub struct HttpTranscriber {
    client: Client,
    config: TranscriberConfig,
}

impl HttpTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct TranscriptReply {
    text: String,
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio: &Attachment) -> Result<String> {
        let mut req = self
            .client
            .post(&self.config.url)
            .header("Content-Type", &audio.mime_type)
            .body(audio.data.clone());
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| SiteError::Transcription(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SiteError::Transcription(format!("{status}: {body}")));
        }
        let reply: TranscriptReply = resp
            .json()
            .await
            .map_err(|e| SiteError::Transcription(e.to_string()))?;
        let text = reply.text.trim().to_string();
        if text.is_empty() {
            return Err(SiteError::Transcription("empty transcript".into()));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn fenced_reply_with_description() {
        let raw = "Sure!\n```json\n{\"action\": \"update_stat\", \"label\": \"Meals\", \"value\": 500, \"description\": \"Set meals to 500\"}\n```";
        match parse_interpretation(raw).unwrap() {
            Interpretation::Action {
                action,
                description,
            } => {
                assert_eq!(action.tag(), "update_stat");
                assert_eq!(description, "Set meals to 500");
            }
            other => panic!("expected Action, got {other:?}"),
        }
    }

    #[test]
    fn missing_description_is_derived() {
        let parsed =
            parse_interpretation(r#"{"action": "remove_program", "title": "Tutoring"}"#).unwrap();
        assert_eq!(
            parsed,
            Interpretation::Action {
                action: Action::RemoveProgram {
                    title: "Tutoring".into()
                },
                description: "remove program: Tutoring".into(),
            }
        );
    }

    #[test]
    fn unknown_carries_explanation() {
        let parsed =
            parse_interpretation(r#"{"action": "unknown", "message": "Which event?"}"#).unwrap();
        assert_eq!(
            parsed,
            Interpretation::Unknown {
                message: "Which event?".into()
            }
        );
    }

    #[test]
    fn prose_only_is_a_parse_error() {
        let err = parse_interpretation("I think you want to update the hero.").unwrap_err();
        assert!(matches!(err, SiteError::InterpreterParse(_)));
        let err = parse_interpretation(r#"{"label": "Meals"}"#).unwrap_err();
        assert!(matches!(err, SiteError::InterpreterParse(_)));
    }

    #[test]
    fn unrecognised_tag_is_unknown_action() {
        let err = parse_interpretation(r#"{"action": "launch_rocket"}"#).unwrap_err();
        assert!(matches!(err, SiteError::UnknownAction(ref t) if t == "launch_rocket"));
    }

    #[tokio::test]
    async fn http_interpreter_sends_attachments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/interpret")
            .match_header("authorization", "Bearer k")
            .match_body(Matcher::PartialJson(json!({
                "text": "add this photo",
                "model": "m1",
                "image": {"mime_type": "image/jpeg", "data": "AQID"},
            })))
            .with_status(200)
            .with_body(r#"{"output": "{\"action\": \"add_gallery_image\", \"src\": \"x.jpg\"}"}"#)
            .create_async()
            .await;

        let interpreter = HttpInterpreter::new(InterpreterConfig {
            url: format!("{}/interpret", server.url()),
            api_key: Some("k".into()),
            model: Some("m1".into()),
        });
        let request = InterpretRequest {
            text: "add this photo".into(),
            image: Some(Attachment {
                mime_type: "image/jpeg".into(),
                data: vec![1, 2, 3],
            }),
            audio: None,
        };
        let parsed = interpreter.interpret(&request).await.unwrap();
        assert!(matches!(parsed, Interpretation::Action { ref action, .. } if action.tag() == "add_gallery_image"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcriber_failure_is_transcription_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/stt")
            .with_status(502)
            .with_body("upstream down")
            .create_async()
            .await;
        server
            .mock("POST", "/stt-ok")
            .match_header("content-type", "audio/ogg")
            .with_status(200)
            .with_body(r#"{"text": " change the hero heading "}"#)
            .create_async()
            .await;

        let audio = Attachment {
            mime_type: "audio/ogg".into(),
            data: vec![0; 4],
        };
        let broken = HttpTranscriber::new(TranscriberConfig {
            url: format!("{}/stt", server.url()),
            api_key: None,
        });
        let err = broken.transcribe(&audio).await.unwrap_err();
        assert!(matches!(err, SiteError::Transcription(_)));

        let working = HttpTranscriber::new(TranscriberConfig {
            url: format!("{}/stt-ok", server.url()),
            api_key: None,
        });
        assert_eq!(
            working.transcribe(&audio).await.unwrap(),
            "change the hero heading"
        );
    }
}
