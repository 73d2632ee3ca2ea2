//! Slack adapter (Web API over reqwest).
//!
//! Channel addressing is a single string key, so no resolution or login
//! handshake exists here, just the two send primitives behind the core
//! send port.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crosspost_core::{
    domain::{ContentPayload, Recipient},
    errors::Error,
    ports::SendPort,
    Result,
};

const API_BASE: &str = "https://slack.com/api";

#[derive(Clone, Debug)]
pub struct SlackClient {
    token: String,
    http: reqwest::Client,
}

/// Envelope every Web API method returns.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl SlackClient {
    /// Fails fast when the bot token is absent.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(Error::CredentialsMissing("slack bot token"));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build");
        Ok(Self { token, http })
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{API_BASE}/chat.postMessage"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| Error::External(format!("slack request error: {e}")))?;

        check(resp).await?;
        debug!(channel, "message posted");
        Ok(())
    }

    pub async fn upload_file(
        &self,
        channel: &str,
        path: &Path,
        title: &str,
        initial_comment: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(Error::Io)?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("file.bin")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .text("channels", channel.to_string())
            .text("title", title.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if !initial_comment.is_empty() {
            form = form.text("initial_comment", initial_comment.to_string());
        }

        let resp = self
            .http
            .post(format!("{API_BASE}/files.upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("slack request error: {e}")))?;

        check(resp).await?;
        debug!(channel, "file uploaded");
        Ok(())
    }
}

async fn check(resp: reqwest::Response) -> Result<()> {
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::External(format!(
            "slack http {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    let envelope: ApiEnvelope = resp
        .json()
        .await
        .map_err(|e| Error::External(format!("slack json error: {e}")))?;
    envelope_to_result(envelope)
}

fn envelope_to_result(envelope: ApiEnvelope) -> Result<()> {
    if envelope.ok {
        return Ok(());
    }

    let reason = envelope.error.unwrap_or_else(|| "unknown error".to_string());
    match reason.as_str() {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked" => {
            Err(Error::Unauthorized(format!("slack: {reason}")))
        }
        _ => Err(Error::External(format!("slack: {reason}"))),
    }
}

#[async_trait]
impl SendPort for SlackClient {
    async fn send(&self, recipient: &Recipient, payload: &ContentPayload) -> Result<()> {
        let channel = match recipient {
            Recipient::Channel(key) => key.as_str(),
            Recipient::Group(id) => {
                return Err(Error::External(format!(
                    "slack channels are string keys; got numeric id {id}"
                )))
            }
        };

        match &payload.attachment {
            Some(path) => {
                // Title falls back to "Image" when there is no text.
                let title = payload.caption().unwrap_or("Image");
                let comment = payload.caption().unwrap_or_default();
                self.upload_file(channel, path, title, comment).await
            }
            None => self.post_message(channel, &payload.text).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(json: &str) -> ApiEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn ok_envelope_passes() {
        assert!(envelope_to_result(envelope(r#"{"ok":true}"#)).is_ok());
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        let err = envelope_to_result(envelope(r#"{"ok":false,"error":"invalid_auth"}"#))
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[test]
    fn other_errors_keep_the_api_reason() {
        let err = envelope_to_result(envelope(r#"{"ok":false,"error":"channel_not_found"}"#))
            .unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[test]
    fn missing_token_is_rejected_at_construction() {
        let err = SlackClient::new("  ", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, Error::CredentialsMissing(_)));
    }
}
