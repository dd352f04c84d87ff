//! Microsoft Graph mailbox implementation.
//!
//! Client-credentials OAuth with an in-process token cache. A 401 from
//! Graph surfaces as `MailError::Unauthorized`; the orchestrator reacts
//! by calling `invalidate_credentials` and retrying the fetch once.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{ConfigError, MailError};
use crate::mail::{Mailbox, ReplyDraft};
use crate::pipeline::types::{EmailAddress, InboundMessage};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const TOKEN_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Slack subtracted from the token lifetime so we never use a token that
/// expires mid-request.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(120);

/// Credentials and addressing for one monitored mailbox.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: SecretString,
    /// User principal name of the monitored mailbox.
    pub mailbox: String,
    /// Override for tests; defaults to the public Graph endpoint.
    pub base_url: Option<String>,
    /// Override for tests; defaults to the Microsoft login endpoint.
    pub token_url: Option<String>,
}

impl GraphConfig {
    /// Build from `GRAPH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let var = |key: &str| {
            std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
        };
        Ok(Self {
            tenant_id: var("GRAPH_TENANT_ID")?,
            client_id: var("GRAPH_CLIENT_ID")?,
            client_secret: SecretString::from(var("GRAPH_CLIENT_SECRET")?),
            mailbox: var("GRAPH_MAILBOX")?,
            base_url: None,
            token_url: None,
        })
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Graph-backed `Mailbox`.
pub struct GraphMailbox {
    client: reqwest::Client,
    config: GraphConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GraphMailbox {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    fn token_url(&self) -> String {
        self.config.token_url.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.config.tenant_id
            )
        })
    }

    /// Listing is scoped to the inbox; unread items elsewhere (drafts,
    /// archived mail) are not triage candidates.
    fn inbox_url(&self) -> String {
        format!(
            "{}/users/{}/mailFolders/inbox/messages",
            self.base_url(),
            self.config.mailbox
        )
    }

    /// Per-message operations address the message by id, folder-agnostic.
    fn messages_url(&self, suffix: &str) -> String {
        format!(
            "{}/users/{}/messages{}",
            self.base_url(),
            self.config.mailbox,
            suffix
        )
    }

    /// Return a valid access token, fetching a fresh one if the cache is
    /// empty or near expiry.
    async fn access_token(&self) -> Result<String, MailError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.expires_at > Instant::now()
        {
            return Ok(cached.access_token.clone());
        }

        debug!("Requesting new Graph access token");
        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
                ("scope", TOKEN_SCOPE),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| MailError::Request(format!("token request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(format!("token response: {e}")))?;

        if !status.is_success() {
            return Err(MailError::Unauthorized(format!(
                "token endpoint returned {status}: {}",
                body["error_description"].as_str().unwrap_or("unknown")
            )));
        }

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| MailError::InvalidResponse("token response missing access_token".into()))?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);

        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in)
                - TOKEN_EXPIRY_SLACK.min(Duration::from_secs(expires_in)),
        });
        Ok(access_token)
    }

    /// Map a non-success Graph response into a `MailError`.
    async fn error_from_response(response: reqwest::Response) -> MailError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            MailError::Unauthorized(format!("Graph returned 401: {body}"))
        } else {
            MailError::Http {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait::async_trait]
impl Mailbox for GraphMailbox {
    async fn fetch_unread(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError> {
        let token = self.access_token().await?;
        let url = self.inbox_url();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("$filter", "isRead eq false".to_string()),
                ("$top", limit.to_string()),
                ("$orderby", "receivedDateTime asc".to_string()),
                (
                    "$select",
                    "id,conversationId,internetMessageId,from,toRecipients,subject,body,bodyPreview,receivedDateTime,hasAttachments"
                        .to_string(),
                ),
            ])
            .send()
            .await
            .map_err(|e| MailError::Request(format!("fetch unread: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MailError::InvalidResponse(format!("fetch unread: {e}")))?;

        let items = body["value"]
            .as_array()
            .ok_or_else(|| MailError::InvalidResponse("missing 'value' array".into()))?;

        let mut messages = Vec::with_capacity(items.len());
        for item in items {
            match message_from_graph(item) {
                Some(msg) => messages.push(msg),
                None => warn!(raw = %item, "Skipping unparseable Graph message"),
            }
        }
        Ok(messages)
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
        let token = self.access_token().await?;
        let url = self.messages_url(&format!("/{message_id}"));
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&token)
            .json(&json!({ "isRead": true }))
            .send()
            .await
            .map_err(|e| MailError::Request(format!("mark read: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn send_reply(&self, message_id: &str, reply: &ReplyDraft) -> Result<(), MailError> {
        let token = self.access_token().await?;
        let url = self.messages_url(&format!("/{message_id}/reply"));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&reply_payload(reply))
            .send()
            .await
            .map_err(|e| MailError::Request(format!("send reply: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn forward(&self, message_id: &str, to: &str, comment: &str) -> Result<(), MailError> {
        let token = self.access_token().await?;
        let url = self.messages_url(&format!("/{message_id}/forward"));
        let payload = json!({
            "comment": comment,
            "toRecipients": [{ "emailAddress": { "address": to } }],
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MailError::Request(format!("forward: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }

    async fn invalidate_credentials(&self) {
        debug!("Invalidating cached Graph token");
        *self.token.lock().await = None;
    }
}

/// Build the Graph reply payload from a draft.
fn reply_payload(reply: &ReplyDraft) -> Value {
    let mut payload = json!({
        "comment": reply.html_body,
    });
    if let Some(cc) = &reply.cc {
        payload["message"] = json!({
            "ccRecipients": [{ "emailAddress": { "address": cc } }],
        });
    }
    payload
}

/// Map one Graph message resource to an `InboundMessage`.
///
/// Returns `None` when required fields are absent; such messages are
/// logged and skipped rather than failing the whole fetch.
fn message_from_graph(v: &Value) -> Option<InboundMessage> {
    let id = v["id"].as_str()?.to_string();
    let received_at = v["receivedDateTime"]
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))?;

    let from = EmailAddress {
        email: v["from"]["emailAddress"]["address"]
            .as_str()?
            .to_string(),
        name: v["from"]["emailAddress"]["name"]
            .as_str()
            .map(String::from),
    };

    let to = v["toRecipients"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| r["emailAddress"]["address"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    Some(InboundMessage {
        id,
        conversation_id: v["conversationId"].as_str().unwrap_or_default().to_string(),
        internet_message_id: v["internetMessageId"].as_str().map(String::from),
        from,
        to,
        subject: v["subject"].as_str().unwrap_or_default().to_string(),
        body: v["body"]["content"].as_str().unwrap_or_default().to_string(),
        body_preview: v["bodyPreview"].as_str().unwrap_or_default().to_string(),
        received_at,
        has_attachments: v["hasAttachments"].as_bool().unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_message() -> Value {
        json!({
            "id": "AAMkAD-1",
            "conversationId": "AAQkAD-7",
            "internetMessageId": "<abc@mail.example.com>",
            "from": { "emailAddress": { "address": "jane@customer.com", "name": "Jane Doe" } },
            "toRecipients": [
                { "emailAddress": { "address": "support@avintegrators.com" } }
            ],
            "subject": "Projector won't power on",
            "body": { "contentType": "html", "content": "<p>It's dead.</p>" },
            "bodyPreview": "It's dead.",
            "receivedDateTime": "2026-08-24T14:03:22Z",
            "hasAttachments": true
        })
    }

    #[test]
    fn listing_is_inbox_scoped_and_message_ops_are_not() {
        let mailbox = GraphMailbox::new(GraphConfig {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: SecretString::from("secret"),
            mailbox: "service@avintegrators.com".into(),
            base_url: Some("http://graph.test/v1.0".into()),
            token_url: None,
        });
        assert_eq!(
            mailbox.inbox_url(),
            "http://graph.test/v1.0/users/service@avintegrators.com/mailFolders/inbox/messages"
        );
        assert_eq!(
            mailbox.messages_url("/AAMkAD-1/reply"),
            "http://graph.test/v1.0/users/service@avintegrators.com/messages/AAMkAD-1/reply"
        );
    }

    #[test]
    fn maps_graph_message_fields() {
        let msg = message_from_graph(&graph_message()).unwrap();
        assert_eq!(msg.id, "AAMkAD-1");
        assert_eq!(msg.conversation_id, "AAQkAD-7");
        assert_eq!(msg.internet_message_id.as_deref(), Some("<abc@mail.example.com>"));
        assert_eq!(msg.from.email, "jane@customer.com");
        assert_eq!(msg.from.name.as_deref(), Some("Jane Doe"));
        assert_eq!(msg.to, vec!["support@avintegrators.com".to_string()]);
        assert_eq!(msg.subject, "Projector won't power on");
        assert!(msg.body.contains("dead"));
        assert!(msg.has_attachments);
    }

    #[test]
    fn rejects_message_without_sender() {
        let mut v = graph_message();
        v["from"] = Value::Null;
        assert!(message_from_graph(&v).is_none());
    }

    #[test]
    fn rejects_message_with_bad_timestamp() {
        let mut v = graph_message();
        v["receivedDateTime"] = json!("yesterday-ish");
        assert!(message_from_graph(&v).is_none());
    }

    #[test]
    fn tolerates_missing_optional_fields() {
        let v = json!({
            "id": "AAMkAD-2",
            "from": { "emailAddress": { "address": "x@y.com" } },
            "receivedDateTime": "2026-08-24T14:03:22Z"
        });
        let msg = message_from_graph(&v).unwrap();
        assert!(msg.subject.is_empty());
        assert!(msg.to.is_empty());
        assert!(!msg.has_attachments);
        assert!(msg.internet_message_id.is_none());
    }

    #[test]
    fn reply_payload_includes_cc_when_present() {
        let payload = reply_payload(&ReplyDraft {
            html_body: "<p>hi</p>".into(),
            cc: Some("office@avintegrators.com".into()),
        });
        assert_eq!(payload["comment"], "<p>hi</p>");
        assert_eq!(
            payload["message"]["ccRecipients"][0]["emailAddress"]["address"],
            "office@avintegrators.com"
        );

        let payload = reply_payload(&ReplyDraft {
            html_body: "<p>hi</p>".into(),
            cc: None,
        });
        assert!(payload.get("message").is_none());
    }
}
