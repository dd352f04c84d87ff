//! Mailbox collaborator interface.
//!
//! The pipeline depends only on this trait; token caching, retries, and
//! provider quirks live in the implementation. The orchestrator calls
//! `invalidate_credentials` + one fetch retry on `MailError::Unauthorized`
//! and otherwise never second-guesses the mailbox.

pub mod graph;

use async_trait::async_trait;

use crate::error::MailError;
use crate::pipeline::types::InboundMessage;

pub use graph::{GraphConfig, GraphMailbox};

/// An outbound reply to an existing message.
#[derive(Debug, Clone)]
pub struct ReplyDraft {
    /// Rendered HTML body, signature included.
    pub html_body: String,
    /// Optional CC address.
    pub cc: Option<String>,
}

/// Mail provider operations the pipeline needs.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Fetch up to `limit` unread messages from the inbox.
    async fn fetch_unread(&self, limit: usize) -> Result<Vec<InboundMessage>, MailError>;

    /// Mark a message read. Once marked, the message is considered
    /// handled and will not be fetched again.
    async fn mark_read(&self, message_id: &str) -> Result<(), MailError>;

    /// Reply to a message in its thread.
    async fn send_reply(&self, message_id: &str, reply: &ReplyDraft) -> Result<(), MailError>;

    /// Forward a message with a comment.
    async fn forward(&self, message_id: &str, to: &str, comment: &str) -> Result<(), MailError>;

    /// Drop any cached credentials so the next call re-authenticates.
    async fn invalidate_credentials(&self);
}
