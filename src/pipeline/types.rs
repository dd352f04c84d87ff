//! Shared types for the triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// Sender or recipient address.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailAddress {
    pub email: String,
    pub name: Option<String>,
}

/// Unread mailbox message as fetched from the mail provider.
///
/// Immutable once fetched; `id` is the provider-stable idempotency key
/// the ledger is keyed on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub conversation_id: String,
    pub internet_message_id: Option<String>,
    pub from: EmailAddress,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub body_preview: String,
    pub received_at: DateTime<Utc>,
    pub has_attachments: bool,
}

impl InboundMessage {
    /// Sender domain, lowercased (the part after `@`).
    pub fn sender_domain(&self) -> Option<String> {
        self.from
            .email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase())
    }
}

/// Known customer from the directory. Absence is a valid, common state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

// ── Classification ──────────────────────────────────────────────────

/// Model (or heuristic) classification of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Support,
    Sales,
    Spam,
    /// Reply to a system-generated notification (ticket update, PO
    /// confirmation). Never auto-replied to.
    ReplyToNotification,
    /// Internal-domain sender with no customer relationship. Assigned
    /// only when logging a skipped message, never by the model.
    Internal,
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Sales => "sales",
            Self::Spam => "spam",
            Self::ReplyToNotification => "reply_to_notification",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a model-emitted label, defaulting to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "support" => Self::Support,
            "sales" => Self::Sales,
            "spam" => Self::Spam,
            "reply_to_notification" => Self::ReplyToNotification,
            "internal" => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

/// Message urgency as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// Sender sentiment as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Frustrated,
}

impl Sentiment {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            "frustrated" => Self::Frustrated,
            _ => Self::Neutral,
        }
    }
}

// ── Analysis ────────────────────────────────────────────────────────

/// Normalized classifier judgment for one message.
///
/// Invariant: `succeeded == false` implies `requires_human_review`,
/// `should_forward`, and `!should_reply` — a classifier outage degrades
/// to "forward to a human, do nothing automatic".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub classification: Classification,
    pub summary: String,
    pub urgency: Urgency,
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub action_items: Vec<String>,
    pub should_create_ticket: bool,
    pub ticket_title: String,
    pub ticket_description: String,
    pub ticket_category: String,
    pub should_reply: bool,
    pub suggested_response: Option<String>,
    pub should_forward: bool,
    pub forward_reason: Option<String>,
    pub requires_human_review: bool,
    pub review_reason: Option<String>,
    /// False only when the classifier call itself failed.
    pub succeeded: bool,
}

impl Analysis {
    /// Conservative judgment substituted when the classifier call fails
    /// or returns unparseable output. Built in exactly one place.
    pub fn fallback(reason: &str) -> Self {
        Self {
            classification: Classification::Unknown,
            summary: "Automatic analysis failed; needs manual triage.".into(),
            urgency: Urgency::Medium,
            sentiment: Sentiment::Neutral,
            confidence: 0.0,
            action_items: Vec::new(),
            should_create_ticket: false,
            ticket_title: String::new(),
            ticket_description: String::new(),
            ticket_category: String::new(),
            should_reply: false,
            suggested_response: None,
            should_forward: true,
            forward_reason: Some(format!("classifier unavailable: {reason}")),
            requires_human_review: true,
            review_reason: Some(format!("classifier unavailable: {reason}")),
            succeeded: false,
        }
    }
}

// ── Skip reasons ────────────────────────────────────────────────────

/// Why the filter dropped a message before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Sender matched a configured ignore substring.
    IgnoredSender,
    /// Calendar accept/decline/tentative or out-of-office auto-response.
    CalendarOrAutoReply,
    /// Internal-domain sender with no customer relationship.
    InternalNoCustomer,
}

impl SkipReason {
    /// Classification written to the ledger for a skipped message; skips
    /// never go through the model, so the label is inferred here.
    pub fn classification(&self) -> Classification {
        match self {
            Self::IgnoredSender => Classification::Spam,
            Self::CalendarOrAutoReply => Classification::ReplyToNotification,
            Self::InternalNoCustomer => Classification::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IgnoredSender => "ignored_sender",
            Self::CalendarOrAutoReply => "calendar_or_autoreply",
            Self::InternalNoCustomer => "internal_no_customer",
        }
    }
}

// ── Decisions and outcomes ──────────────────────────────────────────

/// Which actions the policy engine selected. Each flag is gated
/// independently; see `pipeline::policy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionDecision {
    pub create_ticket: bool,
    pub send_reply: bool,
    pub forward: bool,
    /// Forward to the reviewer even though the model didn't ask for a
    /// forward, so a flagged-but-unhandled message never disappears.
    pub review_forward: bool,
    pub needs_review: bool,
}

impl ActionDecision {
    /// True when no side effect was selected.
    pub fn is_noop(&self) -> bool {
        !(self.create_ticket || self.send_reply || self.forward || self.review_forward)
    }
}

/// Outcome of executing a decision. Sub-actions fail independently and
/// failures accumulate here without aborting the rest.
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub ticket_id: Option<String>,
    pub reply_sent: bool,
    pub forwarded_to: Option<String>,
    pub errors: Vec<String>,
}

/// Primary action recorded in the ledger for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Ignored,
    TicketCreated,
    Replied,
    Forwarded,
    PendingReview,
    Failed,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::TicketCreated => "ticket_created",
            Self::Replied => "replied",
            Self::Forwarded => "forwarded",
            Self::PendingReview => "pending_review",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ticket_created" => Self::TicketCreated,
            "replied" => Self::Replied,
            "forwarded" => Self::Forwarded,
            "pending_review" => Self::PendingReview,
            "failed" => Self::Failed,
            _ => Self::Ignored,
        }
    }
}

/// Terminal status of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Processed,
    PendingReview,
    Failed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::PendingReview => "pending_review",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending_review" => Self::PendingReview,
            "failed" => Self::Failed,
            _ => Self::Processed,
        }
    }
}

/// One ledger row per processed message id, append-only. The sole
/// duplicate-suppression mechanism for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub message_id: String,
    pub sender: String,
    pub subject: String,
    pub classification: Classification,
    pub urgency: Urgency,
    pub confidence: f32,
    pub summary: String,
    pub action_taken: ActionTaken,
    pub ticket_id: Option<String>,
    pub forwarded_to: Option<String>,
    pub errors: Vec<String>,
    pub status: RecordStatus,
    pub processing_time_ms: u64,
    pub processed_at: DateTime<Utc>,
}

// ── Run summary ─────────────────────────────────────────────────────

/// Aggregated counters for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResults {
    pub processed: usize,
    pub skipped: usize,
    /// Already in the ledger; counted separately from policy skips.
    pub duplicates: usize,
    pub tickets_created: usize,
    pub replies_sent: usize,
    pub forwarded: usize,
    pub errors: Vec<String>,
}

/// What a run returns, even on fatal failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub duration_ms: u64,
    pub results: RunResults,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_domain_lowercases() {
        let msg = InboundMessage {
            id: "m1".into(),
            conversation_id: "c1".into(),
            internet_message_id: None,
            from: EmailAddress {
                email: "Ops@AVIntegrators.COM".into(),
                name: None,
            },
            to: vec![],
            subject: "".into(),
            body: "".into(),
            body_preview: "".into(),
            received_at: Utc::now(),
            has_attachments: false,
        };
        assert_eq!(msg.sender_domain().as_deref(), Some("avintegrators.com"));
    }

    #[test]
    fn sender_domain_missing_at_sign() {
        let msg = InboundMessage {
            id: "m1".into(),
            conversation_id: "c1".into(),
            internet_message_id: None,
            from: EmailAddress {
                email: "not-an-address".into(),
                name: None,
            },
            to: vec![],
            subject: "".into(),
            body: "".into(),
            body_preview: "".into(),
            received_at: Utc::now(),
            has_attachments: false,
        };
        assert!(msg.sender_domain().is_none());
    }

    #[test]
    fn fallback_analysis_is_safe() {
        let analysis = Analysis::fallback("timeout");
        assert!(!analysis.succeeded);
        assert!(analysis.requires_human_review);
        assert!(analysis.should_forward);
        assert!(!analysis.should_reply);
        assert!(!analysis.should_create_ticket);
        assert_eq!(analysis.confidence, 0.0);
        assert!(analysis.review_reason.as_deref().unwrap().contains("timeout"));
    }

    #[test]
    fn skip_reason_classification_mapping() {
        assert_eq!(
            SkipReason::IgnoredSender.classification(),
            Classification::Spam
        );
        assert_eq!(
            SkipReason::CalendarOrAutoReply.classification(),
            Classification::ReplyToNotification
        );
        assert_eq!(
            SkipReason::InternalNoCustomer.classification(),
            Classification::Internal
        );
    }

    #[test]
    fn classification_parse_round_trip() {
        for c in [
            Classification::Support,
            Classification::Sales,
            Classification::Spam,
            Classification::ReplyToNotification,
            Classification::Internal,
            Classification::Unknown,
        ] {
            assert_eq!(Classification::parse(c.as_str()), c);
        }
        assert_eq!(Classification::parse("SUPPORT"), Classification::Support);
        assert_eq!(Classification::parse("gibberish"), Classification::Unknown);
    }

    #[test]
    fn urgency_parse_defaults_to_medium() {
        assert_eq!(Urgency::parse("critical"), Urgency::Critical);
        assert_eq!(Urgency::parse("whatever"), Urgency::Medium);
    }

    #[test]
    fn decision_noop() {
        let decision = ActionDecision {
            needs_review: true,
            ..Default::default()
        };
        assert!(decision.is_noop());

        let decision = ActionDecision {
            forward: true,
            ..Default::default()
        };
        assert!(!decision.is_noop());
    }

    #[test]
    fn classification_serde_uses_snake_case() {
        let json = serde_json::to_string(&Classification::ReplyToNotification).unwrap();
        assert_eq!(json, "\"reply_to_notification\"");
    }
}
