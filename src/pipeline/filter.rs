//! Pre-classifier message filter.
//!
//! Decides, before spending an LLM call, whether a message should be
//! skipped outright. Rules run in order, first match wins:
//! 1. Sender matches a configured ignore substring
//! 2. Calendar response / out-of-office auto-reply
//! 3. Internal-domain sender with no known customer
//!
//! A known customer on an internal domain is NOT skipped: staff-looking
//! addresses can belong to actual clients on shared domains.
//! The ledger duplicate check (rule zero) happens in the orchestrator
//! before this filter runs.

use regex::Regex;
use tracing::debug;

use crate::config::AgentConfig;
use crate::pipeline::types::{Customer, InboundMessage, SkipReason};

/// Compiled heuristics for auto-generated mail.
pub struct MessageFilter {
    calendar_subject: Regex,
    auto_reply_subject: Regex,
    auto_reply_body: Regex,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self {
            // Outlook/Google calendar response subjects
            calendar_subject: Regex::new(
                r"(?i)^(accepted|declined|tentative(ly accepted)?|canceled|cancelled):",
            )
            .unwrap(),
            auto_reply_subject: Regex::new(
                r"(?i)(automatic reply|auto[\- ]?reply|out of (the )?office|\booo\b)",
            )
            .unwrap(),
            auto_reply_body: Regex::new(
                r"(?i)(i('| a)m (currently )?out of (the )?office|will be out of (the )?office|away from (my )?e?mail until|this is an automated (reply|response))",
            )
            .unwrap(),
        }
    }

    /// Evaluate the skip rules for one message.
    ///
    /// `customer` is the directory lookup result for the sender; it only
    /// affects the internal-domain rule.
    pub fn evaluate(
        &self,
        message: &InboundMessage,
        config: &AgentConfig,
        customer: Option<&Customer>,
    ) -> Option<SkipReason> {
        let sender = message.from.email.to_lowercase();

        if config
            .ignore_domains
            .iter()
            .any(|pattern| sender.contains(pattern.as_str()))
        {
            debug!(id = %message.id, sender = %sender, "Sender on ignore list");
            return Some(SkipReason::IgnoredSender);
        }

        if self.is_calendar_or_auto_reply(message) {
            debug!(id = %message.id, subject = %message.subject, "Calendar/auto-reply message");
            return Some(SkipReason::CalendarOrAutoReply);
        }

        // Internal senders without a customer relationship are staff chatter;
        // with one, the customer relationship wins.
        if customer.is_none()
            && let Some(domain) = message.sender_domain()
            && config.internal_domains.contains(&domain)
        {
            debug!(id = %message.id, domain = %domain, "Internal sender with no customer match");
            return Some(SkipReason::InternalNoCustomer);
        }

        None
    }

    fn is_calendar_or_auto_reply(&self, message: &InboundMessage) -> bool {
        self.calendar_subject.is_match(&message.subject)
            || self.auto_reply_subject.is_match(&message.subject)
            || self.auto_reply_body.is_match(&message.body_preview)
            || self.auto_reply_body.is_match(&message.body)
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Heuristic for replies to system-generated notifications (ticket
/// updates, PO/order confirmations). Cheap and nearly always right, so
/// the classifier trusts it over the model for this narrow case.
pub fn is_notification_reply(subject: &str, body: &str) -> bool {
    static PATTERNS: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
        Regex::new(
            r"(?i)(\[?ticket\s*#?\d+|\bticket (no\.?|number)\s*\d+|\bpo\s*#?\d+|purchase order\s*#?\d+|order confirmation|your (order|request) has been (received|confirmed)|do not reply to this (email|message))",
        )
        .unwrap()
    });
    let subject_is_reply = subject.to_lowercase().starts_with("re:");
    (subject_is_reply && PATTERNS.is_match(subject)) || PATTERNS.is_match(body)
}
