//! Action policy engine.
//!
//! Pure, deterministic mapping from `(Analysis, AgentConfig, Customer)` to
//! an `ActionDecision`. No I/O.
//!
//! Each action is gated independently — the gates must not be collapsed
//! into one combined check:
//!
//! - Ticket creation is blocked by low confidence only. A human-review
//!   flag alone does not block it: tickets are internal and the model
//!   often flags review for reasons (name mismatch, scheduling ambiguity)
//!   that have nothing to do with whether work should be tracked.
//! - Replying is the one customer-facing, hard-to-undo action, so it is
//!   blocked by the full review gate (low confidence OR review flag).
//! - Forwarding just needs the model to ask for it and an address to
//!   exist.
//! - When review is needed and nothing else fired, a review-forward is
//!   signaled so the flagged message never disappears silently.

use crate::config::AgentConfig;
use crate::pipeline::types::{ActionDecision, Analysis, Customer};

/// Decide which actions apply to an analyzed message.
pub fn decide(
    analysis: &Analysis,
    config: &AgentConfig,
    _customer: Option<&Customer>,
) -> ActionDecision {
    let low_confidence = analysis.confidence < config.review_threshold;
    let needs_review = low_confidence || analysis.requires_human_review;

    let create_ticket =
        analysis.should_create_ticket && config.auto_create_tickets && !low_confidence;

    let send_reply = analysis.should_reply && config.auto_reply && !needs_review;

    let forward = analysis.should_forward && config.forward_email.is_some();

    let review_forward = needs_review
        && !create_ticket
        && !send_reply
        && !forward
        && config.forward_email.is_some();

    ActionDecision {
        create_ticket,
        send_reply,
        forward,
        review_forward,
        needs_review,
    }
}
