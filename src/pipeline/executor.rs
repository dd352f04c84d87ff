//! Action executor — performs the side effects the policy engine chose.
//!
//! Each sub-action (ticket, reply, forward) runs independently; a failure
//! is recorded and the remaining actions still run. "Cancel a sent email"
//! is not a real operation, so the caller logs whatever outcome was
//! actually achieved.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::mail::{Mailbox, ReplyDraft};
use crate::pipeline::types::{
    ActionDecision, Analysis, Customer, ExecutionResult, InboundMessage, Urgency,
};
use crate::store::traits::{TicketDraft, TicketPriority, Ticketing};

/// Fixed urgency → ticket priority table.
pub fn priority_for(urgency: Urgency) -> TicketPriority {
    match urgency {
        Urgency::Critical => TicketPriority::Urgent,
        Urgency::High => TicketPriority::High,
        Urgency::Medium => TicketPriority::Normal,
        Urgency::Low => TicketPriority::Low,
    }
}

/// Executes decided actions against the mail and ticketing collaborators.
pub struct ActionExecutor {
    mailbox: Arc<dyn Mailbox>,
    ticketing: Arc<dyn Ticketing>,
}

impl ActionExecutor {
    pub fn new(mailbox: Arc<dyn Mailbox>, ticketing: Arc<dyn Ticketing>) -> Self {
        Self { mailbox, ticketing }
    }

    /// Run every selected action, accumulating failures without
    /// short-circuiting. Mark-as-read is NOT done here; the orchestrator
    /// couples it with the ledger write.
    pub async fn execute(
        &self,
        decision: &ActionDecision,
        message: &InboundMessage,
        analysis: &Analysis,
        customer: Option<&Customer>,
        config: &AgentConfig,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::default();

        if decision.create_ticket {
            let draft = ticket_draft(message, analysis, customer);
            match self.ticketing.create_ticket(&draft).await {
                Ok(ticket_id) => {
                    info!(id = %message.id, ticket_id = %ticket_id, "Ticket created");
                    result.ticket_id = Some(ticket_id);
                }
                Err(e) => {
                    warn!(id = %message.id, error = %e, "Ticket creation failed");
                    result.errors.push(format!("ticket creation failed: {e}"));
                }
            }
        }

        if decision.send_reply {
            let body = analysis
                .suggested_response
                .clone()
                .unwrap_or_else(|| fallback_reply_body(message));
            let reply = ReplyDraft {
                html_body: render_reply_html(&body, &config.signature),
                cc: config.cc_email.clone(),
            };
            match self.mailbox.send_reply(&message.id, &reply).await {
                Ok(()) => {
                    info!(id = %message.id, "Auto-reply sent");
                    result.reply_sent = true;
                }
                Err(e) => {
                    warn!(id = %message.id, error = %e, "Reply send failed");
                    result.errors.push(format!("reply send failed: {e}"));
                }
            }
        }

        if decision.forward || decision.review_forward {
            // Policy only sets these flags when an address is configured.
            if let Some(to) = config.forward_email.as_deref() {
                let comment = forward_comment(analysis, decision.review_forward);
                match self.mailbox.forward(&message.id, to, &comment).await {
                    Ok(()) => {
                        info!(id = %message.id, to = %to, "Message forwarded");
                        result.forwarded_to = Some(to.to_string());
                    }
                    Err(e) => {
                        warn!(id = %message.id, error = %e, "Forward failed");
                        result.errors.push(format!("forward failed: {e}"));
                    }
                }
            }
        }

        result
    }
}

/// Build a ticket draft carrying customer identity and message provenance.
fn ticket_draft(
    message: &InboundMessage,
    analysis: &Analysis,
    customer: Option<&Customer>,
) -> TicketDraft {
    let title = if analysis.ticket_title.trim().is_empty() {
        message.subject.clone()
    } else {
        analysis.ticket_title.clone()
    };
    let description = if analysis.ticket_description.trim().is_empty() {
        format!("{}\n\n{}", analysis.summary, message.body_preview)
    } else {
        analysis.ticket_description.clone()
    };
    let category = if analysis.ticket_category.trim().is_empty() {
        analysis.classification.as_str().to_string()
    } else {
        analysis.ticket_category.clone()
    };

    TicketDraft {
        title,
        description,
        category,
        priority: priority_for(analysis.urgency),
        customer_id: customer.map(|c| c.id.clone()),
        contact_email: message.from.email.clone(),
        source_message_id: message.id.clone(),
        conversation_id: message.conversation_id.clone(),
    }
}

/// Generated reply used when the model asked to reply but supplied no text.
fn fallback_reply_body(message: &InboundMessage) -> String {
    format!(
        "Thank you for reaching out about \"{}\". We've received your message and \
         a member of our team will follow up shortly.",
        message.subject
    )
}

/// Fixed HTML envelope for auto-replies, signature appended.
fn render_reply_html(body: &str, signature: &str) -> String {
    let mut html = String::with_capacity(body.len() + signature.len() + 128);
    html.push_str("<div style=\"font-family: sans-serif; font-size: 14px;\">");
    for paragraph in body.split("\n\n") {
        html.push_str("<p>");
        html.push_str(&html_escape(paragraph).replace('\n', "<br>"));
        html.push_str("</p>");
    }
    if !signature.is_empty() {
        html.push_str("<p>");
        html.push_str(&html_escape(signature).replace('\n', "<br>"));
        html.push_str("</p>");
    }
    html.push_str("</div>");
    html
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Comment attached to forwards: classification, confidence, and reason.
fn forward_comment(analysis: &Analysis, review: bool) -> String {
    let reason = if review {
        analysis
            .review_reason
            .as_deref()
            .unwrap_or("flagged for review")
    } else {
        analysis
            .forward_reason
            .as_deref()
            .unwrap_or("forwarded by triage agent")
    };
    format!(
        "[triage] {} ({:.0}% confidence) — {}. {}",
        analysis.classification.as_str(),
        analysis.confidence * 100.0,
        reason,
        analysis.summary
    )
}
