//! Classifier adapter — wraps the LLM call and makes its failure mode
//! safe by construction.
//!
//! `analyze` never errors: any request failure or unparseable judgment
//! becomes the conservative fallback `Analysis` (forward to a human, do
//! nothing automatic). The fallback conversion happens here and nowhere
//! else.
//!
//! One fixed rule runs after the model: messages matching the
//! notification-reply heuristic are forced to `reply_to_notification`
//! unless the model said spam. The heuristic is cheap and nearly 100%
//! precise for templated system replies, so it is trusted over the model
//! for this narrow case.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::ClassifierError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::filter::is_notification_reply;
use crate::pipeline::types::{
    Analysis, Classification, Customer, InboundMessage, Sentiment, Urgency,
};

/// Max tokens for the triage call; runs on every message, kept tight.
const CLASSIFY_MAX_TOKENS: u32 = 1024;

/// Near-deterministic temperature for classification.
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Body characters included in the prompt.
const BODY_PROMPT_LIMIT: usize = 4000;

/// Wraps an LLM provider into the `analyze` contract.
pub struct ClassifierAdapter {
    llm: Arc<dyn LlmProvider>,
}

impl ClassifierAdapter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify a message. Never errors; failures degrade to
    /// `Analysis::fallback`.
    pub async fn analyze(
        &self,
        message: &InboundMessage,
        customer: Option<&Customer>,
        config: &AgentConfig,
    ) -> Analysis {
        let mut analysis = match self.classify(message, customer, config).await {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(id = %message.id, error = %e, "Classifier failed, using fallback analysis");
                return Analysis::fallback(&e.to_string());
            }
        };

        // Fixed override, trusted over the model for templated system
        // replies. Deliberately does not fire when the model said spam.
        if analysis.classification != Classification::Spam
            && is_notification_reply(&message.subject, &message.body)
        {
            debug!(id = %message.id, "Notification-reply heuristic overrides model classification");
            analysis.classification = Classification::ReplyToNotification;
            analysis.should_reply = false;
        }

        analysis
    }

    async fn classify(
        &self,
        message: &InboundMessage,
        customer: Option<&Customer>,
        config: &AgentConfig,
    ) -> Result<Analysis, ClassifierError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt(config)),
            ChatMessage::user(build_user_prompt(message, customer)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_judgment(&response.content)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt(config: &AgentConfig) -> String {
    format!(
        "{}\n\n\
         Classify the message and respond with ONLY a JSON object:\n\
         {{\"classification\": \"support|sales|spam|reply_to_notification|unknown\",\n\
         \"summary\": \"one sentence\", \"urgency\": \"low|medium|high|critical\",\n\
         \"sentiment\": \"positive|neutral|negative|frustrated\", \"confidence\": 0.0,\n\
         \"action_items\": [\"...\"],\n\
         \"should_create_ticket\": false, \"ticket_title\": \"\", \"ticket_description\": \"\", \"ticket_category\": \"\",\n\
         \"should_reply\": false, \"suggested_response\": \"\",\n\
         \"should_forward\": false, \"forward_reason\": \"\",\n\
         \"requires_human_review\": false, \"review_reason\": \"\"}}\n\n\
         Rules:\n\
         - confidence is your overall certainty in this judgment, 0.0 to 1.0\n\
         - suggested_response, when present, is the full reply body in plain text\n\
         - set requires_human_review when anything is ambiguous (identity, scope, pricing)\n\
         - never suggest a reply to automated or system-generated mail",
        config.system_prompt
    )
}

fn build_user_prompt(message: &InboundMessage, customer: Option<&Customer>) -> String {
    let mut prompt = String::with_capacity(1024);

    match customer {
        Some(c) => {
            prompt.push_str(&format!(
                "Known customer: {} <{}>{}\n",
                c.name,
                c.email,
                c.phone
                    .as_deref()
                    .map(|p| format!(", phone {p}"))
                    .unwrap_or_default()
            ));
        }
        None => prompt.push_str("Sender is not a known customer.\n"),
    }

    prompt.push_str(&format!("From: {}", message.from.email));
    if let Some(name) = &message.from.name {
        prompt.push_str(&format!(" ({name})"));
    }
    prompt.push('\n');
    prompt.push_str(&format!("Subject: {}\n", message.subject));
    if message.has_attachments {
        prompt.push_str("Has attachments.\n");
    }

    let body: String = message.body.chars().take(BODY_PROMPT_LIMIT).collect();
    prompt.push_str(&format!("\nMessage:\n{body}"));
    prompt
}

// ── Judgment parsing ────────────────────────────────────────────────

/// Raw model judgment before normalization. Every field defaults so a
/// sparse-but-valid JSON object still parses.
#[derive(Debug, Deserialize)]
struct RawJudgment {
    #[serde(default)]
    classification: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    urgency: String,
    #[serde(default)]
    sentiment: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    action_items: Vec<String>,
    #[serde(default)]
    should_create_ticket: bool,
    #[serde(default)]
    ticket_title: String,
    #[serde(default)]
    ticket_description: String,
    #[serde(default)]
    ticket_category: String,
    #[serde(default)]
    should_reply: bool,
    #[serde(default)]
    suggested_response: String,
    #[serde(default)]
    should_forward: bool,
    #[serde(default)]
    forward_reason: String,
    #[serde(default)]
    requires_human_review: bool,
    #[serde(default)]
    review_reason: String,
}

fn parse_judgment(raw: &str) -> Result<Analysis, ClassifierError> {
    let json_str = extract_json_object(raw);
    let judgment: RawJudgment = serde_json::from_str(&json_str)
        .map_err(|e| ClassifierError::Parse(format!("JSON parse error: {e}")))?;

    Ok(Analysis {
        classification: Classification::parse(&judgment.classification),
        summary: judgment.summary,
        urgency: Urgency::parse(&judgment.urgency),
        sentiment: Sentiment::parse(&judgment.sentiment),
        confidence: judgment.confidence.clamp(0.0, 1.0),
        action_items: judgment.action_items,
        should_create_ticket: judgment.should_create_ticket,
        ticket_title: judgment.ticket_title,
        ticket_description: judgment.ticket_description,
        ticket_category: judgment.ticket_category,
        should_reply: judgment.should_reply,
        suggested_response: none_if_empty(judgment.suggested_response),
        should_forward: judgment.should_forward,
        forward_reason: none_if_empty(judgment.forward_reason),
        requires_human_review: judgment.requires_human_review,
        review_reason: none_if_empty(judgment.review_reason),
        succeeded: true,
    })
}

fn none_if_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Extract a JSON object from model output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
