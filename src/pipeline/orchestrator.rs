//! Pipeline orchestrator.
//!
//! One run: load config → fetch a bounded batch of unread messages →
//! for each message: duplicate check → customer lookup → filter →
//! classifier → policy → executor → mark-read → ledger write.
//!
//! Messages are processed sequentially so the ledger's check-then-write
//! stays race-free without locking; the ledger is the sole duplicate
//! suppression. Failure isolation is per-message: an error anywhere in
//! one message's chain is written to the ledger as `failed` and the run
//! continues. The run itself always returns a structured summary.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::classifier::ClassifierAdapter;
use crate::config::AgentConfig;
use crate::error::{Error, MailError};
use crate::llm::LlmProvider;
use crate::mail::Mailbox;
use crate::pipeline::executor::ActionExecutor;
use crate::pipeline::filter::MessageFilter;
use crate::pipeline::policy;
use crate::pipeline::types::{
    ActionTaken, Analysis, Classification, ExecutionResult, InboundMessage, ProcessedRecord,
    RecordStatus, RunResults, RunSummary, SkipReason,
};
use crate::store::traits::{Directory, Ledger, SettingsStore, Ticketing};

/// The triage pipeline, wired to its collaborators once at startup.
pub struct TriagePipeline {
    settings: Arc<dyn SettingsStore>,
    mailbox: Arc<dyn Mailbox>,
    directory: Arc<dyn Directory>,
    ledger: Arc<dyn Ledger>,
    classifier: ClassifierAdapter,
    executor: ActionExecutor,
    filter: MessageFilter,
}

impl TriagePipeline {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        mailbox: Arc<dyn Mailbox>,
        directory: Arc<dyn Directory>,
        ticketing: Arc<dyn Ticketing>,
        ledger: Arc<dyn Ledger>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            settings,
            mailbox: Arc::clone(&mailbox),
            directory,
            ledger,
            classifier: ClassifierAdapter::new(llm),
            executor: ActionExecutor::new(mailbox, ticketing),
            filter: MessageFilter::new(),
        }
    }

    /// Run the pipeline to completion. Never panics or escapes an error;
    /// fatal failures return `success = false` with whatever counters
    /// were accumulated.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let mut results = RunResults::default();

        let config = match self.load_config().await {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Failed to load agent config");
                results.errors.push(format!("config load failed: {e}"));
                return summary(false, started, results);
            }
        };

        if !config.enabled {
            info!("Triage agent disabled; nothing to do");
            return summary(true, started, results);
        }

        let messages = match self.fetch_with_auth_retry(config.fetch_limit).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(error = %e, "Mailbox fetch failed");
                results.errors.push(format!("mailbox fetch failed: {e}"));
                return summary(false, started, results);
            }
        };

        info!(count = messages.len(), "Fetched unread messages");

        for message in &messages {
            if let Err(e) = self.process_message(message, &config, &mut results).await {
                error!(id = %message.id, error = %e, "Message processing failed");
                results
                    .errors
                    .push(format!("{}: {e}", message.id));
                let record = failed_record(message, &e);
                if let Err(le) = self.ledger.record(&record).await {
                    error!(id = %message.id, error = %le, "Failed to write failure record");
                    results
                        .errors
                        .push(format!("{}: ledger write failed: {le}", message.id));
                }
            }
        }

        info!(
            processed = results.processed,
            skipped = results.skipped,
            duplicates = results.duplicates,
            tickets = results.tickets_created,
            replies = results.replies_sent,
            forwarded = results.forwarded,
            errors = results.errors.len(),
            "Triage run complete"
        );
        summary(true, started, results)
    }

    async fn load_config(&self) -> Result<AgentConfig, Error> {
        let raw = self.settings.load_agent_settings().await?;
        Ok(AgentConfig::from_settings(&raw)?)
    }

    /// Fetch unread messages, invalidating cached credentials and
    /// retrying exactly once on an authorization failure.
    async fn fetch_with_auth_retry(
        &self,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, MailError> {
        match self.mailbox.fetch_unread(limit).await {
            Err(MailError::Unauthorized(reason)) => {
                warn!(reason = %reason, "Mailbox authorization failed; refreshing credentials");
                self.mailbox.invalidate_credentials().await;
                self.mailbox.fetch_unread(limit).await
            }
            other => other,
        }
    }

    /// Process one message end to end. Any `Err` is caught by `run` and
    /// written to the ledger as a failure.
    async fn process_message(
        &self,
        message: &InboundMessage,
        config: &AgentConfig,
        results: &mut RunResults,
    ) -> Result<(), Error> {
        let started = Instant::now();

        // Rule zero: already in the ledger means already handled. A
        // recorded message can still be unread if its mark-read failed,
        // and an unread duplicate reappears in every fetch; retry the
        // mark-read here so it cannot occupy the batch forever.
        if self.ledger.is_processed(&message.id).await? {
            debug!(id = %message.id, "Already processed; skipping");
            if let Err(e) = self.mailbox.mark_read(&message.id).await {
                warn!(id = %message.id, error = %e, "Mark-as-read retry failed for duplicate");
            }
            results.duplicates += 1;
            return Ok(());
        }

        // A directory outage must not kill the message; degrade to "no
        // customer", which only makes the pipeline more conservative.
        let customer = match self.directory.find_by_email(&message.from.email).await {
            Ok(customer) => customer,
            Err(e) => {
                warn!(id = %message.id, error = %e, "Customer lookup failed");
                None
            }
        };

        if let Some(reason) = self.filter.evaluate(message, config, customer.as_ref()) {
            self.finish_skipped(message, reason, started, results).await?;
            return Ok(());
        }

        let analysis = self.classifier.analyze(message, customer.as_ref(), config).await;
        let decision = policy::decide(&analysis, config, customer.as_ref());
        debug!(
            id = %message.id,
            classification = analysis.classification.as_str(),
            confidence = analysis.confidence,
            ticket = decision.create_ticket,
            reply = decision.send_reply,
            forward = decision.forward || decision.review_forward,
            "Policy decision"
        );

        let mut execution = self
            .executor
            .execute(&decision, message, &analysis, customer.as_ref(), config)
            .await;

        // Mark read after all actions, success or not. Once read, the
        // message is handled; the ledger row below is what guarantees a
        // retry never repeats customer-facing actions.
        if let Err(e) = self.mailbox.mark_read(&message.id).await {
            warn!(id = %message.id, error = %e, "Mark-as-read failed");
            execution.errors.push(format!("mark read failed: {e}"));
        }

        let record = build_record(message, &analysis, &decision, &execution, started);
        self.ledger.record(&record).await?;

        results.processed += 1;
        if execution.ticket_id.is_some() {
            results.tickets_created += 1;
        }
        if execution.reply_sent {
            results.replies_sent += 1;
        }
        if execution.forwarded_to.is_some() {
            results.forwarded += 1;
        }
        for err in &record.errors {
            results.errors.push(format!("{}: {err}", message.id));
        }
        Ok(())
    }

    /// Skipped messages are still marked read and written to the ledger
    /// so a retry finds them as duplicates.
    async fn finish_skipped(
        &self,
        message: &InboundMessage,
        reason: SkipReason,
        started: Instant,
        results: &mut RunResults,
    ) -> Result<(), Error> {
        info!(id = %message.id, reason = reason.as_str(), "Skipping message");

        let mut errors = Vec::new();
        if let Err(e) = self.mailbox.mark_read(&message.id).await {
            warn!(id = %message.id, error = %e, "Mark-as-read failed for skipped message");
            errors.push(format!("mark read failed: {e}"));
        }

        let record = ProcessedRecord {
            message_id: message.id.clone(),
            sender: message.from.email.clone(),
            subject: message.subject.clone(),
            classification: reason.classification(),
            urgency: crate::pipeline::types::Urgency::Low,
            confidence: 1.0,
            summary: format!("Skipped before classification: {}", reason.as_str()),
            action_taken: ActionTaken::Ignored,
            ticket_id: None,
            forwarded_to: None,
            errors,
            status: RecordStatus::Processed,
            processing_time_ms: started.elapsed().as_millis() as u64,
            processed_at: Utc::now(),
        };
        self.ledger.record(&record).await?;
        results.skipped += 1;
        Ok(())
    }
}

fn summary(success: bool, started: Instant, results: RunResults) -> RunSummary {
    RunSummary {
        success,
        duration_ms: started.elapsed().as_millis() as u64,
        results,
    }
}

/// Primary action for the ledger, in precedence order.
fn action_taken(
    decision: &crate::pipeline::types::ActionDecision,
    execution: &ExecutionResult,
) -> ActionTaken {
    if execution.ticket_id.is_some() {
        ActionTaken::TicketCreated
    } else if execution.reply_sent {
        ActionTaken::Replied
    } else if execution.forwarded_to.is_some() {
        // A forward that exists only to put a human in the loop is
        // pending review, not handled.
        if decision.needs_review {
            ActionTaken::PendingReview
        } else {
            ActionTaken::Forwarded
        }
    } else if decision.needs_review {
        ActionTaken::PendingReview
    } else if !decision.is_noop() && !execution.errors.is_empty() {
        // Actions were selected and every one of them failed.
        ActionTaken::Failed
    } else {
        ActionTaken::Ignored
    }
}

fn build_record(
    message: &InboundMessage,
    analysis: &Analysis,
    decision: &crate::pipeline::types::ActionDecision,
    execution: &ExecutionResult,
    started: Instant,
) -> ProcessedRecord {
    let action = action_taken(decision, execution);
    let status = match action {
        ActionTaken::Failed => RecordStatus::Failed,
        ActionTaken::PendingReview => RecordStatus::PendingReview,
        _ => RecordStatus::Processed,
    };

    ProcessedRecord {
        message_id: message.id.clone(),
        sender: message.from.email.clone(),
        subject: message.subject.clone(),
        classification: analysis.classification,
        urgency: analysis.urgency,
        confidence: analysis.confidence,
        summary: analysis.summary.clone(),
        action_taken: action,
        ticket_id: execution.ticket_id.clone(),
        forwarded_to: execution.forwarded_to.clone(),
        errors: execution.errors.clone(),
        status,
        processing_time_ms: started.elapsed().as_millis() as u64,
        processed_at: Utc::now(),
    }
}

/// Ledger row for a message that died with an unexpected error.
fn failed_record(message: &InboundMessage, error: &Error) -> ProcessedRecord {
    ProcessedRecord {
        message_id: message.id.clone(),
        sender: message.from.email.clone(),
        subject: message.subject.clone(),
        classification: Classification::Unknown,
        urgency: crate::pipeline::types::Urgency::Medium,
        confidence: 0.0,
        summary: "Processing failed".into(),
        action_taken: ActionTaken::Failed,
        ticket_id: None,
        forwarded_to: None,
        errors: vec![error.to_string()],
        status: RecordStatus::Failed,
        processing_time_ms: 0,
        processed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::error::{ClassifierError, StoreError};
    use crate::llm::{CompletionRequest, CompletionResponse};
    use crate::mail::ReplyDraft;
    use crate::pipeline::types::{Customer, EmailAddress};
    use crate::store::traits::TicketDraft;

    // ── Mocks ───────────────────────────────────────────────────────

    struct MockSettings {
        rows: HashMap<String, String>,
    }

    #[async_trait]
    impl SettingsStore for MockSettings {
        async fn load_agent_settings(&self) -> Result<HashMap<String, String>, StoreError> {
            Ok(self.rows.clone())
        }

        async fn put_agent_setting(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockMailbox {
        messages: Vec<InboundMessage>,
        /// Number of leading fetches that fail with Unauthorized.
        auth_failures: AtomicUsize,
        /// Number of leading mark-read calls that fail.
        mark_read_failures: AtomicUsize,
        fetches: AtomicUsize,
        invalidations: AtomicUsize,
        mark_read_attempts: AtomicUsize,
        marked_read: Mutex<Vec<String>>,
        replies: Mutex<Vec<String>>,
        forwards: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Mailbox for MockMailbox {
        async fn fetch_unread(&self, _limit: usize) -> Result<Vec<InboundMessage>, MailError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.auth_failures.load(Ordering::SeqCst) > 0 {
                self.auth_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(MailError::Unauthorized("token expired".into()));
            }
            Ok(self.messages.clone())
        }

        async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
            self.mark_read_attempts.fetch_add(1, Ordering::SeqCst);
            if self.mark_read_failures.load(Ordering::SeqCst) > 0 {
                self.mark_read_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(MailError::Request("mark read unavailable".into()));
            }
            self.marked_read.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn send_reply(
            &self,
            message_id: &str,
            _reply: &ReplyDraft,
        ) -> Result<(), MailError> {
            self.replies.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn forward(
            &self,
            message_id: &str,
            _to: &str,
            _comment: &str,
        ) -> Result<(), MailError> {
            self.forwards.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn invalidate_credentials(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct MockDirectory {
        customers: HashMap<String, Customer>,
    }

    #[async_trait]
    impl Directory for MockDirectory {
        async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
            Ok(self.customers.get(&email.to_lowercase()).cloned())
        }

        async fn upsert_customer(&self, _customer: &Customer) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockTicketing {
        created: AtomicUsize,
    }

    #[async_trait]
    impl Ticketing for MockTicketing {
        async fn create_ticket(&self, _draft: &TicketDraft) -> Result<String, StoreError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(format!("TCK-{}", 1000 + n))
        }
    }

    #[derive(Default)]
    struct MockLedger {
        records: Mutex<HashMap<String, ProcessedRecord>>,
    }

    #[async_trait]
    impl Ledger for MockLedger {
        async fn is_processed(&self, message_id: &str) -> Result<bool, StoreError> {
            Ok(self.records.lock().unwrap().contains_key(message_id))
        }

        async fn record(&self, record: &ProcessedRecord) -> Result<(), StoreError> {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(&record.message_id) {
                return Err(StoreError::Constraint("duplicate message_id".into()));
            }
            records.insert(record.message_id.clone(), record.clone());
            Ok(())
        }

        async fn recent(&self, _limit: usize) -> Result<Vec<ProcessedRecord>, StoreError> {
            Ok(self.records.lock().unwrap().values().cloned().collect())
        }
    }

    struct MockLlm {
        response: String,
    }

    #[async_trait]
    impl crate::llm::LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ClassifierError> {
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn enabled_settings() -> HashMap<String, String> {
        [
            ("enabled", "true"),
            ("auto_reply", "true"),
            ("auto_create_tickets", "true"),
            ("forward_email", "triage@avintegrators.com"),
            ("review_threshold", "0.7"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn make_message(id: &str, sender: &str) -> InboundMessage {
        InboundMessage {
            id: id.into(),
            conversation_id: format!("conv-{id}"),
            internet_message_id: None,
            from: EmailAddress {
                email: sender.into(),
                name: None,
            },
            to: vec![],
            subject: "Room audio failing".into(),
            body: "The audio in our boardroom keeps cutting out.".into(),
            body_preview: "The audio keeps cutting out.".into(),
            received_at: Utc::now(),
            has_attachments: false,
        }
    }

    fn confident_support_judgment() -> String {
        r#"{
            "classification": "support",
            "summary": "Boardroom audio failing",
            "urgency": "high",
            "sentiment": "neutral",
            "confidence": 0.9,
            "should_create_ticket": true,
            "ticket_title": "Boardroom audio",
            "ticket_description": "Audio cutting out",
            "ticket_category": "support",
            "should_reply": true,
            "suggested_response": "We have opened a ticket.",
            "should_forward": false,
            "requires_human_review": false
        }"#
        .to_string()
    }

    fn pipeline(
        settings: HashMap<String, String>,
        mailbox: Arc<MockMailbox>,
        ledger: Arc<MockLedger>,
        llm_response: String,
    ) -> TriagePipeline {
        TriagePipeline::new(
            Arc::new(MockSettings { rows: settings }),
            mailbox,
            Arc::new(MockDirectory::default()),
            Arc::new(MockTicketing::default()),
            ledger,
            Arc::new(MockLlm {
                response: llm_response,
            }),
        )
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn disabled_agent_is_noop_success() {
        let mailbox = Arc::new(MockMailbox::default());
        let p = pipeline(
            HashMap::new(), // defaults: disabled
            mailbox.clone(),
            Arc::new(MockLedger::default()),
            confident_support_judgment(),
        );
        let summary = p.run().await;
        assert!(summary.success);
        assert_eq!(summary.results.processed, 0);
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn happy_path_counts_and_records() {
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "jane@customer.com")],
            ..Default::default()
        });
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            ledger.clone(),
            confident_support_judgment(),
        );

        let summary = p.run().await;
        assert!(summary.success);
        assert_eq!(summary.results.processed, 1);
        assert_eq!(summary.results.tickets_created, 1);
        assert_eq!(summary.results.replies_sent, 1);
        assert!(summary.results.errors.is_empty());

        assert_eq!(mailbox.marked_read.lock().unwrap().as_slice(), ["m1"]);
        let records = ledger.records.lock().unwrap();
        let record = &records["m1"];
        assert_eq!(record.action_taken, ActionTaken::TicketCreated);
        assert_eq!(record.status, RecordStatus::Processed);
        assert_eq!(record.ticket_id.as_deref(), Some("TCK-1000"));
    }

    #[tokio::test]
    async fn duplicate_message_produces_no_side_effects() {
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "jane@customer.com")],
            ..Default::default()
        });
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            ledger.clone(),
            confident_support_judgment(),
        );

        let first = p.run().await;
        assert_eq!(first.results.processed, 1);

        // Same message still "unread" on the second run.
        let second = p.run().await;
        assert_eq!(second.results.processed, 0);
        assert_eq!(second.results.duplicates, 1);
        // Exactly one reply; the duplicate path re-asserts the read flag
        // but never repeats actions.
        assert_eq!(mailbox.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unread_duplicate_gets_mark_read_retried() {
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "jane@customer.com")],
            ..Default::default()
        });
        // Mark-read fails during the first run, then recovers.
        mailbox.mark_read_failures.store(1, Ordering::SeqCst);
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            ledger.clone(),
            confident_support_judgment(),
        );

        let first = p.run().await;
        assert_eq!(first.results.processed, 1);
        assert_eq!(mailbox.mark_read_attempts.load(Ordering::SeqCst), 1);
        assert!(mailbox.marked_read.lock().unwrap().is_empty());

        // The message reappears in the next fetch as a duplicate; the
        // run retries the mark-read so the message stops recirculating.
        let second = p.run().await;
        assert_eq!(second.results.duplicates, 1);
        assert_eq!(mailbox.mark_read_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(mailbox.marked_read.lock().unwrap().as_slice(), ["m1"]);
        // Still exactly one reply across both runs.
        assert_eq!(mailbox.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mark_read_failure_is_recorded_but_row_still_written() {
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "jane@customer.com")],
            ..Default::default()
        });
        mailbox.mark_read_failures.store(1, Ordering::SeqCst);
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            ledger.clone(),
            confident_support_judgment(),
        );

        let summary = p.run().await;
        assert!(summary.success);
        assert_eq!(summary.results.processed, 1);
        assert_eq!(summary.results.tickets_created, 1);
        assert!(
            summary
                .results
                .errors
                .iter()
                .any(|e| e.contains("mark read failed")),
            "run errors: {:?}",
            summary.results.errors
        );

        // The row lands despite the mark-read failure, carrying the error.
        let records = ledger.records.lock().unwrap();
        let record = &records["m1"];
        assert_eq!(record.action_taken, ActionTaken::TicketCreated);
        assert_eq!(record.status, RecordStatus::Processed);
        assert!(record.errors.iter().any(|e| e.contains("mark read failed")));
    }

    #[tokio::test]
    async fn auth_failure_invalidates_and_retries_once() {
        let mailbox = Arc::new(MockMailbox {
            messages: vec![],
            ..Default::default()
        });
        mailbox.auth_failures.store(1, Ordering::SeqCst);
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            Arc::new(MockLedger::default()),
            confident_support_judgment(),
        );

        let summary = p.run().await;
        assert!(summary.success);
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(mailbox.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistent_auth_failure_fails_the_run() {
        let mailbox = Arc::new(MockMailbox::default());
        mailbox.auth_failures.store(2, Ordering::SeqCst);
        let p = pipeline(
            enabled_settings(),
            mailbox.clone(),
            Arc::new(MockLedger::default()),
            confident_support_judgment(),
        );

        let summary = p.run().await;
        assert!(!summary.success);
        assert_eq!(mailbox.fetches.load(Ordering::SeqCst), 2);
        assert!(!summary.results.errors.is_empty());
    }

    #[tokio::test]
    async fn skipped_message_is_marked_read_and_recorded() {
        let mut settings = enabled_settings();
        settings.insert("ignore_domains".into(), "noreply@".into());
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "noreply@vendor.com")],
            ..Default::default()
        });
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(settings, mailbox.clone(), ledger.clone(), confident_support_judgment());

        let summary = p.run().await;
        assert_eq!(summary.results.skipped, 1);
        assert_eq!(summary.results.processed, 0);
        assert_eq!(mailbox.marked_read.lock().unwrap().as_slice(), ["m1"]);

        let records = ledger.records.lock().unwrap();
        let record = &records["m1"];
        assert_eq!(record.classification, Classification::Spam);
        assert_eq!(record.action_taken, ActionTaken::Ignored);
    }

    #[tokio::test]
    async fn review_flagged_message_is_forwarded_and_pending() {
        let judgment = r#"{
            "classification": "support",
            "summary": "Ambiguous request",
            "urgency": "medium",
            "sentiment": "neutral",
            "confidence": 0.4,
            "should_create_ticket": true,
            "should_reply": true,
            "suggested_response": "Sure!",
            "requires_human_review": false
        }"#;
        let mailbox = Arc::new(MockMailbox {
            messages: vec![make_message("m1", "jane@customer.com")],
            ..Default::default()
        });
        let ledger = Arc::new(MockLedger::default());
        let p = pipeline(enabled_settings(), mailbox.clone(), ledger.clone(), judgment.into());

        let summary = p.run().await;
        assert_eq!(summary.results.replies_sent, 0);
        assert_eq!(summary.results.tickets_created, 0);
        assert_eq!(summary.results.forwarded, 1);

        let records = ledger.records.lock().unwrap();
        assert_eq!(records["m1"].action_taken, ActionTaken::PendingReview);
        assert_eq!(records["m1"].status, RecordStatus::PendingReview);
    }

    #[tokio::test]
    async fn action_taken_precedence() {
        use crate::pipeline::types::ActionDecision;

        let decision = ActionDecision {
            create_ticket: true,
            send_reply: true,
            ..Default::default()
        };
        let execution = ExecutionResult {
            ticket_id: Some("TCK-1".into()),
            reply_sent: true,
            ..Default::default()
        };
        assert_eq!(action_taken(&decision, &execution), ActionTaken::TicketCreated);

        let execution = ExecutionResult {
            reply_sent: true,
            ..Default::default()
        };
        assert_eq!(action_taken(&decision, &execution), ActionTaken::Replied);

        // All selected actions failed.
        let execution = ExecutionResult {
            errors: vec!["boom".into()],
            ..Default::default()
        };
        assert_eq!(action_taken(&decision, &execution), ActionTaken::Failed);

        // Nothing selected, nothing done.
        let decision = ActionDecision::default();
        assert_eq!(
            action_taken(&decision, &ExecutionResult::default()),
            ActionTaken::Ignored
        );
    }
}
