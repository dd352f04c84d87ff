//! Store collaborator traits — ledger, customer directory, ticketing,
//! and agent settings. One backend may implement all of them.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::pipeline::types::{Customer, ProcessedRecord};

/// Ticket priority derived from message urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "high" => Self::High,
            "urgent" => Self::Urgent,
            _ => Self::Normal,
        }
    }
}

/// Everything needed to open a ticket from an analyzed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: TicketPriority,
    pub customer_id: Option<String>,
    pub contact_email: String,
    /// Provenance back to the mailbox message.
    pub source_message_id: String,
    pub conversation_id: String,
}

/// Append-only record of processed messages, keyed on provider message id.
/// The pipeline's sole duplicate-suppression mechanism.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Has this message id already been handled?
    async fn is_processed(&self, message_id: &str) -> Result<bool, StoreError>;

    /// Write the record for a message. At most one row per message id.
    async fn record(&self, record: &ProcessedRecord) -> Result<(), StoreError>;

    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ProcessedRecord>, StoreError>;
}

/// Customer directory lookup.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Find a customer by contact email, case-insensitive. `None` is a
    /// valid, common result.
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;

    /// Insert or update a customer record.
    async fn upsert_customer(&self, customer: &Customer) -> Result<(), StoreError>;
}

/// Ticketing collaborator.
#[async_trait]
pub trait Ticketing: Send + Sync {
    /// Create a ticket, returning its id.
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<String, StoreError>;
}

/// Agent policy settings as raw key/value rows; typed into `AgentConfig`
/// by the orchestrator at the start of each run.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_agent_settings(&self) -> Result<HashMap<String, String>, StoreError>;

    async fn put_agent_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
