//! libSQL backend implementing the ledger, customer directory,
//! ticketing, and settings traits over one local database.
//!
//! Supports local file and in-memory databases. `libsql::Connection` is
//! `Send + Sync` and safe for concurrent async use, so a single
//! connection is reused for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::pipeline::types::{
    ActionTaken, Classification, Customer, ProcessedRecord, RecordStatus, Urgency,
};
use crate::store::migrations;
use crate::store::traits::{Directory, Ledger, SettingsStore, TicketDraft, Ticketing};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::init_schema(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::init_schema(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// UNIQUE violations get their own variant; everything else is a query
/// failure.
fn query_err(e: libsql::Error) -> StoreError {
    let text = e.to_string();
    if text.contains("UNIQUE constraint") {
        StoreError::Constraint(text)
    } else {
        StoreError::Query(text)
    }
}

const RECORD_COLUMNS: &str = "message_id, sender, subject, classification, urgency, confidence, \
     summary, action_taken, ticket_id, forwarded_to, errors, status, processing_time_ms, \
     processed_at";

fn row_to_record(row: &libsql::Row) -> Result<ProcessedRecord, StoreError> {
    let classification_str: String = row.get(3).map_err(query_err)?;
    let urgency_str: String = row.get(4).map_err(query_err)?;
    let action_str: String = row.get(7).map_err(query_err)?;
    let errors_str: String = row.get(10).map_err(query_err)?;
    let status_str: String = row.get(11).map_err(query_err)?;
    let processed_str: String = row.get(13).map_err(query_err)?;

    let errors: Vec<String> = serde_json::from_str(&errors_str)
        .map_err(|e| StoreError::Serialization(format!("errors column: {e}")))?;

    Ok(ProcessedRecord {
        message_id: row.get(0).map_err(query_err)?,
        sender: row.get(1).map_err(query_err)?,
        subject: row.get(2).map_err(query_err)?,
        classification: Classification::parse(&classification_str),
        urgency: Urgency::parse(&urgency_str),
        confidence: row.get::<f64>(5).map_err(query_err)? as f32,
        summary: row.get(6).map_err(query_err)?,
        action_taken: ActionTaken::parse(&action_str),
        ticket_id: row.get(8).ok(),
        forwarded_to: row.get(9).ok(),
        errors,
        status: RecordStatus::parse(&status_str),
        processing_time_ms: row.get::<i64>(12).map_err(query_err)?.max(0) as u64,
        processed_at: parse_datetime(&processed_str),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl Ledger for LibSqlBackend {
    async fn is_processed(&self, message_id: &str) -> Result<bool, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM processed_messages WHERE message_id = ?1",
                params![message_id],
            )
            .await
            .map_err(query_err)?;
        Ok(rows.next().await.map_err(query_err)?.is_some())
    }

    async fn record(&self, record: &ProcessedRecord) -> Result<(), StoreError> {
        let errors = serde_json::to_string(&record.errors)
            .map_err(|e| StoreError::Serialization(format!("errors column: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO processed_messages (message_id, sender, subject, classification, \
                 urgency, confidence, summary, action_taken, ticket_id, forwarded_to, errors, \
                 status, processing_time_ms, processed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.message_id.as_str(),
                    record.sender.as_str(),
                    record.subject.as_str(),
                    record.classification.as_str(),
                    record.urgency.as_str(),
                    record.confidence as f64,
                    record.summary.as_str(),
                    record.action_taken.as_str(),
                    opt_text(record.ticket_id.as_deref()),
                    opt_text(record.forwarded_to.as_deref()),
                    errors,
                    record.status.as_str(),
                    record.processing_time_ms as i64,
                    record.processed_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        debug!(id = %record.message_id, action = record.action_taken.as_str(), "Ledger row written");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProcessedRecord>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM processed_messages \
                     ORDER BY processed_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(query_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl Directory for LibSqlBackend {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, email, phone FROM customers WHERE LOWER(email) = LOWER(?1)",
                params![email],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(Customer {
                id: row.get(0).map_err(query_err)?,
                name: row.get(1).map_err(query_err)?,
                email: row.get(2).map_err(query_err)?,
                phone: row.get(3).ok(),
            })),
            None => Ok(None),
        }
    }

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO customers (id, name, email, phone, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5) \
                 ON CONFLICT (id) DO UPDATE SET \
                 name = excluded.name, email = excluded.email, phone = excluded.phone, \
                 updated_at = excluded.updated_at",
                params![
                    customer.id.as_str(),
                    customer.name.as_str(),
                    customer.email.as_str(),
                    opt_text(customer.phone.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

#[async_trait]
impl Ticketing for LibSqlBackend {
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO tickets (id, title, description, category, priority, customer_id, \
                 contact_email, source_message_id, conversation_id, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    draft.title.as_str(),
                    draft.description.as_str(),
                    draft.category.as_str(),
                    draft.priority.as_str(),
                    opt_text(draft.customer_id.as_deref()),
                    draft.contact_email.as_str(),
                    draft.source_message_id.as_str(),
                    draft.conversation_id.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        info!(ticket_id = %id, title = %draft.title, "Ticket created");
        Ok(id)
    }
}

#[async_trait]
impl SettingsStore for LibSqlBackend {
    async fn load_agent_settings(
        &self,
    ) -> Result<std::collections::HashMap<String, String>, StoreError> {
        let mut rows = self
            .conn()
            .query("SELECT key, value FROM agent_settings", ())
            .await
            .map_err(query_err)?;

        let mut settings = std::collections::HashMap::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let key: String = row.get(0).map_err(query_err)?;
            let value: String = row.get(1).map_err(query_err)?;
            settings.insert(key, value);
        }
        Ok(settings)
    }

    async fn put_agent_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO agent_settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (key) DO UPDATE SET \
                 value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}
