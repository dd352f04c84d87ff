//! Schema initialization.
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so this runs
//! unconditionally on startup.

use libsql::Connection;
use tracing::debug;

use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    // Idempotency ledger, one row per mailbox message id.
    "CREATE TABLE IF NOT EXISTS processed_messages (
        message_id TEXT PRIMARY KEY,
        sender TEXT NOT NULL,
        subject TEXT NOT NULL,
        classification TEXT NOT NULL,
        urgency TEXT NOT NULL,
        confidence REAL NOT NULL,
        summary TEXT NOT NULL,
        action_taken TEXT NOT NULL,
        ticket_id TEXT,
        forwarded_to TEXT,
        errors TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL,
        processing_time_ms INTEGER NOT NULL DEFAULT 0,
        processed_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_processed_messages_processed_at
        ON processed_messages (processed_at DESC)",
    "CREATE TABLE IF NOT EXISTS customers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        phone TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_customers_email ON customers (email)",
    "CREATE TABLE IF NOT EXISTS tickets (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        priority TEXT NOT NULL,
        customer_id TEXT,
        contact_email TEXT NOT NULL,
        source_message_id TEXT NOT NULL,
        conversation_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_tickets_source_message
        ON tickets (source_message_id)",
    "CREATE TABLE IF NOT EXISTS agent_settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

pub async fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    for statement in SCHEMA {
        conn.execute(statement, ())
            .await
            .map_err(|e| StoreError::Open(format!("schema init failed: {e}")))?;
    }
    debug!("Schema initialized");
    Ok(())
}
