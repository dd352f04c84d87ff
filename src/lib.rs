//! Mail Triage — inbound email triage agent.
//!
//! Fetches unread mailbox messages, classifies them with an LLM, applies
//! policy thresholds to decide auto-reply / auto-ticket / forward, and
//! records one ledger row per message for idempotency and audit.

pub mod classifier;
pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod store;
