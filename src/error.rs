//! Error types for Mail Triage.

/// Top-level error type for the agent.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mailbox error: {0}")]
    Mail(#[from] MailError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors from the libSQL store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Authorization rejected (expired/revoked token). The orchestrator
    /// invalidates cached credentials and retries the fetch exactly once
    /// on this variant.
    #[error("Mailbox authorization failed: {0}")]
    Unauthorized(String),

    #[error("Mailbox request failed with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Mailbox request failed: {0}")]
    Request(String),

    #[error("Invalid mailbox response: {0}")]
    InvalidResponse(String),
}

/// LLM classifier errors. All variants degrade to the same fallback
/// `Analysis` at the adapter boundary.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Failed to parse model judgment: {0}")]
    Parse(String),
}

/// Pipeline-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to load agent config: {0}")]
    ConfigLoad(String),

    #[error("Mailbox fetch failed: {0}")]
    Fetch(String),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
