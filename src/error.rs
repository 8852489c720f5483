//! Typed domain errors surfaced by the core. Ingestion and fan-out failures
//! are logged/counted locally per spec; only startup and explicit
//! control-plane operations propagate errors to callers.

#[derive(Debug, thiserror::Error)]
pub enum PulsegridError {
    #[error("ingest validation failed: {0}")]
    IngestValidation(String),

    #[error("store write failed: {0}")]
    StoreTransient(#[source] anyhow::Error),

    #[error("subscriber {0} is dead")]
    SubscriberDead(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

pub type Result<T> = std::result::Result<T, PulsegridError>;
