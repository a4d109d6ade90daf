//! Engine-wide error taxonomy.
//!
//! Four classes with distinct handling:
//! - `TransientExternal` — AI service timeout/error; retried once, then the
//!   document degrades to pattern-lane-only. Never fails an ingestion.
//! - `MalformedInput` — unparseable unit (date, truncated excerpt); the unit
//!   is skipped and a warning annotation is recorded on the document.
//! - `DataConsistency` — a record referencing a document outside the case;
//!   fatal for that update, rejected before it can corrupt the snapshot.
//! - `Configuration` — invalid pattern library or deadline table; fatal at
//!   engine startup, never partially applied.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("AI reasoning service unavailable: {0}")]
    TransientExternal(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("data consistency violation: {0}")]
    DataConsistency(String),

    #[error("invalid engine configuration: {0}")]
    Configuration(String),

    #[error("unknown case: {0}")]
    UnknownCase(String),

    #[error("case store lock poisoned")]
    LockPoisoned,

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
