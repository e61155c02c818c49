//! Error taxonomy
//!
//! Mirrors the policy in the specification: store invariant violations and
//! initialization errors surface to the caller, everything else (LLM
//! extraction failures, embedding failures, a single degraded recall signal)
//! is absorbed at the component/coordinator boundary and never becomes a
//! public error variant.

use thiserror::Error;

/// Errors raised by the [`crate::store::MemoryStore`] and
/// [`crate::store::EpisodeStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A caller tried to insert a memory whose id already exists.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Embedding dimensionality did not match the store's configured
    /// dimensionality (mixing providers within one store instance).
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// `require_encryption` was set but the backing file is not encrypted.
    #[error("store requires encryption but {0} is not encrypted")]
    EncryptionRequired(String),

    /// Row contents could not be decoded into the expected Rust type.
    #[error("malformed row: {0}")]
    MalformedRow(String),
}

/// Top-level error type returned from [`crate::engine::Engine`]'s public API.
#[derive(Debug, Error)]
pub enum SouvenirError {
    /// An operation was attempted before [`crate::engine::Engine::initialize`].
    #[error("engine not initialized")]
    NotInitialized,

    /// Propagated verbatim from the store; always a programmer-visible,
    /// fatal-for-this-call condition.
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type Result<T> = std::result::Result<T, SouvenirError>;
