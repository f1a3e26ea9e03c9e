//! Crate-level error types for command execution, storage, and projections.
//!
//! All errors are returned, never thrown: guard failures accumulate into a
//! non-empty message list, everything else short-circuits.

use crate::tag::AggregateId;

/// A persisted payload could not be decoded back into its event type.
///
/// Inside command handling this is fatal for the call (the loaded stream
/// is incoherent); inside a projection it halts that projection without
/// advancing its cursor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot decode event payload: {raw}")]
pub struct EventDecodingFailure {
    /// The raw payload as read from the store.
    pub raw: String,
}

/// Errors reported by an event store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the stream moved past the version
    /// the writer loaded. Retryable by re-running the command from a fresh
    /// load.
    #[error("unexpected version for '{id}': expected {expected}, actual {actual}")]
    UnexpectedVersion {
        /// The aggregate instance the append targeted.
        id: AggregateId,
        /// The version the writer expected the stream to be at.
        expected: u64,
        /// The version the stream was actually at.
        actual: u64,
    },

    /// The aggregate was never created.
    ///
    /// The in-memory backend never reports this (a missing stream reads as
    /// empty); it exists for backends that distinguish the case.
    #[error("aggregate '{0}' does not exist")]
    DoesNotExist(AggregateId),

    /// Backend I/O failure. Not retryable by the core.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Error returned when executing a command against an aggregate fails.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// No clause of the flow's current command handler matched the command.
    #[error("no command handler matched the command")]
    HandlerNotFound,

    /// One or more guards failed. Carries every failing guard's message,
    /// in declaration order. The list is never empty.
    #[error("command rejected: {}", .0.join("; "))]
    CommandRejected(Vec<String>),

    /// A store operation failed (version conflict, backend failure).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A persisted event in the loaded stream could not be decoded.
    #[error(transparent)]
    Decoding(#[from] EventDecodingFailure),
}

/// Error returned when advancing a projection fails.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    /// Reading the operation log or an event payload failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An event payload could not be decoded; the projection halts and its
    /// cursor stays on the last fully-folded entry.
    #[error(transparent)]
    Decoding(#[from] EventDecodingFailure),
}
