//! Caller-visible error model for the search engine
//!
//! Defines the typed error taxonomy using `thiserror`. Recoverable
//! search-command failures never appear here: they are absorbed by the
//! one-shot fallback to manual scan inside the engine. Everything a caller
//! can observe is one of the variants below.

use thiserror::Error;

/// Search error type
///
/// Covers all failure cases the engine surfaces to its caller. A caller
/// receives either a complete identifier list or exactly one of these,
/// never a partially merged or silently truncated result.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Underlying connection/session is no longer usable. The caller must
    /// reconnect and reopen the mailbox before retrying the whole call.
    #[error("mail server connection lost: {0}")]
    ConnectionLost(String),
    /// A candidate re-fetch failed during the refinement pass. Returning
    /// the unrefined candidate set instead would widen the result, so the
    /// failure is surfaced.
    #[error("candidate refinement failed: {0}")]
    Refinement(String),
    /// A bulk fetch failed during manual scan. Manual scan does not retry.
    #[error("message fetch failed: {0}")]
    Fetch(String),
    /// A `Single` term was constructed with an operand or operation that
    /// does not fit its field.
    #[error("invalid search term: {0}")]
    InvalidTerm(String),
}

impl SearchError {
    /// Convenience constructor for `InvalidTerm`
    pub fn invalid_term(msg: impl Into<String>) -> Self {
        Self::InvalidTerm(msg.into())
    }
}

/// Type alias for fallible return values
///
/// Use this for all engine functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type SearchResult<T> = Result<T, SearchError>;
