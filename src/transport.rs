//! Mail-transport collaborator boundary
//!
//! The engine talks to the remote server exclusively through
//! [`MailTransport`]. Failures cross the boundary as a flat tagged
//! [`TransportError`] so the classifier pattern-matches on variants
//! instead of walking a wrapped cause chain. The shipped implementation
//! lives in [`crate::imap`]; tests script the boundary with a mock.

use thiserror::Error;

use crate::message::{FetchProfile, FetchTarget, MailMessage, SeqNum};
use crate::protocol::ProtocolTerm;

/// Transport-level failure
///
/// `Disconnected` and `Closed` mean the session is unusable and must be
/// reestablished before anything else is attempted. The remaining
/// variants describe a failed command on a live connection.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Remote end signaled termination or the connection dropped
    #[error("connection terminated: {0}")]
    Disconnected(String),
    /// Session, store, or mailbox handle already closed
    #[error("mailbox handle closed: {0}")]
    Closed(String),
    /// Command did not complete within the transport's deadline
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Any other command-level protocol failure
    #[error("protocol failure: {0}")]
    Protocol(String),
}

/// Inclusive 1-based sequence range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    /// First sequence number in the range
    pub first: SeqNum,
    /// Last sequence number in the range
    pub last: SeqNum,
}

impl SequenceRange {
    /// Create a range; `first` must not exceed `last`
    pub fn new(first: SeqNum, last: SeqNum) -> Self {
        debug_assert!(first >= 1 && first <= last);
        Self { first, last }
    }

    /// The full range of a mailbox with `count` messages
    pub fn full(count: u32) -> Self {
        Self {
            first: 1,
            last: count.max(1),
        }
    }

    /// Number of sequence numbers covered
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    /// Whether a sequence number falls inside the range
    pub fn contains(&self, seq: SeqNum) -> bool {
        (self.first..=self.last).contains(&seq)
    }
}

/// Capability provided by the external mail-transport component
///
/// Both operations block on the network (one await per round-trip); the
/// engine issues them sequentially on a single logical connection and
/// never shares an implementation between in-flight searches.
#[allow(async_fn_in_trait)]
pub trait MailTransport {
    /// Issue the remote search command over one sequence range
    ///
    /// Returns matching sequence numbers in ascending order.
    async fn delegated_search(
        &mut self,
        term: &ProtocolTerm,
        range: SequenceRange,
    ) -> Result<Vec<SeqNum>, TransportError>;

    /// Bulk-fetch message snapshots populated per the profile
    async fn fetch(
        &mut self,
        target: FetchTarget,
        profile: &FetchProfile,
    ) -> Result<Vec<MailMessage>, TransportError>;
}
