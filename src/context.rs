//! Per-call mailbox snapshot
//!
//! A [`MailboxContext`] captures everything strategy selection needs about
//! the target mailbox at the moment a search call starts: message count,
//! declared server capabilities, and the tuning snapshot. It is created
//! per call and read-only for the call's duration; the caller guarantees
//! the underlying mailbox handle stays open that long.

use std::collections::BTreeSet;

use crate::config::SearchTuning;

/// Declared server capability atoms
///
/// Lookup is case-insensitive; atoms are normalized to uppercase on
/// insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(BTreeSet<String>);

impl Capabilities {
    /// Build from declared capability atoms
    pub fn from_atoms<I, S>(atoms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            atoms
                .into_iter()
                .map(|atom| atom.as_ref().to_ascii_uppercase())
                .collect(),
        )
    }

    /// Whether a capability atom was declared
    pub fn has(&self, atom: &str) -> bool {
        self.0.contains(&atom.to_ascii_uppercase())
    }

    /// Whether the server offers a native search command
    ///
    /// The base protocol revisions imply it; a bare `SEARCH` atom is also
    /// accepted for servers that advertise it explicitly.
    pub fn supports_search(&self) -> bool {
        self.has("SEARCH") || self.has("IMAP4REV1") || self.has("IMAP4REV2")
    }
}

/// Snapshot of the target mailbox for one search call
#[derive(Debug, Clone)]
pub struct MailboxContext {
    /// Mailbox name, for diagnostics only
    pub mailbox: String,
    /// Message count at scan start; every returned identifier lies in
    /// `[1, message_count]`
    pub message_count: u32,
    /// Capabilities declared by the server for this connection
    pub capabilities: Capabilities,
    /// Tuning snapshot taken at call start
    pub tuning: SearchTuning,
}

impl MailboxContext {
    /// Create a snapshot for one search call
    pub fn new(
        mailbox: impl Into<String>,
        message_count: u32,
        capabilities: Capabilities,
        tuning: SearchTuning,
    ) -> Self {
        Self {
            mailbox: mailbox.into(),
            message_count,
            capabilities,
            tuning,
        }
    }
}
