//! Message snapshot and fetch-profile types
//!
//! Defines the locally evaluable representation of a fetched message and
//! the profile describing which attributes a fetch must populate. The
//! profile is derived from a search term so manual scan and refinement
//! fetch only what local evaluation actually needs.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::term::MailField;

/// 1-based message position within one open mailbox
///
/// Valid only for the [`crate::context::MailboxContext`] that produced it.
/// Positions are not stable across a mailbox reopen or an expunge event.
pub type SeqNum = u32;

/// IMAP system flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MailFlag {
    /// `\Seen`
    Seen,
    /// `\Answered`
    Answered,
    /// `\Flagged`
    Flagged,
    /// `\Deleted`
    Deleted,
    /// `\Draft`
    Draft,
    /// `\Recent`
    Recent,
}

/// Locally evaluable message snapshot
///
/// Populated from a transport fetch according to a [`FetchProfile`].
/// Fields outside the requested profile are left empty; evaluating a term
/// against a message fetched with a narrower profile than the term needs
/// simply fails to match.
#[derive(Debug, Clone, Default)]
pub struct MailMessage {
    /// 1-based sequence number within the open mailbox
    pub seq: SeqNum,
    /// From addresses as displayable strings
    pub from: Vec<String>,
    /// To addresses
    pub to: Vec<String>,
    /// Cc addresses
    pub cc: Vec<String>,
    /// Bcc addresses
    pub bcc: Vec<String>,
    /// Decoded Subject header
    pub subject: Option<String>,
    /// Date header (sender clock), date part only
    pub sent_date: Option<NaiveDate>,
    /// Internal date (server clock), date part only
    pub received_date: Option<NaiveDate>,
    /// Message size in octets
    pub size: u32,
    /// System flags set on the message
    pub flags: BTreeSet<MailFlag>,
    /// Content-Type of the top-level entity
    pub content_type: Option<String>,
    /// Raw header block as text, for full-content matching
    pub header_text: Option<String>,
    /// Content-type-sensitive plain text body (HTML parts converted)
    pub body_text: Option<String>,
}

impl MailMessage {
    /// Create an empty snapshot for the given sequence number
    pub fn new(seq: SeqNum) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }
}

/// Attribute profile for a transport fetch
///
/// `fields` drives which headers/attributes must be populated;
/// `full_content` additionally requests the message body (and forces a
/// whole-message fetch in the shipped adapter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchProfile {
    /// Message attributes local evaluation will read
    pub fields: BTreeSet<MailField>,
    /// Whether the full message content is required
    pub full_content: bool,
}

impl FetchProfile {
    /// Derive the minimal profile needed to evaluate `term` locally
    ///
    /// Always includes the synthetic `ContentType` field: `matches()` for
    /// content-bearing comparisons needs the content type to disambiguate
    /// encoding even when the term never asks for it explicitly.
    pub fn for_term(term: &crate::term::SearchTerm) -> Self {
        let mut fields = term.referenced_fields();
        let full_content = fields
            .iter()
            .any(|field| field.needs_full_content());
        fields.insert(MailField::ContentType);
        Self {
            fields,
            full_content,
        }
    }

    /// Profile requesting complete messages
    pub fn full() -> Self {
        Self {
            fields: BTreeSet::new(),
            full_content: true,
        }
    }
}

/// Target of a transport fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    /// A contiguous inclusive sequence range
    Range(crate::transport::SequenceRange),
    /// An explicit list of sequence numbers, fetched in list order
    Sequences(Vec<SeqNum>),
}
