//! Predicate-tree query model
//!
//! A search term is a closed tagged union: field comparisons at the leaves,
//! boolean composition above them. Evaluation (`matches`) is a pure
//! function of a fetched message snapshot; translation to the wire form
//! lives in [`crate::protocol`]. Operand/field compatibility is checked at
//! construction time so the evaluator never sees an ill-typed leaf.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::errors::{SearchError, SearchResult};
use crate::message::{MailFlag, MailMessage};

/// Message attribute categories a term may compare against
///
/// `Body` and `Full` are the full-content fields: a term referencing
/// either forces the full fetch profile when local evaluation is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MailField {
    /// From header addresses
    From,
    /// To header addresses
    To,
    /// Cc header addresses
    Cc,
    /// Bcc header addresses
    Bcc,
    /// Decoded Subject header
    Subject,
    /// Message body text
    Body,
    /// Headers and body together
    Full,
    /// Content-Type of the top-level entity
    ContentType,
    /// Date header (sender clock)
    SentDate,
    /// Internal date (server clock)
    ReceivedDate,
    /// Message size in octets
    Size,
    /// System flags
    Flags,
}

impl MailField {
    /// Whether evaluating this field needs the full message content
    pub fn needs_full_content(self) -> bool {
        matches!(self, Self::Body | Self::Full)
    }

    /// Whether this field compares text
    pub fn is_text(self) -> bool {
        matches!(
            self,
            Self::From
                | Self::To
                | Self::Cc
                | Self::Bcc
                | Self::Subject
                | Self::Body
                | Self::Full
                | Self::ContentType
        )
    }

    /// Whether this field compares dates
    pub fn is_date(self) -> bool {
        matches!(self, Self::SentDate | Self::ReceivedDate)
    }
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchOperation {
    /// Case-insensitive substring (text fields; operands may carry `*`/`?`)
    Contains,
    /// Strictly earlier than the operand date
    Before,
    /// Exactly on the operand date
    On,
    /// On or later than the operand date
    Since,
    /// Strictly more octets than the operand
    Larger,
    /// Strictly fewer octets than the operand
    Smaller,
    /// Flag is set
    IsSet,
    /// Flag is not set
    IsUnset,
}

/// Comparison operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Text needle, possibly containing `*`/`?` wildcards
    Text(String),
    /// Calendar date, time-of-day disregarded
    Date(NaiveDate),
    /// Size in octets
    Size(u32),
    /// System flag
    Flag(MailFlag),
}

/// Composable, typed query over message attributes
///
/// Composite nodes with zero children are valid sentinels: `And([])`
/// matches everything, `Or([])` matches nothing, and `Not([])` matches
/// everything (no child matches).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchTerm {
    /// Leaf comparison of one field against one operand
    Single {
        /// Attribute under comparison
        field: MailField,
        /// Comparison operation
        operation: SearchOperation,
        /// Comparison operand
        operand: Operand,
    },
    /// Every child must match
    And(Vec<SearchTerm>),
    /// At least one child must match
    Or(Vec<SearchTerm>),
    /// No child may match
    Not(Vec<SearchTerm>),
}

impl SearchTerm {
    /// Construct a leaf term, validating field/operation/operand fit
    ///
    /// # Errors
    ///
    /// Returns `InvalidTerm` when the operation or operand type does not
    /// belong to the field (for example a date operand against `Subject`).
    pub fn single(
        field: MailField,
        operation: SearchOperation,
        operand: Operand,
    ) -> SearchResult<Self> {
        let compatible = match field {
            f if f.is_text() => {
                matches!(operation, SearchOperation::Contains)
                    && matches!(operand, Operand::Text(_))
            }
            f if f.is_date() => {
                matches!(
                    operation,
                    SearchOperation::Before | SearchOperation::On | SearchOperation::Since
                ) && matches!(operand, Operand::Date(_))
            }
            MailField::Size => {
                matches!(
                    operation,
                    SearchOperation::Larger | SearchOperation::Smaller
                ) && matches!(operand, Operand::Size(_))
            }
            MailField::Flags => {
                matches!(operation, SearchOperation::IsSet | SearchOperation::IsUnset)
                    && matches!(operand, Operand::Flag(_))
            }
            _ => false,
        };

        if !compatible {
            return Err(SearchError::invalid_term(format!(
                "operation {operation:?} with operand {operand:?} does not fit field {field:?}"
            )));
        }

        Ok(Self::Single {
            field,
            operation,
            operand,
        })
    }

    /// Evaluate the term against a fetched message snapshot
    ///
    /// Pure function of message content and field set; performs no I/O.
    /// Attributes absent from the snapshot simply fail to match.
    pub fn matches(&self, message: &MailMessage) -> bool {
        match self {
            Self::Single {
                field,
                operation,
                operand,
            } => match_single(message, *field, *operation, operand),
            Self::And(children) => children.iter().all(|child| child.matches(message)),
            Self::Or(children) => children.iter().any(|child| child.matches(message)),
            Self::Not(children) => !children.iter().any(|child| child.matches(message)),
        }
    }

    /// Whether any text leaf carries a `*` or `?` wildcard
    pub fn contains_wildcard(&self) -> bool {
        match self {
            Self::Single {
                operand: Operand::Text(text),
                ..
            } => text.contains(['*', '?']),
            Self::Single { .. } => false,
            Self::And(children) | Self::Or(children) | Self::Not(children) => {
                children.iter().any(Self::contains_wildcard)
            }
        }
    }

    /// Whether every text operand in the tree is pure ASCII
    ///
    /// Non-text operands are trivially ASCII. Server-side comparison is
    /// only trusted for ASCII needles; a false result makes delegated
    /// candidates eligible for the refinement pass.
    pub fn is_ascii(&self) -> bool {
        match self {
            Self::Single {
                operand: Operand::Text(text),
                ..
            } => text.is_ascii(),
            Self::Single { .. } => true,
            Self::And(children) | Self::Or(children) | Self::Not(children) => {
                children.iter().all(Self::is_ascii)
            }
        }
    }

    /// Fields referenced by any leaf of the tree
    pub fn referenced_fields(&self) -> BTreeSet<MailField> {
        let mut fields = BTreeSet::new();
        self.collect_fields(&mut fields);
        fields
    }

    fn collect_fields(&self, fields: &mut BTreeSet<MailField>) {
        match self {
            Self::Single { field, .. } => {
                fields.insert(*field);
            }
            Self::And(children) | Self::Or(children) | Self::Not(children) => {
                for child in children {
                    child.collect_fields(fields);
                }
            }
        }
    }
}

/// Evaluate one leaf comparison
fn match_single(
    message: &MailMessage,
    field: MailField,
    operation: SearchOperation,
    operand: &Operand,
) -> bool {
    match (operation, operand) {
        (SearchOperation::Contains, Operand::Text(needle)) => field_text(message, field)
            .map(|haystack| text_matches(&haystack, needle))
            .unwrap_or(false),
        (SearchOperation::Before, Operand::Date(date)) => field_date(message, field)
            .map(|actual| actual < *date)
            .unwrap_or(false),
        (SearchOperation::On, Operand::Date(date)) => field_date(message, field)
            .map(|actual| actual == *date)
            .unwrap_or(false),
        (SearchOperation::Since, Operand::Date(date)) => field_date(message, field)
            .map(|actual| actual >= *date)
            .unwrap_or(false),
        (SearchOperation::Larger, Operand::Size(size)) => message.size > *size,
        (SearchOperation::Smaller, Operand::Size(size)) => message.size < *size,
        (SearchOperation::IsSet, Operand::Flag(flag)) => message.flags.contains(flag),
        (SearchOperation::IsUnset, Operand::Flag(flag)) => !message.flags.contains(flag),
        // Construction-time validation makes these unreachable.
        _ => false,
    }
}

/// Text haystack for a field, if the snapshot carries it
fn field_text(message: &MailMessage, field: MailField) -> Option<String> {
    match field {
        MailField::From => Some(message.from.join(", ")),
        MailField::To => Some(message.to.join(", ")),
        MailField::Cc => Some(message.cc.join(", ")),
        MailField::Bcc => Some(message.bcc.join(", ")),
        MailField::Subject => message.subject.clone(),
        MailField::Body => message.body_text.clone(),
        MailField::Full => match (&message.header_text, &message.body_text) {
            (None, None) => None,
            (headers, body) => Some(format!(
                "{}\n{}",
                headers.as_deref().unwrap_or(""),
                body.as_deref().unwrap_or("")
            )),
        },
        MailField::ContentType => message.content_type.clone(),
        _ => None,
    }
}

/// Date value for a field, if the snapshot carries it
fn field_date(message: &MailMessage, field: MailField) -> Option<NaiveDate> {
    match field {
        MailField::SentDate => message.sent_date,
        MailField::ReceivedDate => message.received_date,
        _ => None,
    }
}

/// Case-insensitive substring test, generalized for wildcard needles
///
/// A needle without wildcards is a plain substring check. A needle with
/// `*`/`?` is compiled to an unanchored case-insensitive regex (`*` spans
/// any run, `?` one character, everything else literal).
fn text_matches(haystack: &str, needle: &str) -> bool {
    if !needle.contains(['*', '?']) {
        return haystack.to_lowercase().contains(&needle.to_lowercase());
    }

    let mut pattern = String::with_capacity(needle.len() * 2);
    for ch in needle.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => {
                let mut buf = [0u8; 4];
                pattern.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }

    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}
