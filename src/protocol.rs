//! Wire translation of search terms
//!
//! Builds the SEARCH criteria understood by the remote server from a
//! predicate tree. Two forms exist: the exact translation, and a relaxed
//! translation in which wildcard leaves are widened to non-wildcard
//! supersets so the remote engine is never asked to interpret wildcard
//! semantics it cannot be trusted with. The relaxed form is only ever a
//! server-side pre-filter; callers narrow its result locally.

use chrono::NaiveDate;

use crate::message::MailFlag;
use crate::term::{MailField, Operand, SearchOperation, SearchTerm};

/// Opaque wire-format predicate for the remote search command
///
/// Owned exclusively by the translation step; the transport consumes the
/// criteria string and nothing else ever inspects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTerm(String);

impl ProtocolTerm {
    /// The SEARCH criteria string to hand to the transport
    pub fn as_criteria(&self) -> &str {
        &self.0
    }
}

impl SearchTerm {
    /// Exact wire form of the term
    pub fn to_protocol_term(&self) -> ProtocolTerm {
        ProtocolTerm(render(self, false))
    }

    /// Relaxed wire form: wildcard leaves widened to supersets
    ///
    /// Every message matching a wildcard leaf also matches its relaxation,
    /// so the server result is guaranteed over-inclusive, never lossy.
    pub fn to_relaxed_protocol_term(&self) -> ProtocolTerm {
        ProtocolTerm(render(self, true))
    }
}

/// Render one tree node into criteria text
fn render(term: &SearchTerm, relaxed: bool) -> String {
    match term {
        SearchTerm::Single {
            field,
            operation,
            operand,
        } => render_single(*field, *operation, operand, relaxed),
        SearchTerm::And(children) => {
            if children.is_empty() {
                return "ALL".to_owned();
            }
            children
                .iter()
                .map(|child| render(child, relaxed))
                .collect::<Vec<_>>()
                .join(" ")
        }
        SearchTerm::Or(children) => match children.len() {
            // No FALSE criterion exists in the protocol.
            0 => "NOT ALL".to_owned(),
            1 => render(&children[0], relaxed),
            _ => {
                // OR is binary on the wire; fold right-associatively.
                let mut rendered = children.iter().rev().map(|child| render(child, relaxed));
                let mut folded = rendered.next().unwrap_or_default();
                for child in rendered {
                    folded = format!("OR {child} {folded}");
                }
                folded
            }
        },
        SearchTerm::Not(children) => {
            if children.is_empty() {
                return "ALL".to_owned();
            }
            children
                .iter()
                .map(|child| format!("NOT {}", parenthesize(child, relaxed)))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }
}

/// Render a child of NOT, grouping multi-criteria children
///
/// NOT binds a single key on the wire; a child that renders to several
/// space-joined criteria must be wrapped in a parenthesized list.
fn parenthesize(term: &SearchTerm, relaxed: bool) -> String {
    let rendered = render(term, relaxed);
    if key_count(term) > 1 {
        format!("({rendered})")
    } else {
        rendered
    }
}

/// Number of top-level criteria keys a node renders to
///
/// `OR a b` and `NOT x` are single keys; an AND (and a multi-child NOT)
/// renders one key per member.
fn key_count(term: &SearchTerm) -> usize {
    match term {
        SearchTerm::Single { .. } => 1,
        SearchTerm::And(children) => {
            if children.is_empty() {
                1
            } else {
                children.iter().map(key_count).sum()
            }
        }
        SearchTerm::Or(children) => match children.len() {
            0 => 1,
            1 => key_count(&children[0]),
            _ => 1,
        },
        SearchTerm::Not(children) => children.len().max(1),
    }
}

/// Render one leaf comparison
fn render_single(
    field: MailField,
    operation: SearchOperation,
    operand: &Operand,
    relaxed: bool,
) -> String {
    match (operation, operand) {
        (SearchOperation::Contains, Operand::Text(needle)) => {
            if relaxed && needle.contains(['*', '?']) {
                return render_relaxed_text(field, needle);
            }
            render_text(field, needle)
        }
        (SearchOperation::Before, Operand::Date(date)) => match field {
            MailField::SentDate => format!("SENTBEFORE {}", imap_date(*date)),
            _ => format!("BEFORE {}", imap_date(*date)),
        },
        (SearchOperation::On, Operand::Date(date)) => match field {
            MailField::SentDate => format!("SENTON {}", imap_date(*date)),
            _ => format!("ON {}", imap_date(*date)),
        },
        (SearchOperation::Since, Operand::Date(date)) => match field {
            MailField::SentDate => format!("SENTSINCE {}", imap_date(*date)),
            _ => format!("SINCE {}", imap_date(*date)),
        },
        (SearchOperation::Larger, Operand::Size(size)) => format!("LARGER {size}"),
        (SearchOperation::Smaller, Operand::Size(size)) => format!("SMALLER {size}"),
        (SearchOperation::IsSet, Operand::Flag(flag)) => flag_criterion(*flag, true).to_owned(),
        (SearchOperation::IsUnset, Operand::Flag(flag)) => flag_criterion(*flag, false).to_owned(),
        // Construction-time validation makes these unreachable; render a
        // neutral criterion rather than corrupting the command.
        _ => "ALL".to_owned(),
    }
}

/// Criteria key and quoted needle for one text field
fn render_text(field: MailField, needle: &str) -> String {
    let quoted = escape_quoted(needle);
    match field {
        MailField::From => format!("FROM \"{quoted}\""),
        MailField::To => format!("TO \"{quoted}\""),
        MailField::Cc => format!("CC \"{quoted}\""),
        MailField::Bcc => format!("BCC \"{quoted}\""),
        MailField::Subject => format!("SUBJECT \"{quoted}\""),
        MailField::Body => format!("BODY \"{quoted}\""),
        MailField::Full => format!("TEXT \"{quoted}\""),
        MailField::ContentType => format!("HEADER Content-Type \"{quoted}\""),
        // Non-text fields never reach here.
        _ => "ALL".to_owned(),
    }
}

/// Widen a wildcard needle to an ANDed superset of its literal fragments
///
/// Splitting on wildcard characters yields the literal runs every matching
/// message must contain; a needle that is nothing but wildcards widens to
/// the match-all criterion.
fn render_relaxed_text(field: MailField, needle: &str) -> String {
    let fragments: Vec<&str> = needle
        .split(['*', '?'])
        .filter(|fragment| !fragment.is_empty())
        .collect();

    if fragments.is_empty() {
        return "ALL".to_owned();
    }

    fragments
        .iter()
        .map(|fragment| render_text(field, fragment))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape backslashes and quotes for quoted strings
fn escape_quoted(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Format date as SEARCH date-text (e.g., "1-Jan-2025")
fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Criterion atom for a system flag
fn flag_criterion(flag: MailFlag, set: bool) -> &'static str {
    match (flag, set) {
        (MailFlag::Seen, true) => "SEEN",
        (MailFlag::Seen, false) => "UNSEEN",
        (MailFlag::Answered, true) => "ANSWERED",
        (MailFlag::Answered, false) => "UNANSWERED",
        (MailFlag::Flagged, true) => "FLAGGED",
        (MailFlag::Flagged, false) => "UNFLAGGED",
        (MailFlag::Deleted, true) => "DELETED",
        (MailFlag::Deleted, false) => "UNDELETED",
        (MailFlag::Draft, true) => "DRAFT",
        (MailFlag::Draft, false) => "UNDRAFT",
        (MailFlag::Recent, true) => "RECENT",
        (MailFlag::Recent, false) => "OLD",
    }
}
