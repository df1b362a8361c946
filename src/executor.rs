//! Delegated search execution and candidate refinement
//!
//! Issues the delegated round-trip(s) selected by the planner and, when
//! asked, narrows a candidate set by re-fetching and re-evaluating it
//! locally. Round-trips are sequential in ascending range order; results
//! are concatenated in that order and never reordered downstream.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::classify::{FailureClass, classify};
use crate::context::MailboxContext;
use crate::errors::{SearchError, SearchResult};
use crate::message::{FetchProfile, FetchTarget, SeqNum};
use crate::term::SearchTerm;
use crate::transport::{MailTransport, SequenceRange};

/// Partition `[1, message_count]` into consecutive chunk ranges
///
/// Ranges are non-overlapping, in ascending order, and cover the whole
/// mailbox; the last range is truncated to the remainder. A zero chunk
/// size would never terminate, so it degrades to one full-range chunk.
pub fn chunk_ranges(message_count: u32, chunk_size: u32) -> Vec<SequenceRange> {
    if message_count == 0 {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![SequenceRange::full(message_count)];
    }

    let mut ranges = Vec::with_capacity((message_count / chunk_size + 1) as usize);
    let mut first = 1u32;
    while first <= message_count {
        let last = first.saturating_add(chunk_size - 1).min(message_count);
        ranges.push(SequenceRange::new(first, last));
        first = last + 1;
    }
    ranges
}

/// Issue the delegated search round-trip(s)
///
/// Sends the relaxed wire form when the term carries wildcards (the
/// remote engine cannot be trusted with wildcard semantics, so it only
/// pre-filters) and the exact form otherwise. Identifiers outside
/// `[1, message_count]` are discarded defensively; a mailbox mutated
/// mid-scan must not leak positions the snapshot never covered.
///
/// Returns `Some(candidates)` on success and `None` on a recoverable
/// failure, in which case the caller falls back to manual scan.
///
/// # Errors
///
/// Propagates `ConnectionLost` immediately on a fatal classification.
pub(crate) async fn delegated_candidates<T: MailTransport>(
    transport: &mut T,
    term: &SearchTerm,
    ctx: &MailboxContext,
) -> SearchResult<Option<Vec<SeqNum>>> {
    let wire = if term.contains_wildcard() {
        term.to_relaxed_protocol_term()
    } else {
        term.to_protocol_term()
    };

    let ranges = if ctx.tuning.chunk_enabled {
        chunk_ranges(ctx.message_count, ctx.tuning.fetch_limit)
    } else {
        vec![SequenceRange::full(ctx.message_count)]
    };
    debug!(
        mailbox = %ctx.mailbox,
        chunks = ranges.len(),
        criteria = wire.as_criteria(),
        "issuing delegated search"
    );

    let mut candidates = Vec::new();
    for range in ranges {
        match transport.delegated_search(&wire, range).await {
            Ok(batch) => {
                for seq in batch {
                    if seq >= 1 && seq <= ctx.message_count {
                        candidates.push(seq);
                    } else {
                        warn!(
                            mailbox = %ctx.mailbox,
                            seq,
                            message_count = ctx.message_count,
                            "discarding out-of-range identifier from delegated search"
                        );
                    }
                }
            }
            Err(error) => match classify(&error) {
                FailureClass::Fatal => {
                    return Err(SearchError::ConnectionLost(error.to_string()));
                }
                FailureClass::Recoverable => {
                    warn!(
                        mailbox = %ctx.mailbox,
                        %error,
                        "delegated search failed, falling back to manual scan"
                    );
                    return Ok(None);
                }
            },
        }
    }

    Ok(Some(candidates))
}

/// Narrow a candidate set by local re-evaluation
///
/// Re-fetches each candidate with the term's profile and keeps, in
/// candidate order, exactly those whose snapshot satisfies the term. The
/// result is a subset of the input by construction. A candidate the
/// fetch does not return (expunged meanwhile) is dropped; dropping
/// narrows, which is always safe here.
///
/// # Errors
///
/// A fetch failure surfaces as `Refinement` (or `ConnectionLost` when
/// fatal): a partial pass cannot report a trustworthy result.
pub(crate) async fn refine<T: MailTransport>(
    transport: &mut T,
    term: &SearchTerm,
    candidates: Vec<SeqNum>,
    profile: &FetchProfile,
) -> SearchResult<Vec<SeqNum>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    debug!(count = candidates.len(), "refining delegated candidates");
    let messages = transport
        .fetch(FetchTarget::Sequences(candidates.clone()), profile)
        .await
        .map_err(|error| match classify(&error) {
            FailureClass::Fatal => SearchError::ConnectionLost(error.to_string()),
            FailureClass::Recoverable => SearchError::Refinement(error.to_string()),
        })?;

    let matched: BTreeSet<SeqNum> = messages
        .iter()
        .filter(|message| term.matches(message))
        .map(|message| message.seq)
        .collect();

    Ok(candidates
        .into_iter()
        .filter(|seq| matched.contains(seq))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{chunk_ranges, delegated_candidates, refine};
    use crate::config::SearchTuning;
    use crate::context::{Capabilities, MailboxContext};
    use crate::errors::SearchError;
    use crate::message::{FetchProfile, MailMessage};
    use crate::term::{MailField, Operand, SearchOperation, SearchTerm};
    use crate::transport::{TransportError, mock::MockTransport};

    fn subject_term(needle: &str) -> SearchTerm {
        SearchTerm::single(
            MailField::Subject,
            SearchOperation::Contains,
            Operand::Text(needle.to_owned()),
        )
        .expect("term must construct")
    }

    fn ctx(message_count: u32, chunk_enabled: bool, fetch_limit: u32) -> MailboxContext {
        MailboxContext::new(
            "INBOX",
            message_count,
            Capabilities::from_atoms(["IMAP4REV1"]),
            SearchTuning {
                chunk_enabled,
                fetch_limit,
                ..SearchTuning::default()
            },
        )
    }

    #[test]
    fn chunk_ranges_partition_without_gap_or_overlap() {
        let ranges = chunk_ranges(250, 100);
        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].first, ranges[0].last), (1, 100));
        assert_eq!((ranges[1].first, ranges[1].last), (101, 200));
        assert_eq!((ranges[2].first, ranges[2].last), (201, 250));

        let covered: u32 = ranges.iter().map(|r| r.len()).sum();
        assert_eq!(covered, 250);
    }

    #[test]
    fn chunk_ranges_handle_degenerate_sizes() {
        assert!(chunk_ranges(0, 100).is_empty());
        assert_eq!(chunk_ranges(10, 0).len(), 1);
        assert_eq!(chunk_ranges(100, 100).len(), 1);
        assert_eq!(chunk_ranges(101, 100).len(), 2);
    }

    #[tokio::test]
    async fn chunked_search_issues_one_round_trip_per_range_in_order() {
        let mut transport = MockTransport::default()
            .script_search(Ok(vec![5, 42]))
            .script_search(Ok(vec![150]))
            .script_search(Ok(vec![250]));

        let candidates = delegated_candidates(&mut transport, &subject_term("x"), &ctx(250, true, 100))
            .await
            .expect("no fatal error")
            .expect("delegation succeeds");

        assert_eq!(candidates, vec![5, 42, 150, 250]);
        assert_eq!(transport.search_calls.len(), 3);
        assert_eq!(
            (transport.search_calls[0].1.first, transport.search_calls[0].1.last),
            (1, 100)
        );
        assert_eq!(
            (transport.search_calls[2].1.first, transport.search_calls[2].1.last),
            (201, 250)
        );
    }

    #[tokio::test]
    async fn out_of_range_identifiers_are_discarded() {
        let mut transport = MockTransport::default().script_search(Ok(vec![1, 99, 300]));

        let candidates = delegated_candidates(&mut transport, &subject_term("x"), &ctx(100, false, 1_000))
            .await
            .expect("no fatal error")
            .expect("delegation succeeds");

        assert_eq!(candidates, vec![1, 99]);
    }

    #[tokio::test]
    async fn wildcard_terms_send_the_relaxed_form() {
        let mut transport = MockTransport::default().script_search(Ok(Vec::new()));

        delegated_candidates(&mut transport, &subject_term("inv*ce"), &ctx(10, false, 1_000))
            .await
            .expect("no fatal error");

        assert_eq!(transport.search_calls[0].0, "SUBJECT \"inv\" SUBJECT \"ce\"");
    }

    #[tokio::test]
    async fn recoverable_failure_yields_none() {
        let mut transport = MockTransport::default()
            .script_search(Err(TransportError::Protocol("NO SEARCH failed".to_owned())));

        let outcome = delegated_candidates(&mut transport, &subject_term("x"), &ctx(10, false, 1_000))
            .await
            .expect("recoverable failure is absorbed");
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn fatal_failure_propagates_and_stops_round_trips() {
        let mut transport = MockTransport::default()
            .script_search(Err(TransportError::Disconnected("BYE".to_owned())))
            .script_search(Ok(vec![150]));

        let error = delegated_candidates(&mut transport, &subject_term("x"), &ctx(250, true, 100))
            .await
            .expect_err("fatal failure must propagate");
        assert!(matches!(error, SearchError::ConnectionLost(_)));
        assert_eq!(transport.search_calls.len(), 1);
    }

    #[tokio::test]
    async fn refinement_narrows_and_preserves_candidate_order() {
        let mut matching = MailMessage::new(7);
        matching.subject = Some("Grüße".to_owned());
        let mut other = MailMessage::new(3);
        other.subject = Some("unrelated".to_owned());

        let term = subject_term("grüße");
        let profile = FetchProfile::for_term(&term);
        let mut transport = MockTransport::with_messages(vec![matching, other]);

        let refined = refine(&mut transport, &term, vec![7, 3, 12], &profile)
            .await
            .expect("refinement succeeds");

        // 3 does not match, 12 is gone from the mailbox; both narrow away.
        assert_eq!(refined, vec![7]);
        assert_eq!(transport.fetch_calls.len(), 1);
    }

    #[tokio::test]
    async fn refinement_fetch_failure_is_surfaced() {
        let term = subject_term("grüße");
        let profile = FetchProfile::for_term(&term);
        let mut transport = MockTransport::default();
        transport.fetch_failure = Some(TransportError::Timeout("FETCH".to_owned()));

        let error = refine(&mut transport, &term, vec![1], &profile)
            .await
            .expect_err("refinement failure must surface");
        assert!(matches!(error, SearchError::Refinement(_)));

        let mut transport = MockTransport::default();
        transport.fetch_failure = Some(TransportError::Disconnected("BYE".to_owned()));
        let error = refine(&mut transport, &term, vec![1], &profile)
            .await
            .expect_err("fatal refinement failure must surface");
        assert!(matches!(error, SearchError::ConnectionLost(_)));
    }
}
