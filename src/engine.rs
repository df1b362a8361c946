//! Search orchestration
//!
//! The sole public entry point. Plans a strategy, runs the delegated
//! and/or manual executors, consults the failure classifier through them,
//! optionally narrows delegated candidates, and assembles the final
//! identifier list. Recoverable delegated failures fall back to manual
//! scan exactly once; manual scan never re-attempts delegation.

use tracing::debug;

use crate::context::MailboxContext;
use crate::errors::SearchResult;
use crate::executor;
use crate::message::SeqNum;
use crate::planner::{self, SearchStrategy};
use crate::scan;
use crate::term::SearchTerm;
use crate::transport::MailTransport;

/// Search a mailbox for messages matching a term
///
/// Returns matching 1-based sequence numbers: ascending for delegated
/// execution, fetch order for manual scan. An empty mailbox
/// short-circuits to an empty result with no transport call.
///
/// # Errors
///
/// - `ConnectionLost` when the transport reports the session unusable, at
///   any stage, with no fallback attempted
/// - `Refinement` when a candidate re-fetch fails during narrowing
/// - `Fetch` when the manual-scan bulk fetch fails
pub async fn search<T: MailTransport>(
    transport: &mut T,
    term: &SearchTerm,
    ctx: &MailboxContext,
) -> SearchResult<Vec<SeqNum>> {
    if ctx.message_count == 0 {
        return Ok(Vec::new());
    }

    let plan = planner::plan(term, ctx);
    debug!(
        mailbox = %ctx.mailbox,
        strategy = ?plan.strategy,
        message_count = ctx.message_count,
        "search strategy selected"
    );

    if !plan.strategy.is_delegated() {
        let hits = scan::manual_scan(transport, term, ctx, &plan.profile).await?;
        return Ok(assemble(hits, ctx.message_count));
    }

    match executor::delegated_candidates(transport, term, ctx).await? {
        Some(candidates) => {
            if planner::should_refine(term, candidates.len(), &ctx.tuning, plan.verbatim) {
                debug!(
                    mailbox = %ctx.mailbox,
                    strategy = ?SearchStrategy::DelegatedThenRefine,
                    candidates = candidates.len(),
                    "narrowing delegated candidates"
                );
                let refined = executor::refine(transport, term, candidates, &plan.profile).await?;
                Ok(assemble(refined, ctx.message_count))
            } else {
                Ok(assemble(candidates, ctx.message_count))
            }
        }
        // Recoverable delegated failure: fall back to local evaluation,
        // once.
        None => {
            let hits = scan::manual_scan(transport, term, ctx, &plan.profile).await?;
            Ok(assemble(hits, ctx.message_count))
        }
    }
}

/// Final result assembly
///
/// Bounds-checks every identifier against the snapshot and preserves the
/// order the upstream stage produced. Chunk ranges are disjoint, so no
/// deduplication is needed beyond this filter.
fn assemble(batch: Vec<SeqNum>, message_count: u32) -> Vec<SeqNum> {
    batch
        .into_iter()
        .filter(|seq| *seq >= 1 && *seq <= message_count)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{assemble, search};
    use crate::config::SearchTuning;
    use crate::context::{Capabilities, MailboxContext};
    use crate::errors::SearchError;
    use crate::message::{FetchTarget, MailMessage};
    use crate::term::{MailField, Operand, SearchOperation, SearchTerm};
    use crate::transport::{TransportError, mock::MockTransport};

    fn term(field: MailField, needle: &str) -> SearchTerm {
        SearchTerm::single(
            field,
            SearchOperation::Contains,
            Operand::Text(needle.to_owned()),
        )
        .expect("term must construct")
    }

    fn ctx(message_count: u32, tuning: SearchTuning) -> MailboxContext {
        MailboxContext::new(
            "INBOX",
            message_count,
            Capabilities::from_atoms(["IMAP4REV1"]),
            tuning,
        )
    }

    fn message(seq: u32, subject: &str) -> MailMessage {
        MailMessage {
            subject: Some(subject.to_owned()),
            ..MailMessage::new(seq)
        }
    }

    #[test]
    fn assemble_drops_only_out_of_range_identifiers() {
        assert_eq!(assemble(vec![3, 1, 7, 0, 8], 7), vec![3, 1, 7]);
    }

    #[tokio::test]
    async fn empty_mailbox_returns_empty_without_transport_calls() {
        let mut transport = MockTransport::default();
        let hits = search(
            &mut transport,
            &term(MailField::Subject, "x"),
            &ctx(0, SearchTuning::default()),
        )
        .await
        .expect("empty mailbox search succeeds");

        assert!(hits.is_empty());
        assert!(transport.search_calls.is_empty());
        assert!(transport.fetch_calls.is_empty());
    }

    #[tokio::test]
    async fn forced_delegated_body_search_returns_result_verbatim() {
        let tuning = SearchTuning {
            force_delegated: true,
            chunk_enabled: false,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::default().script_search(Ok(vec![2, 9]));

        // Non-ASCII body needle: refinement would normally apply, but the
        // body branch trusts the delegated result as returned.
        let hits = search(&mut transport, &term(MailField::Body, "grüße"), &ctx(10, tuning))
            .await
            .expect("delegated body search succeeds");

        assert_eq!(hits, vec![2, 9]);
        assert_eq!(transport.search_calls.len(), 1);
        assert!(transport.fetch_calls.is_empty());
    }

    #[tokio::test]
    async fn small_ascii_mailbox_scans_manually_with_zero_delegated_calls() {
        let tuning = SearchTuning {
            fetch_limit: 1_000,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::with_messages(vec![
            message(1, "hello world"),
            message(2, "other"),
        ]);

        let hits = search(&mut transport, &term(MailField::Subject, "hello"), &ctx(2, tuning))
            .await
            .expect("manual scan succeeds");

        assert_eq!(hits, vec![1]);
        assert!(transport.search_calls.is_empty());
        assert_eq!(transport.fetch_calls.len(), 1);
    }

    #[tokio::test]
    async fn recoverable_delegated_failure_falls_back_to_manual_scan() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::with_messages(vec![
            message(1, "find me"),
            message(2, "not this"),
        ])
        .script_search(Err(TransportError::Protocol("NO SEARCH failed".to_owned())));

        let hits = search(&mut transport, &term(MailField::Subject, "find"), &ctx(2, tuning))
            .await
            .expect("fallback must succeed without surfacing the error");

        assert_eq!(hits, vec![1]);
        assert_eq!(transport.search_calls.len(), 1);
        assert_eq!(transport.fetch_calls.len(), 1);
    }

    #[tokio::test]
    async fn fatal_delegated_failure_propagates_with_no_further_transport_calls() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::default()
            .script_search(Err(TransportError::Disconnected("BYE".to_owned())));

        let error = search(&mut transport, &term(MailField::Subject, "x"), &ctx(10, tuning))
            .await
            .expect_err("fatal failure must propagate");

        assert!(matches!(error, SearchError::ConnectionLost(_)));
        assert_eq!(transport.search_calls.len(), 1);
        assert!(transport.fetch_calls.is_empty());
    }

    #[tokio::test]
    async fn chunked_delegation_covers_the_mailbox_in_three_calls() {
        let tuning = SearchTuning {
            force_delegated: true,
            chunk_enabled: true,
            fetch_limit: 100,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::default()
            .script_search(Ok(vec![10]))
            .script_search(Ok(vec![110]))
            .script_search(Ok(vec![210]));

        let hits = search(&mut transport, &term(MailField::Subject, "x"), &ctx(250, tuning))
            .await
            .expect("chunked search succeeds");

        assert_eq!(hits, vec![10, 110, 210]);
        let issued: Vec<(u32, u32)> = transport
            .search_calls
            .iter()
            .map(|(_, range)| (range.first, range.last))
            .collect();
        assert_eq!(issued, vec![(1, 100), (101, 200), (201, 250)]);
    }

    #[tokio::test]
    async fn non_ascii_candidates_below_threshold_are_refined() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            umlaut_threshold: 50,
            ..SearchTuning::default()
        };
        // Server claims 1 and 2 match; local evaluation only confirms 2.
        let mut transport = MockTransport::with_messages(vec![
            message(1, "grusse falsch"),
            message(2, "echte Grüße"),
        ])
        .script_search(Ok(vec![1, 2]));

        let hits = search(&mut transport, &term(MailField::Subject, "grüße"), &ctx(2, tuning))
            .await
            .expect("refined search succeeds");

        assert_eq!(hits, vec![2]);
        assert_eq!(transport.fetch_calls.len(), 1);
        assert_eq!(
            transport.fetch_calls[0],
            FetchTarget::Sequences(vec![1, 2])
        );
    }

    #[tokio::test]
    async fn ascii_candidates_skip_refinement() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            umlaut_threshold: 50,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::default().script_search(Ok(vec![4, 5]));

        let hits = search(&mut transport, &term(MailField::Subject, "plain"), &ctx(10, tuning))
            .await
            .expect("delegated search succeeds");

        assert_eq!(hits, vec![4, 5]);
        assert!(transport.fetch_calls.is_empty());
    }

    #[tokio::test]
    async fn candidate_sets_above_threshold_skip_refinement() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            umlaut_threshold: 2,
            ..SearchTuning::default()
        };
        let mut transport = MockTransport::default().script_search(Ok(vec![1, 2, 3]));

        let hits = search(&mut transport, &term(MailField::Subject, "grüße"), &ctx(10, tuning))
            .await
            .expect("delegated search succeeds");

        assert_eq!(hits, vec![1, 2, 3]);
        assert!(transport.fetch_calls.is_empty());
    }

    #[tokio::test]
    async fn wildcard_candidates_are_narrowed_even_for_ascii_terms() {
        let tuning = SearchTuning {
            prefer_delegated: true,
            chunk_enabled: false,
            umlaut_threshold: 0,
            ..SearchTuning::default()
        };
        // Seq 2 contains both literal fragments but in the wrong order:
        // the relaxed pre-filter over-includes it, narrowing drops it.
        let mut transport = MockTransport::with_messages(vec![
            message(1, "Invoice 42"),
            message(2, "certificate involved"),
        ])
        .script_search(Ok(vec![1, 2]));

        let hits = search(&mut transport, &term(MailField::Subject, "inv*ce"), &ctx(2, tuning))
            .await
            .expect("wildcard search succeeds");

        assert_eq!(hits, vec![1]);
        assert_eq!(transport.search_calls[0].0, "SUBJECT \"inv\" SUBJECT \"ce\"");
    }

    #[tokio::test]
    async fn repeated_search_over_unchanged_mailbox_is_idempotent() {
        let tuning = SearchTuning {
            fetch_limit: 1_000,
            ..SearchTuning::default()
        };
        let messages = vec![message(1, "alpha"), message(2, "beta"), message(3, "alpha beta")];
        let needle = term(MailField::Subject, "alpha");

        let mut first = MockTransport::with_messages(messages.clone());
        let mut second = MockTransport::with_messages(messages);
        let ctx = ctx(3, tuning);

        let one = search(&mut first, &needle, &ctx).await.expect("first run");
        let two = search(&mut second, &needle, &ctx).await.expect("second run");
        assert_eq!(one, two);
    }
}
