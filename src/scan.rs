//! Manual scan: fetch and evaluate locally
//!
//! The guaranteed-correct path. Messages are fetched with the minimal
//! profile the term needs (full messages for body terms) and the
//! predicate tree is evaluated locally per message. The transport's bulk
//! fetch is assumed efficient, so no chunking happens here, and failures
//! propagate without retry.

use tracing::debug;

use crate::classify::{FailureClass, classify};
use crate::context::MailboxContext;
use crate::errors::{SearchError, SearchResult};
use crate::message::{FetchProfile, FetchTarget, SeqNum};
use crate::term::SearchTerm;
use crate::transport::{MailTransport, SequenceRange};

/// Fetch the mailbox and collect identifiers of locally matching messages
///
/// Results are in fetch order. This executor never re-attempts
/// delegation; it is itself the fallback.
///
/// # Errors
///
/// A fetch failure surfaces as `ConnectionLost` when classified fatal and
/// as `Fetch` otherwise.
pub(crate) async fn manual_scan<T: MailTransport>(
    transport: &mut T,
    term: &SearchTerm,
    ctx: &MailboxContext,
    profile: &FetchProfile,
) -> SearchResult<Vec<SeqNum>> {
    debug!(
        mailbox = %ctx.mailbox,
        message_count = ctx.message_count,
        full_content = profile.full_content,
        "manually scanning mailbox"
    );

    let messages = transport
        .fetch(
            FetchTarget::Range(SequenceRange::full(ctx.message_count)),
            profile,
        )
        .await
        .map_err(|error| match classify(&error) {
            FailureClass::Fatal => SearchError::ConnectionLost(error.to_string()),
            FailureClass::Recoverable => SearchError::Fetch(error.to_string()),
        })?;

    Ok(messages
        .into_iter()
        .filter(|message| term.matches(message))
        .map(|message| message.seq)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::manual_scan;
    use crate::config::SearchTuning;
    use crate::context::{Capabilities, MailboxContext};
    use crate::errors::SearchError;
    use crate::message::{FetchProfile, MailMessage};
    use crate::term::{MailField, Operand, SearchOperation, SearchTerm};
    use crate::transport::{TransportError, mock::MockTransport};

    fn mailbox(messages: Vec<MailMessage>) -> (MockTransport, MailboxContext) {
        let count = messages.len() as u32;
        (
            MockTransport::with_messages(messages),
            MailboxContext::new(
                "INBOX",
                count,
                Capabilities::from_atoms(["IMAP4REV1"]),
                SearchTuning::default(),
            ),
        )
    }

    fn message(seq: u32, subject: &str) -> MailMessage {
        MailMessage {
            subject: Some(subject.to_owned()),
            ..MailMessage::new(seq)
        }
    }

    #[tokio::test]
    async fn collects_matches_in_fetch_order() {
        let term = SearchTerm::single(
            MailField::Subject,
            SearchOperation::Contains,
            Operand::Text("report".to_owned()),
        )
        .expect("term must construct");
        let profile = FetchProfile::for_term(&term);
        let (mut transport, ctx) = mailbox(vec![
            message(1, "weekly report"),
            message(2, "lunch"),
            message(3, "Report draft"),
        ]);

        let hits = manual_scan(&mut transport, &term, &ctx, &profile)
            .await
            .expect("scan succeeds");
        assert_eq!(hits, vec![1, 3]);
        assert_eq!(transport.fetch_calls.len(), 1);
    }

    #[tokio::test]
    async fn fetch_failures_propagate_without_retry() {
        let term = SearchTerm::And(Vec::new());
        let profile = FetchProfile::for_term(&term);
        let (mut transport, ctx) = mailbox(vec![message(1, "x")]);
        transport.fetch_failure = Some(TransportError::Protocol("FETCH refused".to_owned()));

        let error = manual_scan(&mut transport, &term, &ctx, &profile)
            .await
            .expect_err("failure must propagate");
        assert!(matches!(error, SearchError::Fetch(_)));
        assert_eq!(transport.fetch_calls.len(), 1);
    }
}
