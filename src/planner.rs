//! Strategy selection
//!
//! Chooses how a search term is executed against a mailbox snapshot:
//! delegated to the remote search command (in one round-trip or chunked),
//! or evaluated locally over fetched messages. The refinement decision is
//! taken separately once the delegated candidate count is known.

use serde::{Deserialize, Serialize};

use crate::config::SearchTuning;
use crate::context::MailboxContext;
use crate::message::FetchProfile;
use crate::term::SearchTerm;

/// Execution strategy for one search call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// One delegated round-trip over the full mailbox range
    DelegatedSingle,
    /// Delegated round-trips over consecutive bounded ranges
    DelegatedChunked,
    /// Fetch messages and evaluate the term locally
    ManualScan,
    /// Delegated candidates narrowed by local re-evaluation
    DelegatedThenRefine,
}

impl SearchStrategy {
    /// Whether this strategy starts with delegated round-trips
    pub fn is_delegated(self) -> bool {
        !matches!(self, Self::ManualScan)
    }
}

/// Planned execution of one search call
#[derive(Debug, Clone)]
pub struct SearchPlan {
    /// Initial strategy; the engine upgrades a delegated strategy to
    /// `DelegatedThenRefine` once the candidate count is known
    pub strategy: SearchStrategy,
    /// Fetch profile for local evaluation (manual scan or refinement)
    pub profile: FetchProfile,
    /// Delegated result is trusted exactly as returned, never refined.
    /// Set on the body-search branch: the remote matcher is not
    /// content-type-sensitive, so its result may be used as an
    /// optimization or abandoned, but never mixed with refinement.
    pub verbatim: bool,
}

/// Select the strategy for a term against a mailbox snapshot
///
/// Precedence: body/full terms delegate only when the capability is
/// present, the mailbox is large enough (or delegation is forced), and
/// the term carries no wildcard; their delegated result is verbatim.
/// Non-body terms delegate when forced, preferred, or the mailbox reaches
/// the fetch limit. Everything else is a manual scan over the minimal
/// fetch profile.
pub fn plan(term: &SearchTerm, ctx: &MailboxContext) -> SearchPlan {
    let tuning = &ctx.tuning;
    let profile = FetchProfile::for_term(term);
    let delegated = delegated_strategy(tuning);
    let large_enough = ctx.message_count >= tuning.fetch_limit;

    if profile.full_content {
        // A wildcard body result could neither be trusted verbatim nor
        // refined, so it never delegates.
        let delegate = ctx.capabilities.supports_search()
            && (tuning.force_delegated || large_enough)
            && !term.contains_wildcard();
        if delegate {
            return SearchPlan {
                strategy: delegated,
                profile,
                verbatim: true,
            };
        }
        return SearchPlan {
            strategy: SearchStrategy::ManualScan,
            profile,
            verbatim: false,
        };
    }

    let delegate = tuning.force_delegated
        || tuning.prefer_delegated
        || (ctx.capabilities.supports_search() && large_enough);
    SearchPlan {
        strategy: if delegate {
            delegated
        } else {
            SearchStrategy::ManualScan
        },
        profile,
        verbatim: false,
    }
}

/// Whether a delegated candidate set must be narrowed locally
///
/// A verbatim result is never refined. A wildcard term always is: the
/// relaxed pre-filter returned a superset that is incorrect until
/// narrowed, and re-fetching the candidates is never costlier than the
/// alternative full manual scan. Otherwise refinement corrects server
/// charset imprecision only when enabled (`umlaut_threshold > 0`), the
/// candidate set is small enough, and the term actually carries non-ASCII
/// text.
pub fn should_refine(
    term: &SearchTerm,
    candidate_count: usize,
    tuning: &SearchTuning,
    verbatim: bool,
) -> bool {
    if verbatim {
        return false;
    }
    if term.contains_wildcard() {
        return true;
    }
    tuning.umlaut_threshold > 0
        && candidate_count <= tuning.umlaut_threshold
        && !term.is_ascii()
}

fn delegated_strategy(tuning: &SearchTuning) -> SearchStrategy {
    if tuning.chunk_enabled {
        SearchStrategy::DelegatedChunked
    } else {
        SearchStrategy::DelegatedSingle
    }
}
