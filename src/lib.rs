//! mail-imap-search-rs: cost-based remote-mailbox search engine
//!
//! Given a composable, typed query over message attributes, this library
//! decides whether to delegate searching to the remote server's native
//! search command, split that delegation into bounded chunks, or fall
//! back to fetching messages and evaluating the query locally. Server
//! charset and wildcard imprecision is reconciled by a narrowing
//! refinement pass, and transport failures are classified so only a dead
//! connection ever surfaces before the fallback path has run.
//!
//! # Architecture
//!
//! - [`term`]: predicate-tree query model with local evaluation
//! - [`protocol`]: exact and wildcard-relaxed wire translation
//! - [`context`]: per-call mailbox snapshot (count, capabilities, tuning)
//! - [`config`]: tuning properties with a lazy, invalidatable cache
//! - [`planner`]: strategy selection from term, snapshot, and tuning
//! - `executor`: chunked delegated round-trips and candidate refinement
//! - `scan`: manual fetch-and-evaluate fallback
//! - [`engine`]: the public `search` orchestration
//! - [`classify`]: fatal vs. recoverable transport-failure mapping
//! - [`transport`]: the mail-transport collaborator boundary
//! - [`imap`]: shipped transport implementation over `async-imap`
//! - [`message`]: fetched-message snapshot and fetch profiles
//! - [`errors`]: caller-visible error taxonomy
//! - `mime`: RFC822 parsing with content-type-sensitive text extraction
//!
//! # Example
//!
//! ```no_run
//! use mail_imap_search_rs::{
//!     engine, Capabilities, MailboxContext, MailField, Operand, SearchOperation, SearchTerm,
//!     TuningCache,
//! };
//!
//! # async fn run(transport: &mut mail_imap_search_rs::ImapTransport) -> Result<(), Box<dyn std::error::Error>> {
//! let tuning = TuningCache::new(None);
//! let snapshot = transport.select("INBOX").await?;
//! let ctx = MailboxContext::new(
//!     "INBOX",
//!     snapshot.message_count,
//!     snapshot.capabilities,
//!     tuning.current(),
//! );
//! let term = SearchTerm::single(
//!     MailField::Subject,
//!     SearchOperation::Contains,
//!     Operand::Text("invoice".to_owned()),
//! )?;
//! let hits = engine::search(transport, &term, &ctx).await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
mod executor;
pub mod imap;
pub mod message;
mod mime;
pub mod planner;
pub mod protocol;
mod scan;
pub mod term;
pub mod transport;

pub use config::{ConfigSource, EnvConfigSource, SearchTuning, TuningCache};
pub use context::{Capabilities, MailboxContext};
pub use engine::search;
pub use errors::{SearchError, SearchResult};
pub use imap::{ImapEndpoint, ImapTransport, MailboxSnapshot};
pub use message::{FetchProfile, FetchTarget, MailFlag, MailMessage, SeqNum};
pub use planner::{SearchPlan, SearchStrategy};
pub use protocol::ProtocolTerm;
pub use term::{MailField, Operand, SearchOperation, SearchTerm};
pub use transport::{MailTransport, SequenceRange, TransportError};
