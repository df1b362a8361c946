//! Search tuning configuration
//!
//! Tuning scalars are read through an injected [`ConfigSource`] and cached
//! in a [`TuningCache`]: lazily computed on first access, served from the
//! cache afterwards, and reset to uninitialized by [`TuningCache::invalidate`]
//! (the reload-subscription hook). An absent configuration collaborator is
//! not an error; compiled-in defaults apply.

use std::env;
use std::env::VarError;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Property key for the fetch limit / chunk size
pub const PROP_FETCH_LIMIT: &str = "mail.search.fetch-limit";
/// Property key for chunked delegated search
pub const PROP_CHUNK_ENABLED: &str = "mail.search.chunk-enabled";
/// Property key forcing delegation regardless of mailbox size
pub const PROP_FORCE_DELEGATED: &str = "mail.search.force-delegated";
/// Property key preferring delegation for non-body terms
pub const PROP_PREFER_DELEGATED: &str = "mail.search.prefer-delegated";
/// Property key for the refinement candidate-count ceiling
pub const PROP_UMLAUT_THRESHOLD: &str = "mail.search.umlaut-threshold";

const DEFAULT_FETCH_LIMIT: u32 = 1_000;
const DEFAULT_CHUNK_ENABLED: bool = true;
const DEFAULT_FORCE_DELEGATED: bool = false;
const DEFAULT_PREFER_DELEGATED: bool = false;
const DEFAULT_UMLAUT_THRESHOLD: usize = 50;

/// Tuning scalars driving strategy selection
///
/// A read-only snapshot taken once per search call. `fetch_limit` doubles
/// as the chunk size for chunked delegated search; the two are one knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTuning {
    /// Mailbox size at which delegation becomes worthwhile; also the
    /// chunk length for chunked delegated search
    pub fetch_limit: u32,
    /// Whether delegated search is split into bounded-range round-trips
    pub chunk_enabled: bool,
    /// Delegate regardless of mailbox size
    pub force_delegated: bool,
    /// Delegate non-body terms even below `fetch_limit`
    pub prefer_delegated: bool,
    /// Candidate-count ceiling for the non-ASCII refinement pass;
    /// 0 disables refinement entirely
    pub umlaut_threshold: usize,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            fetch_limit: DEFAULT_FETCH_LIMIT,
            chunk_enabled: DEFAULT_CHUNK_ENABLED,
            force_delegated: DEFAULT_FORCE_DELEGATED,
            prefer_delegated: DEFAULT_PREFER_DELEGATED,
            umlaut_threshold: DEFAULT_UMLAUT_THRESHOLD,
        }
    }
}

/// External configuration collaborator
///
/// Lookups are infallible by contract: an unknown or malformed property
/// yields the supplied default.
pub trait ConfigSource: Send + Sync {
    /// Integer property lookup with default fallback
    fn int_property(&self, name: &str, default: i64) -> i64;

    /// Boolean property lookup with default fallback
    fn bool_property(&self, name: &str, default: bool) -> bool;
}

/// Environment-backed configuration source
///
/// Maps property keys to environment variables: uppercase, with every
/// non-alphanumeric character replaced by an underscore
/// (`mail.search.fetch-limit` reads `MAIL_SEARCH_FETCH_LIMIT`).
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn int_property(&self, name: &str, default: i64) -> i64 {
        let key = env_key(name);
        match env::var(&key) {
            Ok(value) => value.trim().parse::<i64>().unwrap_or_else(|_| {
                warn!(%key, %value, "invalid integer property, using default");
                default
            }),
            Err(VarError::NotPresent) => default,
            Err(VarError::NotUnicode(_)) => {
                warn!(%key, "non-unicode property value, using default");
                default
            }
        }
    }

    fn bool_property(&self, name: &str, default: bool) -> bool {
        let key = env_key(name);
        match env::var(&key) {
            Ok(value) => parse_bool_value(&value).unwrap_or_else(|| {
                warn!(%key, %value, "invalid boolean property, using default");
                default
            }),
            Err(VarError::NotPresent) => default,
            Err(VarError::NotUnicode(_)) => {
                warn!(%key, "non-unicode property value, using default");
                default
            }
        }
    }
}

/// Map a property key to its environment variable name
fn env_key(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Parse a boolean property with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive.
fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Lazily cached tuning snapshot
///
/// The only state that outlives a single search call. The snapshot is
/// computed at most once between invalidations, under a mutual-exclusion
/// guard; `invalidate` resets it so the next access re-reads the source.
pub struct TuningCache {
    source: Option<Arc<dyn ConfigSource>>,
    cached: Mutex<Option<SearchTuning>>,
}

impl TuningCache {
    /// Create a cache over a configuration collaborator
    ///
    /// `None` means the collaborator is unavailable; compiled-in defaults
    /// are served without ever consulting anything.
    pub fn new(source: Option<Arc<dyn ConfigSource>>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Current tuning snapshot, reading the source at most once
    pub fn current(&self) -> SearchTuning {
        let mut guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *guard.get_or_insert_with(|| self.read_source())
    }

    /// Reset to uninitialized; the next access re-reads the source
    ///
    /// Wire this to the configuration collaborator's reload notification.
    pub fn invalidate(&self) {
        let mut guard = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    fn read_source(&self) -> SearchTuning {
        let Some(source) = &self.source else {
            return SearchTuning::default();
        };

        let fetch_limit = source
            .int_property(PROP_FETCH_LIMIT, i64::from(DEFAULT_FETCH_LIMIT))
            .clamp(0, i64::from(u32::MAX)) as u32;
        let umlaut_threshold = source
            .int_property(PROP_UMLAUT_THRESHOLD, DEFAULT_UMLAUT_THRESHOLD as i64)
            .max(0) as usize;

        SearchTuning {
            fetch_limit,
            chunk_enabled: source.bool_property(PROP_CHUNK_ENABLED, DEFAULT_CHUNK_ENABLED),
            force_delegated: source.bool_property(PROP_FORCE_DELEGATED, DEFAULT_FORCE_DELEGATED),
            prefer_delegated: source
                .bool_property(PROP_PREFER_DELEGATED, DEFAULT_PREFER_DELEGATED),
            umlaut_threshold,
        }
    }
}
