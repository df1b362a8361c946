//! Transport-failure classification
//!
//! Maps a transport-level failure to the action the engine must take:
//! propagate immediately, or fall back to local evaluation. The mapping
//! is total over the flat [`TransportError`] enum, so a new transport
//! variant forces a decision here at compile time.

use crate::transport::TransportError;

/// What a transport failure means for the in-flight search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Connection/session is dead; rethrow immediately, never fall back
    Fatal,
    /// Only the command failed; the designated fallback path may proceed
    Recoverable,
}

/// Classify a transport failure
///
/// An explicit termination signal or an already-closed handle means no
/// further command can succeed on this connection. Everything else is a
/// failure of the one command and leaves the connection usable.
pub fn classify(error: &TransportError) -> FailureClass {
    match error {
        TransportError::Disconnected(_) | TransportError::Closed(_) => FailureClass::Fatal,
        TransportError::Timeout(_) | TransportError::Protocol(_) => FailureClass::Recoverable,
    }
}

#[cfg(test)]
mod tests {
    use super::{FailureClass, classify};
    use crate::transport::TransportError;

    #[test]
    fn termination_signals_are_fatal() {
        assert_eq!(
            classify(&TransportError::Disconnected("BYE".to_owned())),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(&TransportError::Closed("folder closed".to_owned())),
            FailureClass::Fatal
        );
    }

    #[test]
    fn command_failures_are_recoverable() {
        assert_eq!(
            classify(&TransportError::Timeout("SEARCH".to_owned())),
            FailureClass::Recoverable
        );
        assert_eq!(
            classify(&TransportError::Protocol("NO unsupported".to_owned())),
            FailureClass::Recoverable
        );
    }
}
