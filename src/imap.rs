//! IMAP transport adapter
//!
//! Provides the shipped [`MailTransport`] implementation over
//! `async-imap`. All network calls are TLS-only and timeout-bounded;
//! failures are mapped into the flat [`TransportError`] at this boundary
//! so the engine's classifier never inspects protocol internals.

use std::sync::Arc;
use std::time::Duration;

use async_imap::types::{Fetch, Flag};
use async_imap::{Client, Session};
use futures::TryStreamExt;
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

use crate::context::Capabilities;
use crate::message::{FetchProfile, FetchTarget, MailFlag, MailMessage, SeqNum};
use crate::mime;
use crate::protocol::ProtocolTerm;
use crate::transport::{MailTransport, SequenceRange, TransportError};

/// Type alias for the authenticated IMAP session over TLS
pub type ImapSession = Session<tokio_rustls::client::TlsStream<TcpStream>>;

/// Connection parameters for one IMAP endpoint
///
/// Connections are always TLS; the password is held in a type that
/// prevents accidental logging.
#[derive(Debug, Clone)]
pub struct ImapEndpoint {
    /// Server hostname
    pub host: String,
    /// Server port (typically 993)
    pub port: u16,
    /// Login username
    pub user: String,
    /// Login password
    pub pass: SecretString,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// TLS handshake / greeting / login timeout in milliseconds
    pub greeting_timeout_ms: u64,
    /// Per-command socket timeout in milliseconds
    pub socket_timeout_ms: u64,
}

/// Snapshot returned by selecting a mailbox
///
/// Carries what the caller needs to build its
/// [`crate::context::MailboxContext`].
#[derive(Debug, Clone)]
pub struct MailboxSnapshot {
    /// Message count at select time
    pub message_count: u32,
    /// Capabilities declared by the server
    pub capabilities: Capabilities,
}

/// Mail transport over an authenticated IMAP session
///
/// Owns the session exclusively; one transport serves one in-flight
/// search at a time, matching the engine's single-connection command
/// ordering.
pub struct ImapTransport {
    session: ImapSession,
    socket_timeout: Duration,
}

impl ImapTransport {
    /// Connect and authenticate against an endpoint
    ///
    /// Performs the full sequence with timeouts: TCP connect, TLS
    /// handshake with system root certificates, greeting read, LOGIN.
    ///
    /// # Errors
    ///
    /// - `Timeout` if any connection phase exceeds its deadline
    /// - `Disconnected` if the server closes before the greeting
    /// - `Protocol` for TCP, TLS, or authentication failures
    pub async fn connect(endpoint: &ImapEndpoint) -> Result<Self, TransportError> {
        let connect_duration = Duration::from_millis(endpoint.connect_timeout_ms);
        let greeting_duration = Duration::from_millis(endpoint.greeting_timeout_ms);

        let tcp = timeout(
            connect_duration,
            TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| TransportError::Timeout("tcp connect".to_owned()))
        .and_then(|r| r.map_err(|e| TransportError::Protocol(format!("tcp connect failed: {e}"))))?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let server_name = ServerName::try_from(endpoint.host.clone())
            .map_err(|_| TransportError::Protocol("invalid host for TLS SNI".to_owned()))?;
        let tls_stream = timeout(greeting_duration, connector.connect(server_name, tcp))
            .await
            .map_err(|_| TransportError::Timeout("TLS handshake".to_owned()))
            .and_then(|r| {
                r.map_err(|e| TransportError::Protocol(format!("TLS handshake failed: {e}")))
            })?;

        let mut client = Client::new(tls_stream);
        let greeting = timeout(greeting_duration, client.read_response())
            .await
            .map_err(|_| TransportError::Timeout("greeting".to_owned()))
            .and_then(|r| r.map_err(|e| TransportError::Protocol(format!("greeting failed: {e}"))))?;

        if greeting.is_none() {
            return Err(TransportError::Disconnected(
                "server closed connection before greeting".to_owned(),
            ));
        }

        let pass = endpoint.pass.expose_secret();
        let session = timeout(
            greeting_duration,
            client.login(endpoint.user.as_str(), pass),
        )
        .await
        .map_err(|_| TransportError::Timeout("login".to_owned()))
        .and_then(|r| r.map_err(|(e, _)| TransportError::Protocol(format!("login failed: {e}"))))?;

        Ok(Self {
            session,
            socket_timeout: Duration::from_millis(endpoint.socket_timeout_ms),
        })
    }

    /// Open a mailbox read-only and snapshot it
    ///
    /// Uses `EXAMINE` so messages are never marked as read by searching.
    /// The mailbox name is UTF-7 encoded on the wire.
    ///
    /// # Errors
    ///
    /// `Closed` if the mailbox cannot be examined; `Timeout`,
    /// `Disconnected`, or `Protocol` for transport failures.
    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxSnapshot, TransportError> {
        let encoded = utf7_imap::encode_utf7_imap(mailbox.to_owned());
        let selected = timeout(self.socket_timeout, self.session.examine(&encoded))
            .await
            .map_err(|_| TransportError::Timeout(format!("EXAMINE {mailbox}")))
            .and_then(|r| {
                r.map_err(|e| TransportError::Closed(format!("cannot examine '{mailbox}': {e}")))
            })?;

        let capabilities = timeout(self.socket_timeout, self.session.capabilities())
            .await
            .map_err(|_| TransportError::Timeout("CAPABILITY".to_owned()))
            .and_then(|r| r.map_err(|e| map_imap_error(e, "CAPABILITY")))?;

        Ok(MailboxSnapshot {
            message_count: selected.exists,
            capabilities: Capabilities::from_atoms(capabilities.iter().map(capability_atom)),
        })
    }

    /// Log out and drop the connection
    pub async fn logout(mut self) -> Result<(), TransportError> {
        timeout(self.socket_timeout, self.session.logout())
            .await
            .map_err(|_| TransportError::Timeout("LOGOUT".to_owned()))
            .and_then(|r| r.map_err(|e| map_imap_error(e, "LOGOUT")))
    }
}

impl MailTransport for ImapTransport {
    async fn delegated_search(
        &mut self,
        term: &ProtocolTerm,
        range: SequenceRange,
    ) -> Result<Vec<SeqNum>, TransportError> {
        let query = format!("{}:{} {}", range.first, range.last, term.as_criteria());
        let found = timeout(self.socket_timeout, self.session.search(&query))
            .await
            .map_err(|_| TransportError::Timeout("SEARCH".to_owned()))
            .and_then(|r| r.map_err(|e| map_imap_error(e, "SEARCH")))?;

        let mut seqs: Vec<SeqNum> = found.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs)
    }

    async fn fetch(
        &mut self,
        target: FetchTarget,
        profile: &FetchProfile,
    ) -> Result<Vec<MailMessage>, TransportError> {
        let sequence_set = sequence_set_string(&target);
        if sequence_set.is_empty() {
            return Ok(Vec::new());
        }

        let query = if profile.full_content {
            "(FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[])"
        } else {
            "(FLAGS RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])"
        };

        let stream = timeout(self.socket_timeout, self.session.fetch(&sequence_set, query))
            .await
            .map_err(|_| TransportError::Timeout("FETCH".to_owned()))
            .and_then(|r| r.map_err(|e| map_imap_error(e, "FETCH")))?;
        let fetches: Vec<Fetch> = timeout(self.socket_timeout, stream.try_collect())
            .await
            .map_err(|_| TransportError::Timeout("FETCH stream".to_owned()))
            .and_then(|r| r.map_err(|e| map_imap_error(e, "FETCH stream")))?;

        let mut messages = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            messages.push(build_message(fetch, profile.full_content)?);
        }
        Ok(messages)
    }
}

/// Build a message snapshot from one fetch response
fn build_message(fetch: &Fetch, full_content: bool) -> Result<MailMessage, TransportError> {
    let seq = fetch.message;
    let mut message = if full_content {
        let raw = fetch
            .body()
            .ok_or_else(|| TransportError::Protocol(format!("seq {seq}: no message body")))?;
        mime::parse_message(seq, raw)?
    } else {
        let header = fetch
            .header()
            .ok_or_else(|| TransportError::Protocol(format!("seq {seq}: no header block")))?;
        mime::parse_header_block(seq, header)?
    };

    message.size = fetch.size.unwrap_or(0);
    message.received_date = fetch.internal_date().map(|dt| dt.date_naive());
    message.flags = fetch.flags().filter_map(|flag| map_flag(&flag)).collect();
    Ok(message)
}

/// Render a fetch target as a sequence-set string
fn sequence_set_string(target: &FetchTarget) -> String {
    match target {
        FetchTarget::Range(range) => format!("{}:{}", range.first, range.last),
        FetchTarget::Sequences(seqs) => seqs
            .iter()
            .map(|seq| seq.to_string())
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Map a system flag to the model; keyword flags are not modeled
fn map_flag(flag: &Flag<'_>) -> Option<MailFlag> {
    match flag {
        Flag::Seen => Some(MailFlag::Seen),
        Flag::Answered => Some(MailFlag::Answered),
        Flag::Flagged => Some(MailFlag::Flagged),
        Flag::Deleted => Some(MailFlag::Deleted),
        Flag::Draft => Some(MailFlag::Draft),
        Flag::Recent => Some(MailFlag::Recent),
        _ => None,
    }
}

/// String atom for one declared capability
fn capability_atom(capability: &async_imap::types::Capability) -> String {
    use async_imap::types::Capability;
    match capability {
        Capability::Imap4rev1 => "IMAP4REV1".to_owned(),
        Capability::Auth(mechanism) => format!("AUTH={mechanism}"),
        Capability::Atom(atom) => atom.to_string(),
    }
}

/// Map an `async-imap` error into the flat transport error
///
/// A lost connection or socket failure means the session is gone;
/// everything else is a command-level protocol failure.
fn map_imap_error(error: async_imap::error::Error, op: &str) -> TransportError {
    use async_imap::error::Error as ImapError;
    match error {
        ImapError::ConnectionLost => TransportError::Disconnected(format!("{op}: connection lost")),
        ImapError::Io(e) => TransportError::Disconnected(format!("{op}: {e}")),
        other => TransportError::Protocol(format!("{op}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::{map_flag, sequence_set_string};
    use crate::message::{FetchTarget, MailFlag};
    use crate::transport::SequenceRange;

    #[test]
    fn renders_sequence_sets() {
        assert_eq!(
            sequence_set_string(&FetchTarget::Range(SequenceRange::new(1, 250))),
            "1:250"
        );
        assert_eq!(
            sequence_set_string(&FetchTarget::Sequences(vec![3, 7, 12])),
            "3,7,12"
        );
        assert_eq!(sequence_set_string(&FetchTarget::Sequences(Vec::new())), "");
    }

    #[test]
    fn maps_system_flags_and_ignores_keywords() {
        use async_imap::types::Flag;
        assert_eq!(map_flag(&Flag::Seen), Some(MailFlag::Seen));
        assert_eq!(map_flag(&Flag::Recent), Some(MailFlag::Recent));
        assert_eq!(map_flag(&Flag::Custom("$Forwarded".into())), None);
    }
}
