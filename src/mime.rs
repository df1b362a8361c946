//! Message parsing and MIME handling
//!
//! Parses RFC822 data from the transport into [`MailMessage`] snapshots
//! using `mailparse`. Body text extraction is content-type-sensitive: the
//! first `text/plain` part wins, otherwise the first `text/html` part is
//! converted to plain text. This is the same extraction the local
//! evaluator trusts, and exactly what a remote search command is not
//! guaranteed to apply.

use chrono::DateTime;
use mailparse::{DispositionType, MailAddr, ParsedMail, SingleInfo};

use crate::message::{MailMessage, SeqNum};
use crate::transport::TransportError;

/// Parse a complete RFC822 message into a snapshot
///
/// Populates headers, content type, and the extracted body text. Flags,
/// size, and the internal date come from fetch attributes and are filled
/// in by the caller.
///
/// # Errors
///
/// Returns `Protocol` if the message cannot be parsed.
pub(crate) fn parse_message(seq: SeqNum, raw: &[u8]) -> Result<MailMessage, TransportError> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| TransportError::Protocol(format!("failed to parse RFC822 message: {e}")))?;

    let mut message = parse_header_block(seq, raw)?;
    let mut plain = None;
    let mut html = None;
    collect_bodies(&parsed, &mut plain, &mut html);
    message.body_text = plain.or_else(|| html.map(html_to_text));
    Ok(message)
}

/// Parse a header block (or the header section of a full message)
///
/// Extracts addresses, subject, sent date, content type, and the raw
/// header text used for full-content matching.
///
/// # Errors
///
/// Returns `Protocol` if the headers cannot be parsed.
pub(crate) fn parse_header_block(seq: SeqNum, raw: &[u8]) -> Result<MailMessage, TransportError> {
    let (headers, body_offset) = mailparse::parse_headers(raw)
        .map_err(|e| TransportError::Protocol(format!("failed to parse message headers: {e}")))?;

    let mut message = MailMessage::new(seq);
    message.header_text = Some(String::from_utf8_lossy(&raw[..body_offset]).into_owned());

    for header in &headers {
        let key = header.get_key_ref().to_ascii_lowercase();
        let value = header.get_value();
        match key.as_str() {
            "from" => message.from = parse_addresses(&value),
            "to" => message.to = parse_addresses(&value),
            "cc" => message.cc = parse_addresses(&value),
            "bcc" => message.bcc = parse_addresses(&value),
            "subject" => message.subject = Some(value),
            "date" => {
                message.sent_date = mailparse::dateparse(&value)
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|dt| dt.date_naive());
            }
            "content-type" => {
                message.content_type = Some(mime_type_of(&value));
            }
            _ => {}
        }
    }

    Ok(message)
}

/// Walk the MIME part tree collecting the first plain and HTML bodies
///
/// Attachment parts are skipped; only inline text entities count.
fn collect_bodies(part: &ParsedMail<'_>, plain: &mut Option<String>, html: &mut Option<String>) {
    if part.subparts.is_empty() {
        let ctype = part.ctype.mimetype.to_ascii_lowercase();
        let disposition = part.get_content_disposition();
        if disposition.disposition == DispositionType::Attachment {
            return;
        }

        if ctype == "text/plain"
            && plain.is_none()
            && let Ok(text) = part.get_body()
        {
            *plain = Some(text);
        }

        if ctype == "text/html"
            && html.is_none()
            && let Ok(text) = part.get_body()
        {
            *html = Some(text);
        }

        return;
    }

    for sub in &part.subparts {
        collect_bodies(sub, plain, html);
    }
}

/// Convert an HTML body to plain text, falling back to the raw markup
fn html_to_text(html: String) -> String {
    html2text::from_read(html.as_bytes(), 80).unwrap_or(html)
}

/// Parse an address header into displayable address strings
///
/// Groups are flattened. An unparseable header degrades to its raw value
/// so matching still has something to work with.
fn parse_addresses(value: &str) -> Vec<String> {
    match mailparse::addrparse(value) {
        Ok(list) => list
            .iter()
            .flat_map(|addr| match addr {
                MailAddr::Single(single) => vec![format_address(single)],
                MailAddr::Group(group) => group.addrs.iter().map(format_address).collect(),
            })
            .collect(),
        Err(_) => vec![value.to_owned()],
    }
}

fn format_address(info: &SingleInfo) -> String {
    match &info.display_name {
        Some(name) => format!("{name} <{}>", info.addr),
        None => info.addr.clone(),
    }
}

/// The mime-type portion of a Content-Type header value
fn mime_type_of(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or(value)
        .trim()
        .to_ascii_lowercase()
}
