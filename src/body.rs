//! Payload extraction from form submissions.
//!
//! This is deliberately not a MIME parser. Multipart bodies are assumed to
//! carry a single field: the line before the first `Content-Disposition:`
//! header is taken as the boundary, and the closing boundary is removed by
//! trimming a fixed-width suffix. Clients such as `curl -F` and browser
//! forms with one field produce exactly that shape.

use crate::constants::FORM_DATA_FIELD;
use std::borrow::Cow;
use std::io::{BufRead, Read};

const DISPOSITION_MARKER: &[u8] = b"content-disposition:";

/// CRLF before the closing boundary, `--` after it, and its trailing CRLF
const CLOSING_BOUNDARY_OVERHEAD: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(&'static str),

    #[error("Malformed form body: {0}")]
    MalformedForm(String),

    #[error("Missing form field: {0}")]
    MissingField(&'static str),

    #[error("Failed to read request body: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormEncoding {
    Multipart,
    UrlEncoded,
}

impl FormEncoding {
    fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or("").trim();
        if essence.eq_ignore_ascii_case("multipart/form-data") {
            Some(Self::Multipart)
        } else if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Some(Self::UrlEncoded)
        } else {
            None
        }
    }
}

/// Extract the uploaded payload from at most `declared_length` bytes of `source`.
///
/// An empty payload is returned as-is; rejecting it is up to the caller.
pub fn extract<R: BufRead>(
    source: R,
    declared_length: u64,
    content_type: &str,
) -> Result<Vec<u8>, ExtractError> {
    let source = source.take(declared_length);
    match FormEncoding::from_content_type(content_type) {
        Some(FormEncoding::Multipart) => extract_multipart(source),
        Some(FormEncoding::UrlEncoded) => extract_urlencoded(source),
        None => Err(ExtractError::UnsupportedContentType(content_type.to_string())),
    }
}

fn extract_multipart<R: BufRead>(mut source: R) -> Result<Vec<u8>, ExtractError> {
    let mut previous: Option<String> = None;
    let mut line = Vec::new();

    let ending = loop {
        line.clear();
        if source.read_until(b'\n', &mut line)? == 0 {
            return Err(ExtractError::MalformedMultipart("no Content-Disposition header"));
        }
        if contains_ignore_ascii_case(&line, DISPOSITION_MARKER) {
            break previous
                .ok_or(ExtractError::MalformedMultipart("no boundary before Content-Disposition"))?;
        }
        previous = Some(strip_line_ending(&decode_line(&line)).to_string());
    };

    // Skip the blank separator, along with any further part headers before it
    loop {
        line.clear();
        if source.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if strip_line_ending(&decode_line(&line)).is_empty() {
            break;
        }
    }

    let mut data = Vec::new();
    source.read_to_end(&mut data)?;

    let trim = ending.len() + CLOSING_BOUNDARY_OVERHEAD;
    let expected_tail = format!("\r\n{}--\r\n", ending);
    if !data.ends_with(expected_tail.as_bytes()) {
        tracing::warn!(
            "Closing boundary {:?} not at end of {} byte multipart body; trimming {} bytes anyway",
            ending,
            data.len(),
            trim
        );
    }
    data.truncate(data.len().saturating_sub(trim));

    Ok(data)
}

fn extract_urlencoded<R: Read>(mut source: R) -> Result<Vec<u8>, ExtractError> {
    let mut raw = Vec::new();
    source.read_to_end(&mut raw)?;

    // Values are decoded as text; escapes that are not UTF-8 become U+FFFD
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(&raw).map_err(|e| ExtractError::MalformedForm(e.to_string()))?;

    pairs
        .into_iter()
        .find(|(key, _)| key == FORM_DATA_FIELD)
        .map(|(_, value)| value.into_bytes())
        .ok_or(ExtractError::MissingField(FORM_DATA_FIELD))
}

/// UTF-8 if possible, otherwise one character per byte.
fn decode_line(line: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(line) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => Cow::Owned(line.iter().map(|&b| b as char).collect()),
    }
}

fn strip_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window.eq_ignore_ascii_case(needle))
}
