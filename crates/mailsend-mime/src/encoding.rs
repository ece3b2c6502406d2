//! MIME encoding and decoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 Q-encoded words.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Column width used for base64 attachment body lines.
pub const BASE64_LINE_WIDTH: usize = 76;

/// Chunks a Base64 string into `BASE64_LINE_WIDTH`-column lines joined by CRLF.
#[must_use]
pub fn chunk_base64_lines(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2);
    for (i, chunk) in encoded.as_bytes().chunks(BASE64_LINE_WIDTH).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        // Base64 output is always ASCII.
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    out
}

/// Wraps already-encoded Base64 text at [`BASE64_LINE_WIDTH`] columns,
/// carrying the current column position across calls so a streaming caller
/// can feed it one chunk of encoded text at a time and still produce a
/// single continuous 76-column wrap.
#[must_use]
pub fn wrap_base64_chunk(encoded: &str, column: &mut usize) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_WIDTH * 2);
    for b in encoded.bytes() {
        if *column >= BASE64_LINE_WIDTH {
            out.push_str("\r\n");
            *column = 0;
        }
        out.push(b as char);
        *column += 1;
    }
    out
}

/// Maximum line length for Quoted-Printable encoding.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes raw bytes using Quoted-Printable encoding (RFC 2045).
///
/// Encodes bytes that are not printable ASCII or would interfere with email
/// transmission. Existing line breaks in `data` (bare `\n` or `\r\n`) are
/// preserved as hard line breaks rather than escaped.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    let mut result = String::new();
    let mut line_length = 0;

    let mut i = 0;
    while i < data.len() {
        let byte = data[i];

        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            line_length = 0;
            i += 2;
            continue;
        }
        if byte == b'\n' {
            result.push_str("\r\n");
            line_length = 0;
            i += 1;
            continue;
        }

        if line_length >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_length = 0;
        }

        match byte {
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(byte as char);
                line_length += 1;
            }
            b' ' | b'\t' => {
                if line_length >= MAX_LINE_LENGTH - 1 {
                    let _ = write!(result, "={byte:02X}");
                    line_length += 3;
                } else {
                    result.push(byte as char);
                    line_length += 1;
                }
            }
            _ => {
                let _ = write!(result, "={byte:02X}");
                line_length += 3;
            }
        }
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<String> {
    let mut result = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '=' {
            if chars.peek() == Some(&'\r') {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    continue;
                }
            } else if chars.peek() == Some(&'\n') {
                chars.next();
                continue;
            }

            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("invalid hex: {e}")))?;
                result.push(byte);
            } else {
                return Err(Error::InvalidEncoding(
                    "incomplete escape sequence".to_string(),
                ));
            }
        } else {
            result.push(ch as u8);
        }
    }

    String::from_utf8(result).map_err(Into::into)
}

/// Bytes that must be escaped inside an RFC 2047 Q-encoded word: non-ASCII
/// bytes, the encoded-word delimiters themselves, and whitespace/control
/// bytes that header folding or the wire format can't carry raw.
fn needs_q_escape(byte: u8) -> bool {
    !byte.is_ascii() || byte == b'=' || byte == b'?' || byte == b'_' || byte < 0x20 || byte == 0x7f
}

/// Target length of the *encoded-text* portion of one `=?charset?Q?...?=`
/// word. Kept comfortably under 75 so the whole word, including delimiters,
/// stays within the RFC 2047 limit for short charset names like `UTF-8`.
const MAX_ENCODED_WORD_TEXT: usize = 60;

/// Encodes a header value using RFC 2047 Q-encoding, splitting into multiple
/// space-joined encoded-words of at most 75 characters each when the text is
/// long. Returns the original text unchanged if it is pure ASCII with no
/// bytes that would be misread as encoded-word syntax.
#[must_use]
pub fn encode_rfc2047_words(text: &str, charset: &str) -> String {
    if text.bytes().all(|b| b.is_ascii() && !needs_q_escape(b)) {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        let mut buf = [0_u8; 4];
        let encoded_char = ch.encode_utf8(&mut buf);
        let mut piece = String::new();
        for &b in encoded_char.as_bytes() {
            if b == b' ' {
                piece.push('_');
            } else if needs_q_escape(b) {
                let _ = write!(piece, "={b:02X}");
            } else {
                piece.push(b as char);
            }
        }

        if !current.is_empty() && current.len() + piece.len() > MAX_ENCODED_WORD_TEXT {
            words.push(std::mem::take(&mut current));
        }
        current.push_str(&piece);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .into_iter()
        .map(|w| format!("=?{charset}?Q?{w}?="))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decodes RFC 2047 encoded header value (`B` or `Q` encoding).
///
/// `encode_rfc2047_words` may split long text into several space-joined
/// encoded-words; per RFC 2047 §6.2 the linear whitespace between two
/// adjacent encoded-words carries no meaning and is dropped, so this
/// decodes each whitespace-separated token independently and concatenates
/// the encoded-word results directly, only keeping a separating space
/// around tokens that aren't themselves encoded-words.
///
/// # Errors
///
/// Returns an error if a token looks like an encoded-word but is malformed.
pub fn decode_rfc2047(text: &str) -> Result<String> {
    if !text.starts_with("=?") || !text.ends_with("?=") {
        return Ok(text.to_string());
    }

    let mut result = String::new();
    for token in text.split(' ') {
        match decode_encoded_word(token)? {
            Some(decoded) => result.push_str(&decoded),
            None => {
                if !result.is_empty() {
                    result.push(' ');
                }
                result.push_str(token);
            }
        }
    }

    Ok(result)
}

/// Decodes a single `=?charset?{B,Q}?text?=` encoded-word. Returns `Ok(None)`
/// if `token` isn't shaped like an encoded-word at all (so the caller can
/// treat it as literal text), and `Err` if it is shaped like one but
/// malformed or declares an unsupported encoding.
fn decode_encoded_word(token: &str) -> Result<Option<String>> {
    if !token.starts_with("=?") || !token.ends_with("?=") || token.len() < 6 {
        return Ok(None);
    }

    let inner = &token[2..token.len() - 2];
    let parts: Vec<&str> = inner.splitn(3, '?').collect();
    let [_charset, encoding, encoded_text] = parts[..] else {
        return Ok(None);
    };

    match encoding.to_uppercase().as_str() {
        "B" => {
            let decoded = decode_base64(encoded_text)?;
            Ok(Some(String::from_utf8(decoded)?))
        }
        "Q" => {
            let text_with_spaces = encoded_text.replace('_', " ");
            Ok(Some(decode_quoted_printable(&text_with_spaces)?))
        }
        other => Err(Error::InvalidEncoding(format!(
            "unknown RFC 2047 encoding: {other}"
        ))),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn base64_roundtrips_any_bytes(data: Vec<u8>) {
            let encoded = encode_base64(&data);
            prop_assert_eq!(decode_base64(&encoded).unwrap(), data);
        }

        #[test]
        fn quoted_printable_roundtrips_utf8_text(text in "[^\r\n]{0,200}") {
            let encoded = encode_quoted_printable(text.as_bytes());
            prop_assert_eq!(decode_quoted_printable(&encoded).unwrap(), text);
        }

        #[test]
        fn rfc2047_roundtrips_arbitrary_text(text in "[^\r\n]{0,200}") {
            let encoded = encode_rfc2047_words(&text, "UTF-8");
            prop_assert_eq!(decode_rfc2047(&encoded).unwrap(), text);
        }
    }
}
