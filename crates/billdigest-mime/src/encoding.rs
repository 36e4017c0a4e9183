//! MIME encoding and decoding utilities.
//!
//! Supports Base64 (standard and the URL-safe transport variant used by mail
//! APIs) and RFC 2047 header encoding.

use crate::error::Result;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD, URL_SAFE};
use base64::engine::DecodePaddingMode;

/// Standard alphabet, accepting input with or without `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

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

/// Encodes data as Base64 wrapped at 76 columns with CRLF line breaks,
/// as required for MIME body parts.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2);

    // Base64 output is pure ASCII, so byte chunks are valid char boundaries
    for (index, chunk) in encoded.as_bytes().chunks(MAX_LINE_LENGTH).enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        result.push_str(&String::from_utf8_lossy(chunk));
    }

    result
}

/// Encodes bytes in the URL-safe transport alphabet (`-` and `_` in place
/// of `+` and `/`).
#[must_use]
pub fn encode_transport(data: &[u8]) -> String {
    URL_SAFE.encode(data)
}

/// Decodes transport Base64 into raw bytes.
///
/// The URL-safe characters are translated back to the standard alphabet
/// first, so standard input decodes as well. Whitespace is ignored and
/// padding is optional.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64 after translation.
pub fn decode_transport(data: &str) -> Result<Vec<u8>> {
    let standard: String = data
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    LENIENT.decode(standard).map_err(Into::into)
}

/// Decodes transport Base64 into text.
///
/// Invalid UTF-8 sequences are replaced with U+FFFD rather than failing,
/// since bill bodies are only ever scanned, never round-tripped.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_transport_text(data: &str) -> Result<String> {
    let bytes = decode_transport(data)?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Maximum line length for wrapped Base64 output.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes a header value using RFC 2047 encoding.
///
/// Format: `=?charset?B?encoded-text?=`. Pure ASCII values are returned
/// unchanged.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && c != '=' && c != '?') {
        return text.to_string();
    }

    let encoded = encode_base64(text.as_bytes());
    format!("=?{charset}?B?{encoded}?=")
}
