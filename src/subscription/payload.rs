//! Transport decoding of subscription payloads

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;

/// Accepts padded and unpadded input and ignores non-zero trailing bits,
/// which subscription providers emit routinely.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64 in either the standard or the URL-safe alphabet.
pub fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    LENIENT.decode(normalized.as_bytes()).ok()
}

/// Decode base64 into UTF-8 text
pub fn decode_base64_text(input: &str) -> Option<String> {
    String::from_utf8(decode_base64(input)?).ok()
}

/// Undo whole-payload transport encoding if present.
///
/// A payload that already contains a URI scheme separator is taken as-is.
/// Anything that fails to decode is also returned unchanged so the line
/// parser can reject it line by line.
pub fn decode_payload(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains("://") {
        return trimmed.to_string();
    }

    decode_base64_text(trimmed).unwrap_or_else(|| trimmed.to_string())
}

/// Split decoded payload text into trimmed, non-empty lines
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
