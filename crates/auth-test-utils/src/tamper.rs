//! Token corruption helpers
//!
//! Single-character corruptions that keep a token structurally valid
//! base64url, so verification reaches the signature check instead of
//! failing as malformed.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Header, payload, and signature segment indices.
pub const HEADER: usize = 0;
pub const PAYLOAD: usize = 1;
pub const SIGNATURE: usize = 2;

/// Replace the first character of the chosen segment with a different
/// base64url character. The result decodes, but to different bytes.
#[must_use]
pub fn corrupt_segment(token: &str, segment: usize) -> String {
    token
        .split('.')
        .enumerate()
        .map(|(i, part)| {
            if i == segment {
                flip_first_char(part)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn flip_first_char(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => {
            let replacement = if first == 'A' { 'B' } else { 'A' };
            std::iter::once(replacement).chain(chars).collect()
        }
        None => "A".to_string(),
    }
}

/// Decode one segment as JSON, without any verification.
#[must_use]
pub fn decode_segment_json(token: &str, segment: usize) -> Option<serde_json::Value> {
    let part = token.split('.').nth(segment)?;
    let bytes = URL_SAFE_NO_PAD.decode(part).ok()?;
    serde_json::from_slice(&bytes).ok()
}
