use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::diversify::diversify_key;
use crate::error::RedsysError;
use crate::security::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Compute the RedSys signature for an encoded parameter blob.
///
/// The MAC covers the literal text of `encoded_parameters` (never the
/// re-serialized JSON) and is keyed with the order's diversified key.
/// Returns the digest as standard base64.
pub fn compute_signature(
    encoded_parameters: &str,
    order: &str,
    terminal_key_b64: &str,
) -> Result<String, RedsysError> {
    let key = diversify_key(order, terminal_key_b64)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| RedsysError::Config(format!("HMAC key rejected: {e}")))?;
    mac.update(encoded_parameters.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Map a gateway-supplied signature onto the standard base64 alphabet and
/// restore any stripped `=` padding.
pub fn normalize_signature(received: &str) -> String {
    let mut normalized: String = received
        .trim()
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let rem = normalized.len() % 4;
    if rem != 0 {
        normalized.extend(std::iter::repeat('=').take(4 - rem));
    }
    normalized
}

/// Compare a received signature against the expected one.
///
/// The received value is normalized first. Decode failures on either side
/// yield `false`; the byte comparison always runs and takes constant time.
pub fn signatures_match(received: &str, expected: &str) -> bool {
    let engine = &base64::engine::general_purpose::STANDARD;
    let received = engine.decode(normalize_signature(received)).ok();
    let expected = engine.decode(expected.trim()).ok();

    // Decode failures still go through the comparison against a sentinel.
    let decoded = matches!(
        (&received, &expected),
        (Some(r), Some(e)) if !r.is_empty() && !e.is_empty()
    );
    let received = received.unwrap_or_default();
    let expected = expected.unwrap_or_else(|| vec![0u8; 32]);

    constant_time_eq(&received, &expected) && decoded
}

/// Verify a notification signature end to end. Any failure while deriving
/// the expected signature yields `false`.
pub fn verify_signature(
    encoded_parameters: &str,
    received_signature: &str,
    order: &str,
    terminal_key_b64: &str,
) -> bool {
    match compute_signature(encoded_parameters, order, terminal_key_b64) {
        Ok(expected) => signatures_match(received_signature, &expected),
        Err(e) => {
            tracing::warn!(error = %e, "could not derive expected signature");
            false
        }
    }
}
