//! Per-order key diversification.
//!
//! The terminal key is never used directly as a MAC key. Each order gets its
//! own key: the zero-padded order identifier encrypted with 3DES-CBC under the
//! terminal key, with an all-zero IV and no unpadding of the result.

use base64::Engine;
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use des::TdesEde3;
use zeroize::Zeroizing;

use crate::constants::{TDES_BLOCK_LEN, TDES_KEY_LEN};
use crate::error::RedsysError;

type TdesCbcEnc = cbc::Encryptor<TdesEde3>;

/// Order-specific MAC key. Zeroed on drop; recomputed for every operation.
pub type DiversifiedKey = Zeroizing<Vec<u8>>;

/// Derive the diversified key for `order` from a base64 terminal key.
///
/// Output length equals the order length rounded up to a multiple of 8.
pub fn diversify_key(order: &str, terminal_key_b64: &str) -> Result<DiversifiedKey, RedsysError> {
    if order.is_empty() {
        return Err(RedsysError::InvalidOrder("order must not be empty".into()));
    }

    let raw_key = Zeroizing::new(
        base64::engine::general_purpose::STANDARD
            .decode(terminal_key_b64.trim())
            .map_err(|e| RedsysError::Config(format!("terminal key is not valid base64: {e}")))?,
    );
    let key = prepare_tdes_key(&raw_key)?;

    let mut buf = Zeroizing::new(order.as_bytes().to_vec());
    let msg_len = buf.len();
    buf.resize(padded_len(msg_len), 0);

    let cipher = TdesCbcEnc::new_from_slices(&key[..], &[0u8; TDES_BLOCK_LEN])
        .map_err(|e| RedsysError::Config(format!("3DES init failed: {e}")))?;
    let padded = buf.len();
    cipher
        .encrypt_padded_mut::<NoPadding>(&mut buf, padded)
        .map_err(|_| RedsysError::Config("3DES encryption failed".into()))?;

    Ok(buf)
}

/// Stretch or truncate raw key bytes to a 24-byte EDE3 key by repetition.
fn prepare_tdes_key(raw: &[u8]) -> Result<Zeroizing<[u8; TDES_KEY_LEN]>, RedsysError> {
    if raw.is_empty() {
        return Err(RedsysError::Config("terminal key is empty".into()));
    }
    let mut key = Zeroizing::new([0u8; TDES_KEY_LEN]);
    for (dst, src) in key.iter_mut().zip(raw.iter().cycle()) {
        *dst = *src;
    }
    Ok(key)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(TDES_BLOCK_LEN) * TDES_BLOCK_LEN
}
