//! AES-256-GCM protection for credentials stored at rest.
//!
//! Token layout: `base64(nonce[12] || tag[16] || ciphertext)`.
//! The vault key is independent of any terminal key: it is only ever hashed
//! into an AES key here and never used for signing.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce as AesNonce};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::constants::{VAULT_MIN_TOKEN_LEN, VAULT_NONCE_LEN, VAULT_TAG_LEN};
use crate::error::RedsysError;

/// Standard alphabet, padding optional, non-zero trailing bits accepted.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encrypt `plaintext` under `key`, returning a base64 token.
///
/// A fresh random nonce is drawn for every call.
pub fn protect_secret(plaintext: &str, key: &str) -> Result<String, RedsysError> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; VAULT_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = AesNonce::from_slice(&nonce_bytes);

    let mut buffer = plaintext.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(nonce, b"", &mut buffer)
        .map_err(|_| RedsysError::Config("vault encryption failed".into()))?;

    let mut token = Vec::with_capacity(VAULT_MIN_TOKEN_LEN + buffer.len());
    token.extend_from_slice(&nonce_bytes);
    token.extend_from_slice(tag.as_slice());
    token.extend_from_slice(&buffer);
    Ok(base64::engine::general_purpose::STANDARD.encode(token))
}

/// Decrypt and authenticate a token produced by [`protect_secret`].
///
/// Any malformed input or tag mismatch yields [`RedsysError::Decrypt`];
/// no plaintext is ever returned unless the tag verifies.
pub fn reveal_secret(token: &str, key: &str) -> Result<String, RedsysError> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(token.trim())
        .map_err(|e| RedsysError::Decrypt(format!("token is not valid base64: {e}")))?;
    if raw.len() < VAULT_MIN_TOKEN_LEN {
        return Err(RedsysError::Decrypt(format!(
            "token too short: {} bytes, minimum {VAULT_MIN_TOKEN_LEN}",
            raw.len()
        )));
    }

    let (nonce_bytes, rest) = raw.split_at(VAULT_NONCE_LEN);
    let (tag_bytes, ciphertext) = rest.split_at(VAULT_TAG_LEN);

    let cipher = cipher_for(key)?;
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            AesNonce::from_slice(nonce_bytes),
            b"",
            &mut buffer,
            GenericArray::from_slice(tag_bytes),
        )
        .map_err(|_| RedsysError::Decrypt("authentication tag mismatch".into()))?;

    String::from_utf8(buffer.to_vec())
        .map_err(|_| RedsysError::Decrypt("plaintext is not valid UTF-8".into()))
}

/// SHA-256 of the key material: the base64-decoded key when `key` decodes
/// leniently (see [`lenient_base64`]), its UTF-8 bytes otherwise.
fn derive_vault_key(key: &str) -> Result<Zeroizing<[u8; 32]>, RedsysError> {
    if key.is_empty() {
        return Err(RedsysError::Config("vault key is empty".into()));
    }
    let material = Zeroizing::new(lenient_base64(key).unwrap_or_else(|| key.as_bytes().to_vec()));
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&Sha256::digest(&material[..]));
    Ok(out)
}

/// Non-validating base64 decode, as stored vault keys were written with.
///
/// Characters outside the alphabet are skipped and decoding stops at the
/// first complete padding run. `None` for non-ASCII input or when the data
/// characters do not end on a quad boundary.
fn lenient_base64(key: &str) -> Option<Vec<u8>> {
    if !key.is_ascii() {
        return None;
    }
    let mut data = String::with_capacity(key.len());
    let mut pads = 0;
    let mut terminated = false;
    for c in key.chars() {
        if c == '=' {
            let quad_pos = data.len() % 4;
            if quad_pos >= 2 {
                pads += 1;
                if quad_pos + pads >= 4 {
                    terminated = true;
                    break;
                }
            }
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '+' || c == '/' {
            data.push(c);
            pads = 0;
        }
    }
    if !terminated && data.len() % 4 != 0 {
        return None;
    }
    LENIENT.decode(&data).ok()
}

fn cipher_for(key: &str) -> Result<Aes256Gcm, RedsysError> {
    let key = derive_vault_key(key)?;
    Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| RedsysError::Config(format!("vault cipher init failed: {e}")))
}
