//! Keyed one-way digests for callers that need an opaque fingerprint of a
//! value (not a MAC: the key is simply appended before hashing).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl DigestAlgorithm {
    /// `"SHA-512"` in any case selects SHA-512; every other label is SHA-256.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("SHA-512") {
            DigestAlgorithm::Sha512
        } else {
            DigestAlgorithm::Sha256
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }
}

/// Lowercase hex digest of `data || key`.
pub fn keyed_digest(data: &str, key: &str, algorithm: DigestAlgorithm) -> String {
    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data.as_bytes());
            hasher.update(key.as_bytes());
            hex::encode(hasher.finalize())
        }
        DigestAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(data.as_bytes());
            hasher.update(key.as_bytes());
            hex::encode(hasher.finalize())
        }
    }
}
