//! RedSys notification verification and request signing.
//!
//! Verifies the asynchronous notifications the RedSys gateway posts after a
//! card payment, signs merchant→gateway requests, and protects the
//! credentials of the systems accepted notifications are forwarded to.
//!
//! # Signing model
//!
//! - **Diversification** ([`diversify::diversify_key`]) derives a per-order key
//!   by 3DES-CBC encrypting the order under the terminal key
//! - **Signature** ([`hmac::compute_signature`]) is HMAC-SHA256 over the exact
//!   base64 `Ds_MerchantParameters` text, keyed with the diversified key
//! - **Verification** ([`NotificationVerifier`]) decodes, resolves the merchant
//!   record for the order and compares signatures in constant time
//!
//! # Quick example
//!
//! ```
//! use std::sync::Arc;
//! use redsys::{InMemoryMerchantStore, MerchantRecord, MerchantStore, Notification, NotificationVerifier};
//!
//! let store = InMemoryMerchantStore::new();
//! store
//!     .insert(
//!         MerchantRecord::new("https://erp.example.com", "vault-key")
//!             .with_order("B250001234")
//!             .with_terminal_key("sq7HjrUOBfKmC576ILgskD5srU870gJ7"),
//!     )
//!     .unwrap();
//!
//! let verifier = NotificationVerifier::new(Arc::new(store));
//! let outcome = verifier
//!     .verify(&Notification::new(
//!         "eyJEc19BbW91bnQiOiIxMDAiLCJEc19PcmRlciI6IkIyNTAwMDEyMzQifQ==",
//!         "8XjJgDW5Px_tTFKHLctZpIUbSblEkAgIfBeaeqpbe7o",
//!     ))
//!     .unwrap();
//! assert!(outcome.is_accepted());
//! ```

// Core protocol
pub mod constants;
pub mod diversify;
pub mod error;
pub mod hmac;
pub mod params;
pub mod security;

// Credentials and merchant configuration
pub mod digest;
pub mod merchant_store;
pub mod vault;

// Verification and signing
pub mod outbound;
pub mod verifier;

pub mod config;

// HTTP client
#[cfg(feature = "full")]
pub mod rest_client;

// Re-exports
pub use config::{ConfigError, RedsysConfig};
pub use constants::SIGNATURE_VERSION;
pub use digest::{keyed_digest, DigestAlgorithm};
pub use error::RedsysError;
pub use hmac::verify_signature as verify_notification;
pub use merchant_store::{AuthType, Credentials, InMemoryMerchantStore, MerchantRecord, MerchantStore};
#[cfg(feature = "full")]
pub use merchant_store::SqliteMerchantStore;
pub use outbound::{sign_outbound, PaymentRequest, SignedRequest};
pub use params::{decode_parameters, encode_parameters, MerchantParameters, ParameterMap};
pub use vault::{protect_secret, reveal_secret};
pub use verifier::{AcceptedNotification, Notification, NotificationVerifier, Outcome};
#[cfg(feature = "full")]
pub use rest_client::RestClient;
