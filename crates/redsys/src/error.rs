use thiserror::Error;

/// Errors returned by RedSys verification, signing and vault operations.
///
/// A signature that simply does not match is *not* an error: it surfaces as
/// [`crate::verifier::Outcome::Rejected`] or a `false` verification result.
#[derive(Debug, Error)]
pub enum RedsysError {
    /// Missing or malformed terminal key / vault key. Fatal, never retried.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed base64 or JSON in caller-supplied input.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("missing fields: {0}")]
    MissingFields(String),

    #[error("malformed merchant parameters: {0}")]
    MalformedParameters(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// The order does not resolve to a merchant record. The message never
    /// carries the order itself.
    #[error("not registered")]
    NotRegistered,

    /// Vault token could not be authenticated or decoded.
    #[error("decrypt error: {0}")]
    Decrypt(String),

    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl RedsysError {
    /// True for errors caused by the caller's input (4xx-equivalent), false
    /// for configuration, storage and transport failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RedsysError::Decode(_)
                | RedsysError::MissingFields(_)
                | RedsysError::MalformedParameters(_)
                | RedsysError::InvalidOrder(_)
                | RedsysError::NotRegistered
                | RedsysError::InvalidRequest(_)
        )
    }
}
