//! Notification verification: decode, resolve the merchant, check the MAC.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::constants::{FIELD_MERCHANT_PARAMETERS, FIELD_SIGNATURE, FIELD_SIGNATURE_VERSION};
use crate::error::RedsysError;
use crate::hmac::{compute_signature, signatures_match};
use crate::merchant_store::{MerchantRecord, MerchantStore};
use crate::outbound::sign_outbound;
use crate::params::{decode_parameters, MerchantParameters, ParameterMap};

/// A notification as posted by the gateway.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "Ds_MerchantParameters", default)]
    pub merchant_parameters: String,
    #[serde(rename = "Ds_Signature", default)]
    pub signature: String,
    #[serde(rename = "Ds_SignatureVersion", default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<String>,
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("merchant_parameters", &self.merchant_parameters)
            .field("signature", &"[REDACTED]")
            .field("signature_version", &self.signature_version)
            .finish()
    }
}

impl Notification {
    pub fn new(merchant_parameters: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            merchant_parameters: merchant_parameters.into(),
            signature: signature.into(),
            signature_version: None,
        }
    }

    /// Build a notification the way the gateway signs one. Used to produce
    /// test payloads for a known terminal key.
    pub fn signed<T>(parameters: &T, order: &str, terminal_key_b64: &str) -> Result<Self, RedsysError>
    where
        T: Serialize + ?Sized,
    {
        let signed = sign_outbound(parameters, order, terminal_key_b64)?;
        Ok(Self {
            merchant_parameters: signed.merchant_parameters,
            signature: signed.signature,
            signature_version: Some(signed.signature_version),
        })
    }

    /// Parse an `application/x-www-form-urlencoded` body (or query string).
    /// Unknown fields are ignored; missing ones stay empty.
    pub fn from_form(body: &str) -> Self {
        let mut notification = Self::default();
        for (key, value) in url::form_urlencoded::parse(body.trim().as_bytes()) {
            match key.as_ref() {
                FIELD_MERCHANT_PARAMETERS => notification.merchant_parameters = value.into_owned(),
                FIELD_SIGNATURE => notification.signature = value.into_owned(),
                FIELD_SIGNATURE_VERSION => notification.signature_version = Some(value.into_owned()),
                _ => {}
            }
        }
        notification
    }
}

/// A notification whose signature verified.
#[derive(Debug, Clone)]
pub struct AcceptedNotification {
    pub order: String,
    pub parameters: MerchantParameters,
    /// Decoded parameter map, including fields without a typed slot.
    pub raw: ParameterMap,
    pub record: MerchantRecord,
}

/// Result of a completed verification. A bad signature is an outcome, not
/// an error: callers must not act on a rejected notification.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accepted(Box<AcceptedNotification>),
    Rejected { order: String },
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted(_))
    }

    pub fn order(&self) -> &str {
        match self {
            Outcome::Accepted(accepted) => &accepted.order,
            Outcome::Rejected { order } => order,
        }
    }
}

/// Verifies gateway notifications against merchant configuration supplied
/// by an injected [`MerchantStore`].
///
/// Holds no mutable state; share one instance across threads.
#[derive(Clone)]
pub struct NotificationVerifier {
    store: Arc<dyn MerchantStore>,
    default_terminal_key: Option<String>,
}

impl fmt::Debug for NotificationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationVerifier")
            .field(
                "default_terminal_key",
                &self.default_terminal_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl NotificationVerifier {
    pub fn new(store: Arc<dyn MerchantStore>) -> Self {
        Self {
            store,
            default_terminal_key: None,
        }
    }

    /// Terminal key used when the resolved record carries none.
    pub fn with_default_terminal_key(mut self, key: impl Into<String>) -> Self {
        self.default_terminal_key = Some(key.into()).filter(|k: &String| !k.is_empty());
        self
    }

    pub fn verify(&self, notification: &Notification) -> Result<Outcome, RedsysError> {
        // 1. Required fields
        let encoded = notification.merchant_parameters.as_str();
        let received = notification.signature.trim();
        let mut missing = Vec::new();
        if encoded.trim().is_empty() {
            missing.push(FIELD_MERCHANT_PARAMETERS);
        }
        if received.is_empty() {
            missing.push(FIELD_SIGNATURE);
        }
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "notification missing required fields");
            return Err(RedsysError::MissingFields(missing.join(", ")));
        }
        tracing::debug!("notification received");

        // 2. Decode parameters and extract the order
        let raw = decode_parameters(encoded)
            .map_err(|e| RedsysError::MalformedParameters(e.to_string()))?;
        let parameters = MerchantParameters::from_map(raw.clone())
            .map_err(|e| RedsysError::MalformedParameters(e.to_string()))?;
        let order = parameters
            .order
            .clone()
            .filter(|o| !o.trim().is_empty())
            .ok_or_else(|| RedsysError::MalformedParameters("Ds_Order is missing".into()))?;
        tracing::debug!(order = %order, fields = raw.len(), "merchant parameters decoded");

        // 3. Resolve the merchant record
        let Some(record) = self.store.resolve(&order)? else {
            tracing::warn!(order = %order, "notification for unregistered order");
            return Err(RedsysError::NotRegistered);
        };
        let terminal_key = record
            .terminal_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .or(self.default_terminal_key.as_deref())
            .ok_or_else(|| {
                RedsysError::Config(format!("no terminal key for merchant record {}", record.id))
            })?;
        tracing::debug!(order = %order, record = %record.id, "order resolved");

        // 4. Signature over the exact received blob
        let expected = compute_signature(encoded, &order, terminal_key).map_err(|e| match e {
            RedsysError::Config(msg) => RedsysError::Config(msg),
            other => RedsysError::Config(other.to_string()),
        })?;
        if !signatures_match(received, &expected) {
            tracing::warn!(order = %order, "notification signature mismatch, rejected");
            return Ok(Outcome::Rejected { order });
        }

        tracing::debug!(order = %order, "notification signature verified");
        Ok(Outcome::Accepted(Box::new(AcceptedNotification {
            order,
            parameters,
            raw,
            record,
        })))
    }
}
