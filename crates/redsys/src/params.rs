//! `Ds_MerchantParameters` codec: base64-wrapped flat JSON objects.
//!
//! Decoding never feeds back into signing: signatures are always computed
//! over the original base64 text, so the decoded map is free to normalize
//! values (percent-decoding) without breaking verification.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RedsysError;

/// Decoded parameters as a flat JSON object (keys sorted).
pub type ParameterMap = serde_json::Map<String, Value>;

/// Decode a base64 parameter blob into a JSON object.
///
/// String values are percent-decoded after parsing because the gateway
/// URL-encodes some fields (dates, hours, merchant data) inside the JSON.
/// Byte sequences that are not valid UTF-8 after decoding become U+FFFD.
pub fn decode_parameters(blob: &str) -> Result<ParameterMap, RedsysError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.trim())
        .map_err(|e| RedsysError::Decode(format!("merchant parameters are not valid base64: {e}")))?;

    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| RedsysError::Decode(format!("merchant parameters are not valid JSON: {e}")))?;

    let Value::Object(mut map) = value else {
        return Err(RedsysError::Decode(
            "merchant parameters must be a JSON object".into(),
        ));
    };

    for value in map.values_mut() {
        if let Value::String(s) = value {
            if s.contains('%') {
                let decoded =
                    String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes())).into_owned();
                *s = decoded;
            }
        }
    }

    Ok(map)
}

/// Serialize parameters as compact JSON and wrap them in standard base64.
///
/// Map types with sorted keys (`BTreeMap`, [`ParameterMap`]) give a
/// byte-stable encoding, which matters when the result is signed.
pub fn encode_parameters<T>(params: &T) -> Result<String, RedsysError>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec(params)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Typed view of a notification's merchant parameters.
///
/// Every known field is optional; scalar JSON values (string, number, bool)
/// are accepted and kept as text. Unknown fields land in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerchantParameters {
    #[serde(rename = "Ds_Order", alias = "DS_ORDER", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(rename = "Ds_Amount", alias = "DS_AMOUNT", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(rename = "Ds_Currency", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(rename = "Ds_Response", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(rename = "Ds_Date", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "Ds_Hour", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    #[serde(rename = "Ds_MerchantCode", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub merchant_code: Option<String>,
    #[serde(rename = "Ds_Terminal", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub terminal: Option<String>,
    #[serde(rename = "Ds_TransactionType", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(rename = "Ds_AuthorisationCode", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub authorisation_code: Option<String>,
    #[serde(rename = "Ds_SecurePayment", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub secure_payment: Option<String>,
    #[serde(rename = "Ds_Card_Number", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(rename = "Ds_Card_Country", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub card_country: Option<String>,
    #[serde(rename = "Ds_Card_Brand", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub card_brand: Option<String>,
    #[serde(rename = "Ds_Card_Typology", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub card_typology: Option<String>,
    #[serde(rename = "Ds_ProcessedPayMethod", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub processed_pay_method: Option<String>,
    #[serde(rename = "Ds_ConsumerLanguage", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub consumer_language: Option<String>,
    #[serde(rename = "Ds_MerchantData", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub merchant_data: Option<String>,
    #[serde(rename = "Ds_Titular", default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub titular: Option<String>,

    /// Fields without a typed slot (`Ds_Control_*`, future additions).
    #[serde(flatten)]
    pub extra: ParameterMap,
}

impl MerchantParameters {
    /// Parse an already decoded parameter map.
    pub fn from_map(map: ParameterMap) -> Result<Self, RedsysError> {
        serde_json::from_value(Value::Object(map))
            .map_err(|e| RedsysError::Decode(format!("unexpected merchant parameter shape: {e}")))
    }

    /// Decode and parse a base64 parameter blob in one step.
    pub fn decode(blob: &str) -> Result<Self, RedsysError> {
        Self::from_map(decode_parameters(blob)?)
    }

    /// Amount in currency units. `Ds_Amount` is expressed in minor units.
    pub fn amount_in_units(&self) -> Option<f64> {
        let raw = self.amount.as_deref().filter(|a| !a.is_empty())?;
        match raw.trim().parse::<f64>() {
            Ok(minor) if minor.is_finite() => Some(minor / 100.0),
            _ => {
                tracing::warn!(amount = %raw, "could not parse Ds_Amount");
                None
            }
        }
    }

    /// Notification timestamp from `Ds_Date` (`dd/mm/yyyy`) and `Ds_Hour`
    /// (`HH:MM`), interpreted as UTC.
    pub fn notified_at(&self) -> Option<DateTime<Utc>> {
        let date = self.date.as_deref().filter(|d| !d.is_empty())?;
        let hour = self.hour.as_deref().filter(|h| !h.is_empty())?;
        match NaiveDateTime::parse_from_str(&format!("{date} {hour}"), "%d/%m/%Y %H:%M") {
            Ok(naive) => Some(naive.and_utc()),
            Err(_) => {
                tracing::warn!(date = %date, hour = %hour, "could not parse Ds_Date/Ds_Hour");
                None
            }
        }
    }

    pub fn is_secure_payment(&self) -> bool {
        self.secure_payment.as_deref() == Some("1")
    }
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a scalar value, found {other}"
        ))),
    }
}
