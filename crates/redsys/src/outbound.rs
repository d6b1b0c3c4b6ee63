//! Signing of merchant→gateway requests (PayGold links, REST operations).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::{DEFAULT_TRANSACTION_TYPE, SIGNATURE_VERSION};
use crate::error::RedsysError;
use crate::hmac::compute_signature;
use crate::merchant_store::{MerchantRecord, MerchantStore};
use crate::params::encode_parameters;

/// Signed request body as the gateway expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRequest {
    #[serde(rename = "Ds_MerchantParameters")]
    pub merchant_parameters: String,
    #[serde(rename = "Ds_SignatureVersion")]
    pub signature_version: String,
    #[serde(rename = "Ds_Signature")]
    pub signature: String,
}

/// Encode `parameters` and sign them for `order` with the merchant key.
///
/// The signature covers the exact encoded text placed in the request.
pub fn sign_outbound<T>(
    parameters: &T,
    order: &str,
    secret_key_b64: &str,
) -> Result<SignedRequest, RedsysError>
where
    T: Serialize + ?Sized,
{
    let merchant_parameters = encode_parameters(parameters)?;
    let signature = compute_signature(&merchant_parameters, order, secret_key_b64)?;
    Ok(SignedRequest {
        merchant_parameters,
        signature_version: SIGNATURE_VERSION.to_string(),
        signature,
    })
}

/// Outbound payment request. Optional fields left as `None` (or empty) are
/// not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRequest {
    /// Amount in minor units.
    pub amount: String,
    pub order: String,
    pub transaction_type: Option<String>,
    pub merchant_code: Option<String>,
    pub terminal: Option<String>,
    pub currency: Option<String>,
    pub product_description: Option<String>,
    pub titular: Option<String>,
    pub pay_methods: Option<String>,
    pub merchant_data: Option<String>,
    pub notify_url: Option<String>,
    pub buyer_registration: Option<String>,
    pub consumer_language: Option<String>,
    pub identifier: Option<String>,
    pub expiry_date: Option<String>,
    pub paygold: bool,
    /// Raw `DS_MERCHANT_*` parameters. These win over every typed field.
    pub extra_parameters: BTreeMap<String, String>,
}

impl PaymentRequest {
    pub fn new(order: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            order: order.into(),
            amount: amount.into(),
            ..Self::default()
        }
    }

    /// Build the `DS_MERCHANT_*` parameter map.
    pub fn to_parameters(&self) -> Result<BTreeMap<String, String>, RedsysError> {
        let mut params = BTreeMap::new();

        let typed: [(&str, Option<&str>); 15] = [
            ("DS_MERCHANT_AMOUNT", Some(self.amount.as_str())),
            ("DS_MERCHANT_ORDER", Some(self.order.as_str())),
            ("DS_MERCHANT_TRANSACTIONTYPE", self.transaction_type.as_deref()),
            ("DS_MERCHANT_MERCHANTCODE", self.merchant_code.as_deref()),
            ("DS_MERCHANT_TERMINAL", self.terminal.as_deref()),
            ("DS_MERCHANT_CURRENCY", self.currency.as_deref()),
            ("DS_MERCHANT_PRODUCTDESCRIPTION", self.product_description.as_deref()),
            ("DS_MERCHANT_TITULAR", self.titular.as_deref()),
            ("DS_MERCHANT_PAYMETHODS", self.pay_methods.as_deref()),
            ("DS_MERCHANT_MERCHANTDATA", self.merchant_data.as_deref()),
            ("DS_MERCHANT_NOTIFY_URL", self.notify_url.as_deref()),
            ("DS_MERCHANT_BUYERREGISTRATION", self.buyer_registration.as_deref()),
            ("DS_MERCHANT_CONSUMERLANGUAGE", self.consumer_language.as_deref()),
            ("DS_MERCHANT_IDENTIFIER", self.identifier.as_deref()),
            ("DS_MERCHANT_EXPIRYDATE", self.expiry_date.as_deref()),
        ];
        for (field, value) in typed {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                params.insert(field.to_string(), value.to_string());
            }
        }

        for (field, value) in &self.extra_parameters {
            params.insert(field.clone(), value.clone());
        }

        if self.paygold {
            params
                .entry("DS_MERCHANT_PAYGOLD".to_string())
                .or_insert_with(|| "true".to_string());
        }
        params
            .entry("DS_MERCHANT_TRANSACTIONTYPE".to_string())
            .or_insert_with(|| DEFAULT_TRANSACTION_TYPE.to_string());

        let missing: Vec<&str> = ["DS_MERCHANT_AMOUNT", "DS_MERCHANT_ORDER"]
            .into_iter()
            .filter(|field| params.get(*field).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(RedsysError::InvalidRequest(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }

        Ok(params)
    }

    /// Build, encode and sign the request.
    pub fn sign(&self, secret_key_b64: &str) -> Result<SignedRequest, RedsysError> {
        let params = self.to_parameters()?;
        // extra parameters may have replaced the order
        let order = params
            .get("DS_MERCHANT_ORDER")
            .map(String::as_str)
            .unwrap_or_default();
        tracing::debug!(order = %order, fields = params.len(), "signing payment request");
        sign_outbound(&params, order, secret_key_b64)
    }

    /// Sign the request and store `record` under its order, so the
    /// gateway's notification for that order resolves later.
    ///
    /// The record is bound to the signed order. It keeps its own terminal key
    /// when it has one, otherwise it takes `secret_key_b64`.
    pub fn sign_and_register(
        &self,
        secret_key_b64: &str,
        record: MerchantRecord,
        store: &dyn MerchantStore,
    ) -> Result<SignedRequest, RedsysError> {
        let signed = self.sign(secret_key_b64)?;
        let params = self.to_parameters()?;
        let order = params
            .get("DS_MERCHANT_ORDER")
            .cloned()
            .unwrap_or_default();

        let mut record = record.with_order(order.as_str());
        if record.terminal_key.as_deref().map_or(true, str::is_empty) {
            record = record.with_terminal_key(secret_key_b64);
        }
        let record_id = record.id.clone();
        store.insert(record)?;
        tracing::info!(order = %order, record = %record_id, "payment request registered");
        Ok(signed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmac::verify_signature;
    use crate::merchant_store::{AuthType, InMemoryMerchantStore};
    use crate::params::decode_parameters;

    const TEST_KEY: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

    #[test]
    fn test_sign_outbound_known_answer() {
        let mut params = BTreeMap::new();
        params.insert("Ds_Order", "B250001234");
        params.insert("Ds_Amount", "100");
        let signed = sign_outbound(&params, "B250001234", TEST_KEY).unwrap();
        assert_eq!(
            signed.merchant_parameters,
            "eyJEc19BbW91bnQiOiIxMDAiLCJEc19PcmRlciI6IkIyNTAwMDEyMzQifQ=="
        );
        assert_eq!(signed.signature, "8XjJgDW5Px/tTFKHLctZpIUbSblEkAgIfBeaeqpbe7o=");
        assert_eq!(signed.signature_version, "HMAC_SHA256_V1");
    }

    #[test]
    fn test_signed_request_wire_names() {
        let signed = sign_outbound(&BTreeMap::from([("a", "b")]), "1", TEST_KEY).unwrap();
        let json = serde_json::to_value(&signed).unwrap();
        assert_eq!(json["Ds_SignatureVersion"], "HMAC_SHA256_V1");
        assert!(json.get("Ds_MerchantParameters").is_some());
        assert!(json.get("Ds_Signature").is_some());
    }

    #[test]
    fn test_sign_outbound_empty_order() {
        let err = sign_outbound(&BTreeMap::from([("a", "b")]), "", TEST_KEY).unwrap_err();
        assert!(matches!(err, RedsysError::InvalidOrder(_)));
    }

    #[test]
    fn test_to_parameters_defaults() {
        let mut req = PaymentRequest::new("B250001234", "1500");
        req.merchant_code = Some("263100000".into());
        req.terminal = Some("49".into());
        req.currency = Some("978".into());
        req.paygold = true;

        let params = req.to_parameters().unwrap();
        assert_eq!(params["DS_MERCHANT_AMOUNT"], "1500");
        assert_eq!(params["DS_MERCHANT_ORDER"], "B250001234");
        assert_eq!(params["DS_MERCHANT_TRANSACTIONTYPE"], "0");
        assert_eq!(params["DS_MERCHANT_PAYGOLD"], "true");
        assert_eq!(params["DS_MERCHANT_MERCHANTCODE"], "263100000");
        assert!(!params.contains_key("DS_MERCHANT_TITULAR"));
    }

    #[test]
    fn test_extra_parameters_override() {
        let mut req = PaymentRequest::new("B250001234", "1500");
        req.transaction_type = Some("F".into());
        req.paygold = true;
        req.extra_parameters
            .insert("DS_MERCHANT_TRANSACTIONTYPE".into(), "7".into());
        req.extra_parameters
            .insert("DS_MERCHANT_PAYGOLD".into(), "false".into());
        req.extra_parameters
            .insert("DS_MERCHANT_CUSTOMER_MOBILE".into(), "600000000".into());

        let params = req.to_parameters().unwrap();
        assert_eq!(params["DS_MERCHANT_TRANSACTIONTYPE"], "7");
        assert_eq!(params["DS_MERCHANT_PAYGOLD"], "false");
        assert_eq!(params["DS_MERCHANT_CUSTOMER_MOBILE"], "600000000");
    }

    #[test]
    fn test_required_fields() {
        let err = PaymentRequest::new("", "").to_parameters().unwrap_err();
        let RedsysError::InvalidRequest(msg) = err else {
            panic!("expected InvalidRequest");
        };
        assert!(msg.contains("DS_MERCHANT_AMOUNT"));
        assert!(msg.contains("DS_MERCHANT_ORDER"));

        let mut req = PaymentRequest::new("", "100");
        req.extra_parameters
            .insert("DS_MERCHANT_ORDER".into(), "X1".into());
        assert!(req.to_parameters().is_ok());
    }

    #[test]
    fn test_sign_request_verifies() {
        let mut req = PaymentRequest::new("PG0001", "990");
        req.product_description = Some("Reserva habitación".into());
        let signed = req.sign(TEST_KEY).unwrap();

        assert!(verify_signature(
            &signed.merchant_parameters,
            &signed.signature,
            "PG0001",
            TEST_KEY
        ));
        let decoded = decode_parameters(&signed.merchant_parameters).unwrap();
        assert_eq!(decoded["DS_MERCHANT_PRODUCTDESCRIPTION"], "Reserva habitación");
    }

    #[test]
    fn test_payment_request_from_json() {
        let req: PaymentRequest = serde_json::from_value(serde_json::json!({
            "order": "PG0002",
            "amount": "2500",
            "notifyUrl": "https://erp.example.com/notify",
            "paygold": true,
        }))
        .unwrap();
        let params = req.to_parameters().unwrap();
        assert_eq!(params["DS_MERCHANT_NOTIFY_URL"], "https://erp.example.com/notify");
        assert_eq!(params["DS_MERCHANT_PAYGOLD"], "true");
    }

    #[test]
    fn test_sign_and_register_stores_record_for_order() {
        let store = InMemoryMerchantStore::new();
        let record = MerchantRecord::new("https://erp.example.com/odata", "vault-key")
            .seal_credentials(AuthType::Basic, "erp-user", "erp-pass")
            .unwrap();
        let signed = PaymentRequest::new("PG0003", "4599")
            .sign_and_register(TEST_KEY, record, &store)
            .unwrap();
        assert!(verify_signature(
            &signed.merchant_parameters,
            &signed.signature,
            "PG0003",
            TEST_KEY
        ));

        let stored = store.resolve("PG0003").unwrap().unwrap();
        assert_eq!(stored.order.as_deref(), Some("PG0003"));
        assert_eq!(stored.terminal_key.as_deref(), Some(TEST_KEY));
        assert_eq!(stored.destination, "https://erp.example.com/odata");
        assert_eq!(stored.reveal_password().unwrap().as_deref(), Some("erp-pass"));
    }

    #[test]
    fn test_sign_and_register_keeps_record_terminal_key() {
        let store = InMemoryMerchantStore::new();
        let other = "AAECAwQFBgcICQoLDA0ODw==";
        let record = MerchantRecord::new("https://erp.example.com", "vault-key").with_terminal_key(other);
        PaymentRequest::new("PG0004", "100")
            .sign_and_register(TEST_KEY, record, &store)
            .unwrap();
        let stored = store.resolve("PG0004").unwrap().unwrap();
        assert_eq!(stored.terminal_key.as_deref(), Some(other));
    }

    #[test]
    fn test_sign_and_register_invalid_request_stores_nothing() {
        let store = InMemoryMerchantStore::new();
        let record = MerchantRecord::new("https://erp.example.com", "vault-key");
        assert!(PaymentRequest::new("", "100")
            .sign_and_register(TEST_KEY, record, &store)
            .is_err());
        assert!(store.is_empty());
    }
}
