use base64::Engine;
use std::env;
use url::Url;

use crate::constants::{DEFAULT_CURRENCY, DEFAULT_MERCHANT_DB_PATH, DEFAULT_REST_URL};
use crate::error::RedsysError;
use crate::outbound::PaymentRequest;

/// Process configuration, read from the environment.
#[derive(Clone)]
pub struct RedsysConfig {
    /// Default terminal key for notifications whose record carries none
    pub terminal_key: Option<String>,
    /// Key signing outbound PayGold requests (falls back to `terminal_key`)
    pub paygold_key: Option<String>,
    /// Key sealing destination passwords (falls back to `paygold_key`)
    pub vault_key: Option<String>,
    pub merchant_code: Option<String>,
    pub terminal: Option<String>,
    /// ISO 4217 numeric currency code
    pub currency: String,
    /// RedSys REST endpoint
    pub rest_url: String,
    /// SQLite merchant database path
    pub merchant_db_path: String,
}

impl std::fmt::Debug for RedsysConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedsysConfig")
            .field(
                "terminal_key",
                &self.terminal_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "paygold_key",
                &self.paygold_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("vault_key", &self.vault_key.as_ref().map(|_| "[REDACTED]"))
            .field("merchant_code", &self.merchant_code)
            .field("terminal", &self.terminal)
            .field("currency", &self.currency)
            .field("rest_url", &self.rest_url)
            .field("merchant_db_path", &self.merchant_db_path)
            .finish()
    }
}

impl RedsysConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Optional: default terminal key
        let terminal_key = var("REDSYS_SHA256_KEY");
        if let Some(ref key) = terminal_key {
            validate_key("REDSYS_SHA256_KEY", key)?;
        }

        // Optional: PayGold signing key
        let paygold_key = match var("PAYGOLD_SHA256_KEY") {
            Some(key) => {
                validate_key("PAYGOLD_SHA256_KEY", &key)?;
                Some(key)
            }
            None => terminal_key.clone(),
        };

        // Any text is a usable vault key
        let vault_key = var("REDSYS_VAULT_KEY").or_else(|| paygold_key.clone());

        let merchant_code = var("REDSYS_MERCHANT_CODE");
        let terminal = var("REDSYS_TERMINAL");

        let currency = var("REDSYS_CURRENCY")
            .or_else(|| var("PAYGOLD_CURRENCY"))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        if !currency.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidCurrency(currency));
        }

        let rest_url = var("PAYGOLD_REST_URL")
            .or_else(|| var("REDSYS_REST_URL"))
            .unwrap_or_else(|| DEFAULT_REST_URL.to_string());
        Url::parse(&rest_url).map_err(|_| ConfigError::InvalidUrl(rest_url.clone()))?;

        let merchant_db_path =
            var("MERCHANT_DB_PATH").unwrap_or_else(|| DEFAULT_MERCHANT_DB_PATH.to_string());

        if terminal_key.is_none() {
            tracing::warn!(
                "REDSYS_SHA256_KEY not set: notifications verify only for records carrying their own terminal key"
            );
        }

        Ok(Self {
            terminal_key,
            paygold_key,
            vault_key,
            merchant_code,
            terminal,
            currency,
            rest_url,
            merchant_db_path,
        })
    }

    pub fn require_paygold_key(&self) -> Result<&str, ConfigError> {
        self.paygold_key
            .as_deref()
            .ok_or(ConfigError::MissingRequired("PAYGOLD_SHA256_KEY"))
    }

    pub fn require_vault_key(&self) -> Result<&str, ConfigError> {
        self.vault_key
            .as_deref()
            .ok_or(ConfigError::MissingRequired("REDSYS_VAULT_KEY"))
    }

    /// A PayGold request pre-filled with this merchant's code, terminal and
    /// currency.
    pub fn paygold_request(
        &self,
        order: impl Into<String>,
        amount: impl Into<String>,
    ) -> Result<PaymentRequest, ConfigError> {
        let merchant_code = self
            .merchant_code
            .clone()
            .ok_or(ConfigError::MissingRequired("REDSYS_MERCHANT_CODE"))?;
        let terminal = self
            .terminal
            .clone()
            .ok_or(ConfigError::MissingRequired("REDSYS_TERMINAL"))?;

        let mut request = PaymentRequest::new(order, amount);
        request.merchant_code = Some(merchant_code);
        request.terminal = Some(terminal);
        request.currency = Some(self.currency.clone());
        request.paygold = true;
        Ok(request)
    }
}

fn validate_key(name: &'static str, key: &str) -> Result<(), ConfigError> {
    match base64::engine::general_purpose::STANDARD.decode(key) {
        Ok(raw) if !raw.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidKey(name)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingRequired(&'static str),

    #[error("{0} is not a valid base64 key")]
    InvalidKey(&'static str),

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<ConfigError> for RedsysError {
    fn from(e: ConfigError) -> Self {
        RedsysError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_KEY: &str = "sq7HjrUOBfKmC576ILgskD5srU870gJ7";

    fn config(vars: &[(&str, &str)]) -> Result<RedsysConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RedsysConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert!(cfg.terminal_key.is_none());
        assert!(cfg.paygold_key.is_none());
        assert_eq!(cfg.currency, "978");
        assert_eq!(cfg.rest_url, DEFAULT_REST_URL);
        assert_eq!(cfg.merchant_db_path, "./redsys-merchants.db");
    }

    #[test]
    fn test_paygold_key_falls_back_to_terminal_key() {
        let cfg = config(&[("REDSYS_SHA256_KEY", TEST_KEY)]).unwrap();
        assert_eq!(cfg.paygold_key.as_deref(), Some(TEST_KEY));
        assert_eq!(cfg.require_paygold_key().unwrap(), TEST_KEY);

        let other = "AAECAwQFBgcICQoLDA0ODw==";
        let cfg = config(&[("REDSYS_SHA256_KEY", TEST_KEY), ("PAYGOLD_SHA256_KEY", other)]).unwrap();
        assert_eq!(cfg.paygold_key.as_deref(), Some(other));
        assert_eq!(cfg.terminal_key.as_deref(), Some(TEST_KEY));
    }

    #[test]
    fn test_vault_key_falls_back_to_paygold_key() {
        let cfg = config(&[]).unwrap();
        assert!(matches!(
            cfg.require_vault_key(),
            Err(ConfigError::MissingRequired("REDSYS_VAULT_KEY"))
        ));

        let cfg = config(&[("REDSYS_SHA256_KEY", TEST_KEY)]).unwrap();
        assert_eq!(cfg.require_vault_key().unwrap(), TEST_KEY);

        let cfg = config(&[("REDSYS_SHA256_KEY", TEST_KEY), ("REDSYS_VAULT_KEY", "vault-key")]).unwrap();
        assert_eq!(cfg.vault_key.as_deref(), Some("vault-key"));
        assert!(!format!("{cfg:?}").contains("vault-key"));
    }

    #[test]
    fn test_rejects_invalid_key() {
        let err = config(&[("REDSYS_SHA256_KEY", "not base64!")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey("REDSYS_SHA256_KEY")));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let cfg = config(&[("REDSYS_SHA256_KEY", "  "), ("REDSYS_CURRENCY", "")]).unwrap();
        assert!(cfg.terminal_key.is_none());
        assert_eq!(cfg.currency, "978");
    }

    #[test]
    fn test_currency_and_url_precedence() {
        let cfg = config(&[
            ("PAYGOLD_CURRENCY", "840"),
            ("REDSYS_REST_URL", "https://sis.redsys.es/sis/rest/trataPeticionREST"),
        ])
        .unwrap();
        assert_eq!(cfg.currency, "840");
        assert_eq!(cfg.rest_url, "https://sis.redsys.es/sis/rest/trataPeticionREST");

        let cfg = config(&[("REDSYS_CURRENCY", "978"), ("PAYGOLD_CURRENCY", "840")]).unwrap();
        assert_eq!(cfg.currency, "978");
    }

    #[test]
    fn test_rejects_invalid_url_and_currency() {
        assert!(matches!(
            config(&[("PAYGOLD_REST_URL", "not a url")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            config(&[("REDSYS_CURRENCY", "EUR")]),
            Err(ConfigError::InvalidCurrency(_))
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let cfg = config(&[("REDSYS_SHA256_KEY", TEST_KEY)]).unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains(TEST_KEY));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_paygold_request_requires_merchant() {
        let cfg = config(&[]).unwrap();
        assert!(matches!(
            cfg.paygold_request("PG1", "100"),
            Err(ConfigError::MissingRequired("REDSYS_MERCHANT_CODE"))
        ));

        let cfg = config(&[("REDSYS_MERCHANT_CODE", "263100000"), ("REDSYS_TERMINAL", "49")]).unwrap();
        let params = cfg.paygold_request("PG1", "100").unwrap().to_parameters().unwrap();
        assert_eq!(params["DS_MERCHANT_MERCHANTCODE"], "263100000");
        assert_eq!(params["DS_MERCHANT_TERMINAL"], "49");
        assert_eq!(params["DS_MERCHANT_CURRENCY"], "978");
        assert_eq!(params["DS_MERCHANT_PAYGOLD"], "true");
    }

    #[test]
    fn test_config_error_converts() {
        let err: RedsysError = ConfigError::MissingRequired("PAYGOLD_SHA256_KEY").into();
        assert!(matches!(err, RedsysError::Config(_)));
    }
}
