/// Signature version advertised on every signed request and notification.
pub const SIGNATURE_VERSION: &str = "HMAC_SHA256_V1";

/// 3DES (EDE3) key length in bytes.
pub const TDES_KEY_LEN: usize = 24;

/// 3DES block length in bytes; orders are zero-padded to a multiple of this.
pub const TDES_BLOCK_LEN: usize = 8;

/// AES-GCM nonce length used by the credential vault.
pub const VAULT_NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length used by the credential vault.
pub const VAULT_TAG_LEN: usize = 16;

/// Smallest well-formed vault token (nonce plus tag, empty ciphertext).
pub const VAULT_MIN_TOKEN_LEN: usize = VAULT_NONCE_LEN + VAULT_TAG_LEN;

/// Default currency (ISO 4217 numeric, EUR).
pub const DEFAULT_CURRENCY: &str = "978";

/// Default transaction type for outbound payment requests (authorisation).
pub const DEFAULT_TRANSACTION_TYPE: &str = "0";

/// RedSys REST endpoint for the test environment.
pub const DEFAULT_REST_URL: &str = "https://sis-t.redsys.es:25443/sis/rest/trataPeticionREST";

/// Default path of the SQLite merchant database.
pub const DEFAULT_MERCHANT_DB_PATH: &str = "./redsys-merchants.db";

/// Notification field carrying the base64 merchant parameters.
pub const FIELD_MERCHANT_PARAMETERS: &str = "Ds_MerchantParameters";

/// Notification field carrying the signature.
pub const FIELD_SIGNATURE: &str = "Ds_Signature";

/// Notification field carrying the signature version.
pub const FIELD_SIGNATURE_VERSION: &str = "Ds_SignatureVersion";
