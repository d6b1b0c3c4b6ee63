use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RedsysError;
use crate::vault;

/// How the merchant's destination endpoint authenticates deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    Basic,
    #[serde(rename = "oAuth")]
    OAuth,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Basic => "Basic",
            AuthType::OAuth => "oAuth",
        }
    }
}

impl FromStr for AuthType {
    type Err = RedsysError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(AuthType::Basic),
            "oauth" => Ok(AuthType::OAuth),
            other => Err(RedsysError::InvalidRequest(format!(
                "unsupported auth type '{other}', expected Basic or oAuth"
            ))),
        }
    }
}

/// Destination credentials. The password is only held vault-encrypted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub auth_type: AuthType,
    pub user: String,
    pub password_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("auth_type", &self.auth_type)
            .field("user", &self.user)
            .field("password_token", &"[REDACTED]")
            .finish()
    }
}

/// Stored configuration for one payment attempt: which keys verify its
/// notifications and where accepted notifications are delivered.
#[derive(Clone, PartialEq)]
pub struct MerchantRecord {
    pub id: String,
    /// `Ds_Order` this record was registered for. Legacy records only carry `id`.
    pub order: Option<String>,
    /// Base64 terminal key. `None` falls back to the verifier's default key.
    pub terminal_key: Option<String>,
    /// Key protecting `credentials.password_token`. Never used for signing.
    pub vault_key: String,
    pub destination: String,
    pub credentials: Option<Credentials>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for MerchantRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantRecord")
            .field("id", &self.id)
            .field("order", &self.order)
            .field("terminal_key", &self.terminal_key.as_ref().map(|_| "[REDACTED]"))
            .field("vault_key", &"[REDACTED]")
            .field("destination", &self.destination)
            .field("credentials", &self.credentials)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl MerchantRecord {
    /// New record with a random id, delivering to `destination`.
    pub fn new(destination: impl Into<String>, vault_key: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order: None,
            terminal_key: None,
            vault_key: vault_key.into(),
            destination: destination.into(),
            credentials: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_terminal_key(mut self, terminal_key: impl Into<String>) -> Self {
        self.terminal_key = Some(terminal_key.into());
        self
    }

    /// Attach credentials, encrypting `password` under the record's vault key.
    pub fn seal_credentials(
        mut self,
        auth_type: AuthType,
        user: impl Into<String>,
        password: &str,
    ) -> Result<Self, RedsysError> {
        let user = user.into();
        if user.is_empty() || password.is_empty() {
            return Err(RedsysError::InvalidRequest(
                "user and password are required".into(),
            ));
        }
        let password_token = vault::protect_secret(password, &self.vault_key)?;
        self.credentials = Some(Credentials {
            auth_type,
            user,
            password_token,
        });
        Ok(self)
    }

    /// Decrypt the stored password for immediate use.
    pub fn reveal_password(&self) -> Result<Option<String>, RedsysError> {
        self.credentials
            .as_ref()
            .map(|c| vault::reveal_secret(&c.password_token, &self.vault_key))
            .transpose()
    }
}

/// Lookup of merchant configuration by order.
///
/// Verification only ever reads through this trait. Implementations must be
/// thread-safe (`Send + Sync`).
pub trait MerchantStore: Send + Sync {
    /// Find the record for `order`: records registered for that order first,
    /// then a record whose id equals `order` (legacy registrations).
    fn resolve(&self, order: &str) -> Result<Option<MerchantRecord>, RedsysError>;

    /// Insert or replace a record by id.
    fn insert(&self, record: MerchantRecord) -> Result<(), RedsysError>;
}

/// In-memory store backed by DashMap. Lost on restart; used by tests and
/// single-process deployments that register and verify in one run.
pub struct InMemoryMerchantStore {
    records: DashMap<String, MerchantRecord>,
}

impl InMemoryMerchantStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryMerchantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MerchantStore for InMemoryMerchantStore {
    fn resolve(&self, order: &str) -> Result<Option<MerchantRecord>, RedsysError> {
        let by_order = self
            .records
            .iter()
            .filter(|entry| entry.order.as_deref() == Some(order))
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone());
        if by_order.is_some() {
            return Ok(by_order);
        }
        Ok(self.records.get(order).map(|entry| entry.value().clone()))
    }

    fn insert(&self, record: MerchantRecord) -> Result<(), RedsysError> {
        self.records.insert(record.id.clone(), record);
        Ok(())
    }
}

#[cfg(feature = "full")]
pub use sqlite::SqliteMerchantStore;

#[cfg(feature = "full")]
mod sqlite {
    use super::*;
    use rusqlite::OptionalExtension;
    use std::sync::{Mutex, MutexGuard};

    const COLUMNS: &str =
        "id, ds_order, terminal_key, vault_key, destination, auth_type, user, password_token, created_at";

    /// Persistent store backed by SQLite. Survives restarts.
    pub struct SqliteMerchantStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteMerchantStore {
        /// Open (or create) the merchant database at `path`.
        ///
        /// On Unix the file is restricted to 0600: it holds vault keys and
        /// encrypted credentials.
        pub fn open(path: &str) -> Result<Self, RedsysError> {
            let conn = rusqlite::Connection::open(path).map_err(store_err)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS merchants (
                    id TEXT PRIMARY KEY,
                    ds_order TEXT,
                    terminal_key TEXT,
                    vault_key TEXT NOT NULL,
                    destination TEXT NOT NULL,
                    auth_type TEXT,
                    user TEXT,
                    password_token TEXT,
                    created_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_merchants_order ON merchants(ds_order);
                PRAGMA journal_mode=WAL;",
            )
            .map_err(store_err)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set merchant database file permissions to 0600"
                    );
                }
            }

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        fn lock(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("merchant store mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }
    }

    fn store_err(e: rusqlite::Error) -> RedsysError {
        RedsysError::Store(e.to_string())
    }

    type Row = (
        String,
        Option<String>,
        Option<String>,
        String,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        i64,
    );

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
            row.get(8)?,
        ))
    }

    fn into_record(row: Row) -> Result<MerchantRecord, RedsysError> {
        let (id, order, terminal_key, vault_key, destination, auth_type, user, token, created) =
            row;
        let credentials = match (auth_type, user, token) {
            (Some(auth_type), Some(user), Some(password_token)) => Some(Credentials {
                auth_type: auth_type
                    .parse()
                    .map_err(|_| RedsysError::Store(format!("record {id} has unknown auth type")))?,
                user,
                password_token,
            }),
            _ => None,
        };
        Ok(MerchantRecord {
            id,
            order,
            terminal_key,
            vault_key,
            destination,
            credentials,
            created_at: DateTime::from_timestamp(created, 0).unwrap_or_default(),
        })
    }

    impl MerchantStore for SqliteMerchantStore {
        fn resolve(&self, order: &str) -> Result<Option<MerchantRecord>, RedsysError> {
            let conn = self.lock();
            let by_order = conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM merchants WHERE ds_order = ?1 \
                         ORDER BY created_at DESC LIMIT 1"
                    ),
                    [order],
                    read_row,
                )
                .optional()
                .map_err(store_err)?;
            let row = match by_order {
                Some(row) => Some(row),
                None => conn
                    .query_row(
                        &format!("SELECT {COLUMNS} FROM merchants WHERE id = ?1"),
                        [order],
                        read_row,
                    )
                    .optional()
                    .map_err(store_err)?,
            };
            row.map(into_record).transpose()
        }

        fn insert(&self, record: MerchantRecord) -> Result<(), RedsysError> {
            let conn = self.lock();
            let (auth_type, user, token) = match &record.credentials {
                Some(c) => (
                    Some(c.auth_type.as_str()),
                    Some(c.user.as_str()),
                    Some(c.password_token.as_str()),
                ),
                None => (None, None, None),
            };
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO merchants ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                rusqlite::params![
                    record.id,
                    record.order,
                    record.terminal_key,
                    record.vault_key,
                    record.destination,
                    auth_type,
                    user,
                    token,
                    record.created_at.timestamp(),
                ],
            )
            .map_err(store_err)?;
            Ok(())
        }
    }
}
