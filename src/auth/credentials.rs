//! Durable storage for the operator's bearer credential.
//!
//! At most one credential exists at a time. The token secret is kept in the
//! OS keychain; the operator identity and the validity window are kept in a
//! JSON record in the console's data directory. The two are written and
//! cleared together, so callers only ever observe a credential that is
//! entirely present or entirely absent.
//!
//! Residual risk: on platforms without a locked keychain (notably the
//! keyutils backend on headless Linux) the token is only as protected as
//! the OS user account itself.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::Identity;

/// Keychain service the token is filed under
const SERVICE_NAME: &str = "matchdesk";

/// Keychain account for the gateway token; fixed because the store holds
/// at most one credential
const TOKEN_ACCOUNT: &str = "gateway-token";

/// Record file name in the data directory
const RECORD_FILE: &str = "session.json";

/// The bearer credential proving an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Storage failures surfaced to the session manager.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Credential storage unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to write credential: {0}")]
    WriteFailed(String),
}

/// On-disk record: everything about the session except the token secret.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    identity: Identity,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// File-and-keychain store for the console's single credential.
pub struct CredentialStore {
    data_dir: PathBuf,
    token_entry: Entry,
}

impl CredentialStore {
    /// Open the store rooted at `data_dir`, creating the directory if needed.
    pub fn open(data_dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", data_dir.display(), e)))?;

        let token_entry = Entry::new(SERVICE_NAME, TOKEN_ACCOUNT)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            data_dir,
            token_entry,
        })
    }

    /// Persist the credential and its identity, replacing any prior pair.
    ///
    /// A failed save must not leave a half-written credential behind, so
    /// any error rolls the store back to fully absent before it is
    /// reported.
    pub fn save(&self, credential: &Credential, identity: &Identity) -> Result<(), StoreError> {
        if let Err(e) = self.try_save(credential, identity) {
            if let Err(cleanup) = self.clear() {
                warn!(error = %cleanup, "Failed to roll back partial credential save");
            }
            return Err(e);
        }
        Ok(())
    }

    fn try_save(&self, credential: &Credential, identity: &Identity) -> Result<(), StoreError> {
        self.token_entry
            .set_password(&credential.token)
            .map_err(|e| StoreError::WriteFailed(format!("keychain: {}", e)))?;

        let record = SessionRecord {
            identity: identity.clone(),
            issued_at: credential.issued_at,
            expires_at: credential.expires_at,
        };
        let contents = serde_json::to_string_pretty(&record)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        // Write-then-rename so a crash mid-write cannot corrupt the record
        let path = self.record_path();
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    /// Return the stored credential and identity, or `None` if nothing is
    /// stored, the record is unreadable, or the credential has expired.
    pub fn load(&self) -> Option<(Credential, Identity)> {
        let path = self.record_path();
        if !path.exists() {
            return None;
        }

        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(error = %e, "Failed to read session record");
                return None;
            }
        };

        let record: SessionRecord = match serde_json::from_str(&contents) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to parse session record");
                return None;
            }
        };

        if Utc::now() > record.expires_at {
            debug!("Stored credential has expired");
            return None;
        }

        let token = match self.token_entry.get_password() {
            Ok(token) => token,
            Err(keyring::Error::NoEntry) => {
                debug!("Session record present but keychain entry missing");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read token from keychain");
                return None;
            }
        };

        Some((
            Credential {
                token,
                issued_at: record.issued_at,
                expires_at: record.expires_at,
            },
            record.identity,
        ))
    }

    /// Remove any stored credential. Idempotent; clearing an empty store
    /// succeeds.
    pub fn clear(&self) -> Result<(), StoreError> {
        match self.token_entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => return Err(StoreError::WriteFailed(format!("keychain: {}", e))),
        }

        let path = self.record_path();
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        }

        Ok(())
    }

    fn record_path(&self) -> PathBuf {
        self.data_dir.join(RECORD_FILE)
    }
}

/// Route all keychain entries to keyring's in-memory mock store. Tests may
/// call this repeatedly; the switch happens once per process.
#[cfg(test)]
pub(crate) fn use_mock_keyring() {
    use std::sync::Once;

    static MOCK: Once = Once::new();
    MOCK.call_once(|| {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
    });
}
