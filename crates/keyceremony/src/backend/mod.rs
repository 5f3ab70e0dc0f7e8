//! backend trait and implementations
//!
//! a backend is the request executor that talks to the server. it is
//! responsible for:
//! - carrying status/initiate/submit/cancel calls per ceremony kind
//! - reading and deleting the rekey backup
//! - mapping each response into a `SessionState` or a typed error
//!
//! implementations:
//! - software: in-memory server for testing and local development
//!
//! transports (http, auth headers, retries) live outside this crate and
//! implement the same trait, typically via the `wire` payload types.

#[cfg(feature = "software")]
pub mod software;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::session::{CeremonyKind, SessionState};
use crate::share::{KeyShare, MasterCredentials};
use crate::{Error, Result};

/// largest share count the server can index
pub const MAX_SHARES: u32 = 255;

/// check `1 <= threshold <= shares <= MAX_SHARES`
pub fn validate_threshold(shares: u32, threshold: u32) -> Result<()> {
    if threshold == 0 || threshold > shares || shares > MAX_SHARES {
        return Err(Error::InvalidParameters { shares, threshold });
    }
    Ok(())
}

/// parameters for initializing the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitOptions {
    /// total shares to issue (N)
    pub secret_shares: u32,
    /// shares required to unseal (K)
    pub secret_threshold: u32,
    /// optional pgp keys to encrypt each issued share with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    /// optional pgp key to encrypt the root token with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_token_pgp_key: Option<String>,
}

impl InitOptions {
    pub fn new(secret_shares: u32, secret_threshold: u32) -> Self {
        Self {
            secret_shares,
            secret_threshold,
            pgp_keys: Vec::new(),
            root_token_pgp_key: None,
        }
    }

    pub fn with_pgp_keys(mut self, keys: Vec<String>) -> Self {
        self.pgp_keys = keys;
        self
    }

    pub fn with_root_token_pgp_key(mut self, key: impl Into<String>) -> Self {
        self.root_token_pgp_key = Some(key.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.secret_shares, self.secret_threshold)
    }
}

impl Default for InitOptions {
    fn default() -> Self {
        Self::new(5, 3)
    }
}

/// parameters for a rekey ceremony
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyParams {
    /// shares in the new set (N)
    pub secret_shares: u32,
    /// threshold of the new set (K)
    pub secret_threshold: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    /// keep pgp-encrypted copies of the new shares server-side
    #[serde(default)]
    pub backup: bool,
}

impl RekeyParams {
    pub fn new(secret_shares: u32, secret_threshold: u32) -> Self {
        Self {
            secret_shares,
            secret_threshold,
            pgp_keys: Vec::new(),
            backup: false,
        }
    }

    pub fn with_pgp_keys(mut self, keys: Vec<String>, backup: bool) -> Self {
        self.pgp_keys = keys;
        self.backup = backup;
        self
    }

    /// threshold bounds, one pgp key per new share, backup needs pgp keys
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.secret_shares, self.secret_threshold)?;
        let keys = self.pgp_keys.len();
        if (keys > 0 && keys != self.secret_shares as usize) || (self.backup && keys == 0) {
            return Err(Error::PgpKeyCount {
                keys,
                shares: self.secret_shares,
            });
        }
        Ok(())
    }
}

/// pgp-encrypted copies of a rekeyed share set, kept server-side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyBackup {
    /// nonce of the rekey session that produced the backup
    pub nonce: String,
    /// encrypted shares by pgp key fingerprint
    pub keys: BTreeMap<String, Vec<String>>,
}

/// initiate call for one ceremony kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateRequest {
    /// the server already knows its threshold
    Unseal,
    Rekey(RekeyParams),
    GenerateRoot {
        /// base64 one-time pad
        otp: String,
        pgp_key: Option<String>,
    },
}

impl InitiateRequest {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            InitiateRequest::Unseal => CeremonyKind::Unseal,
            InitiateRequest::Rekey(_) => CeremonyKind::Rekey,
            InitiateRequest::GenerateRoot { .. } => CeremonyKind::GenerateRoot,
        }
    }
}

/// backend trait - the external request executor
///
/// every call is a blocking round-trip; every returned `SessionState` is a
/// snapshot that a concurrent actor may already have invalidated.
pub trait SystemBackend: Send + Sync {
    /// whether initialize has already succeeded
    fn is_initialized(&self) -> Result<bool>;

    /// issue the master share set and root token
    /// fails with `AlreadyInitialized` on a second call
    fn initialize(&self, options: &InitOptions) -> Result<MasterCredentials>;

    /// seal the server
    fn seal(&self) -> Result<()>;

    /// current status of a ceremony kind
    fn status(&self, kind: CeremonyKind) -> Result<SessionState>;

    /// start a session, fails with `AlreadyInProgress` if one exists
    fn initiate(&self, request: &InitiateRequest) -> Result<SessionState>;

    /// submit one share against the session identified by `nonce`
    fn submit(
        &self,
        kind: CeremonyKind,
        share: &KeyShare,
        nonce: &str,
        reset: bool,
    ) -> Result<SessionState>;

    /// clear any session of this kind, no-op if none
    fn cancel(&self, kind: CeremonyKind) -> Result<()>;

    /// backup written by the last rekey run with `backup`, if any
    fn rekey_backup_keys(&self) -> Result<Option<RekeyBackup>>;

    /// drop the stored backup, no-op if none
    fn delete_rekey_backup_keys(&self) -> Result<()>;
}

impl<B: SystemBackend + ?Sized> SystemBackend for std::sync::Arc<B> {
    fn is_initialized(&self) -> Result<bool> {
        (**self).is_initialized()
    }

    fn initialize(&self, options: &InitOptions) -> Result<MasterCredentials> {
        (**self).initialize(options)
    }

    fn seal(&self) -> Result<()> {
        (**self).seal()
    }

    fn status(&self, kind: CeremonyKind) -> Result<SessionState> {
        (**self).status(kind)
    }

    fn initiate(&self, request: &InitiateRequest) -> Result<SessionState> {
        (**self).initiate(request)
    }

    fn submit(
        &self,
        kind: CeremonyKind,
        share: &KeyShare,
        nonce: &str,
        reset: bool,
    ) -> Result<SessionState> {
        (**self).submit(kind, share, nonce, reset)
    }

    fn cancel(&self, kind: CeremonyKind) -> Result<()> {
        (**self).cancel(kind)
    }

    fn rekey_backup_keys(&self) -> Result<Option<RekeyBackup>> {
        (**self).rekey_backup_keys()
    }

    fn delete_rekey_backup_keys(&self) -> Result<()> {
        (**self).delete_rekey_backup_keys()
    }
}
