//! ceremony session snapshots
//!
//! a `SessionState` is whatever the server reported on its last response.
//! it is never cached as truth: another operator can advance, reset or
//! cancel the same session between two calls.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::share::KeyShare;
use crate::{Error, Result};

/// the three share-gated ceremonies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyKind {
    Unseal,
    Rekey,
    GenerateRoot,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CeremonyKind::Unseal => write!(f, "unseal"),
            CeremonyKind::Rekey => write!(f, "rekey"),
            CeremonyKind::GenerateRoot => write!(f, "generate-root"),
        }
    }
}

/// kind-specific part of a session snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExtra {
    Unseal {
        sealed: bool,
        /// total configured shares (N)
        shares: u32,
    },
    Rekey {
        new_shares: u32,
        new_threshold: u32,
        backup: bool,
        pgp_fingerprints: Vec<String>,
        /// the new share set, only on the completing response
        keys: Option<Vec<KeyShare>>,
    },
    GenerateRoot {
        /// base64 otp-masked token, only on the completing response
        encoded_token: Option<String>,
        pgp_fingerprint: Option<String>,
    },
}

impl SessionExtra {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            SessionExtra::Unseal { .. } => CeremonyKind::Unseal,
            SessionExtra::Rekey { .. } => CeremonyKind::Rekey,
            SessionExtra::GenerateRoot { .. } => CeremonyKind::GenerateRoot,
        }
    }
}

/// server-reported status of one ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub started: bool,
    /// empty when no session is active
    pub nonce: String,
    /// shares required to complete (K)
    pub threshold: u32,
    /// shares accepted so far in this attempt
    pub provided: u32,
    pub complete: bool,
    pub extra: SessionExtra,
}

impl SessionState {
    pub fn kind(&self) -> CeremonyKind {
        self.extra.kind()
    }

    /// shares still needed, zero once complete
    pub fn remaining(&self) -> u32 {
        if self.complete {
            0
        } else {
            self.threshold.saturating_sub(self.provided)
        }
    }

    /// collecting shares under a live nonce
    pub fn is_collecting(&self) -> bool {
        self.started && !self.complete
    }

    /// check the snapshot invariants
    ///
    /// - `provided <= threshold` while collecting
    /// - `nonce` non-empty iff `started`, except that an unseal session may
    ///   run without a nonce on servers that never issue one
    pub fn validate(&self) -> Result<()> {
        if self.is_collecting() && self.provided > self.threshold {
            return Err(Error::InvalidSession(format!(
                "{}: provided {} exceeds threshold {}",
                self.kind(),
                self.provided,
                self.threshold
            )));
        }
        let nonce_less = self.nonce.is_empty() && self.kind() == CeremonyKind::Unseal;
        if self.started == self.nonce.is_empty() && !nonce_less {
            return Err(Error::InvalidSession(format!(
                "{}: started={} with nonce {:?}",
                self.kind(),
                self.started,
                self.nonce
            )));
        }
        Ok(())
    }
}
