//! software backend - in-memory server for testing
//!
//! models the server side of every ceremony: one session per kind, random
//! nonces, share counting, reset, cancel, and the terminal effects (unseal,
//! share replacement, otp-masked root token, rekey backup). no secret
//! sharing math: a share is accepted iff it belongs to the currently issued
//! set. no pgp either: a pgp key's text stands in for its fingerprint and
//! "encrypted" shares are plain hex.
//! useful for development and testing, NOT a server.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{InitOptions, InitiateRequest, RekeyBackup, RekeyParams, SystemBackend};
use crate::codec::DEFAULT_OTP_LEN;
use crate::crypto::{random_bytes, random_text, random_vec, xor};
use crate::session::{CeremonyKind, SessionExtra, SessionState};
use crate::share::{KeyShare, MasterCredentials};
use crate::{Error, Result};

/// unseal keys are 32 bytes of key material plus a share index
pub const SHARE_LEN: usize = 33;

/// what to do with a share submitted twice in one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateShares {
    /// refuse the second submission
    #[default]
    Reject,
    /// count it again toward the threshold
    Count,
}

/// software server config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// required one-time pad length for root generation
    pub otp_len: usize,
    pub duplicate_shares: DuplicateShares,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            otp_len: DEFAULT_OTP_LEN,
            duplicate_shares: DuplicateShares::default(),
        }
    }
}

/// an active ceremony session
struct Session {
    nonce: String,
    /// shares accepted in the current attempt
    provided: Vec<Vec<u8>>,
    /// shares required, fixed at initiate time
    required: u32,
    request: InitiateRequest,
}

#[derive(Default)]
struct ServerState {
    initialized: bool,
    sealed: bool,
    secret_shares: u32,
    secret_threshold: u32,
    keys: Vec<Vec<u8>>,
    root_token: String,
    sessions: HashMap<CeremonyKind, Session>,
    backup: Option<RekeyBackup>,
}

/// software server for testing
pub struct SoftwareServer {
    config: ServerConfig,
    state: RwLock<ServerState>,
}

impl SoftwareServer {
    /// create an uninitialized server
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ServerState::default()),
        }
    }

    /// set duplicate-share policy
    pub fn with_duplicate_shares(mut self, policy: DuplicateShares) -> Self {
        self.config.duplicate_shares = policy;
        self
    }

    /// current root token (server-side view)
    pub fn root_token(&self) -> Result<String> {
        Ok(self.read()?.root_token.clone())
    }

    /// whether the server is sealed
    pub fn is_sealed(&self) -> Result<bool> {
        Ok(self.read()?.sealed)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ServerState>> {
        self.state.read().map_err(|e| Error::Transport(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ServerState>> {
        self.state.write().map_err(|e| Error::Transport(e.to_string()))
    }

    fn fresh_nonce() -> String {
        hex::encode(random_bytes::<16>())
    }

    fn issue_keys(count: u32) -> Vec<Vec<u8>> {
        (0..count).map(|_| random_vec(SHARE_LEN)).collect()
    }
}

impl Default for SoftwareServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn idle_extra(&self, kind: CeremonyKind) -> SessionExtra {
        match kind {
            CeremonyKind::Unseal => SessionExtra::Unseal {
                sealed: self.sealed,
                shares: self.secret_shares,
            },
            CeremonyKind::Rekey => SessionExtra::Rekey {
                new_shares: 0,
                new_threshold: 0,
                backup: false,
                pgp_fingerprints: Vec::new(),
                keys: None,
            },
            CeremonyKind::GenerateRoot => SessionExtra::GenerateRoot {
                encoded_token: None,
                pgp_fingerprint: None,
            },
        }
    }

    /// snapshot of the current (possibly idle) session
    fn snapshot(&self, kind: CeremonyKind) -> SessionState {
        match self.sessions.get(&kind) {
            None => SessionState {
                started: false,
                nonce: String::new(),
                threshold: self.secret_threshold,
                provided: 0,
                // an unsealed server has nothing left to unseal
                complete: kind == CeremonyKind::Unseal && !self.sealed,
                extra: self.idle_extra(kind),
            },
            Some(session) => {
                let extra = match &session.request {
                    InitiateRequest::Rekey(params) => SessionExtra::Rekey {
                        new_shares: params.secret_shares,
                        new_threshold: params.secret_threshold,
                        backup: params.backup,
                        pgp_fingerprints: params.pgp_keys.clone(),
                        keys: None,
                    },
                    _ => self.idle_extra(kind),
                };
                SessionState {
                    started: true,
                    nonce: session.nonce.clone(),
                    threshold: session.required,
                    provided: session.provided.len() as u32,
                    complete: false,
                    extra,
                }
            }
        }
    }

    /// apply a completed ceremony and build the terminal snapshot
    fn complete(&mut self, session: Session) -> Result<SessionState> {
        let Session {
            nonce,
            required,
            request,
            ..
        } = session;
        let kind = request.kind();
        let extra = match request {
            InitiateRequest::Unseal => {
                self.sealed = false;
                SessionExtra::Unseal {
                    sealed: false,
                    shares: self.secret_shares,
                }
            }
            InitiateRequest::Rekey(RekeyParams {
                secret_shares,
                secret_threshold,
                pgp_keys,
                backup,
            }) => {
                self.keys = SoftwareServer::issue_keys(secret_shares);
                self.secret_shares = secret_shares;
                self.secret_threshold = secret_threshold;

                // progress elsewhere was counted against the replaced set
                if !self.sessions.is_empty() {
                    debug!("rekey cleared {} pending sessions", self.sessions.len());
                    self.sessions.clear();
                }

                if backup {
                    let keys = pgp_keys
                        .iter()
                        .zip(&self.keys)
                        .map(|(fingerprint, key)| (fingerprint.clone(), vec![hex::encode(key)]))
                        .collect();
                    self.backup = Some(RekeyBackup { nonce, keys });
                    info!("rekey backup stored for {} keys", pgp_keys.len());
                }

                let keys = self
                    .keys
                    .iter()
                    .map(|k| KeyShare::new(k.clone()))
                    .collect::<Result<Vec<_>>>()?;
                SessionExtra::Rekey {
                    new_shares: secret_shares,
                    new_threshold: secret_threshold,
                    backup,
                    pgp_fingerprints: pgp_keys,
                    keys: Some(keys),
                }
            }
            InitiateRequest::GenerateRoot { otp, .. } => {
                let otp = STANDARD
                    .decode(&otp)
                    .map_err(|e| Error::Transport(format!("stored otp corrupt: {}", e)))?;
                self.root_token = random_text(otp.len());
                let masked = xor(self.root_token.as_bytes(), &otp)?;
                SessionExtra::GenerateRoot {
                    encoded_token: Some(STANDARD.encode(masked)),
                    pgp_fingerprint: None,
                }
            }
        };

        info!("{} ceremony complete", kind);

        Ok(SessionState {
            started: false,
            nonce: String::new(),
            threshold: required,
            provided: 0,
            complete: true,
            extra,
        })
    }
}

impl SystemBackend for SoftwareServer {
    fn is_initialized(&self) -> Result<bool> {
        Ok(self.read()?.initialized)
    }

    fn initialize(&self, options: &InitOptions) -> Result<MasterCredentials> {
        options.validate()?;
        let mut state = self.write()?;
        if state.initialized {
            return Err(Error::AlreadyInitialized);
        }

        state.keys = Self::issue_keys(options.secret_shares);
        state.secret_shares = options.secret_shares;
        state.secret_threshold = options.secret_threshold;
        state.root_token = random_text(self.config.otp_len);
        state.sealed = true;
        state.initialized = true;

        let shares = state
            .keys
            .iter()
            .map(|k| KeyShare::new(k.clone()))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "initialized with {} shares, threshold {}",
            options.secret_shares, options.secret_threshold
        );
        Ok(MasterCredentials::new(shares, state.root_token.clone()))
    }

    fn seal(&self) -> Result<()> {
        let mut state = self.write()?;
        state.ensure_initialized()?;
        state.sealed = true;
        state.sessions.clear();
        Ok(())
    }

    fn status(&self, kind: CeremonyKind) -> Result<SessionState> {
        let state = self.read()?;
        state.ensure_initialized()?;
        Ok(state.snapshot(kind))
    }

    fn initiate(&self, request: &InitiateRequest) -> Result<SessionState> {
        let kind = request.kind();
        let mut state = self.write()?;
        state.ensure_initialized()?;

        match request {
            InitiateRequest::Unseal if !state.sealed => return Err(Error::NotSealed),
            InitiateRequest::Unseal => {}
            _ if state.sealed => return Err(Error::Sealed),
            InitiateRequest::Rekey(params) => params.validate()?,
            InitiateRequest::GenerateRoot { otp, .. } => {
                let otp = STANDARD
                    .decode(otp)
                    .map_err(|e| Error::MalformedPad(e.to_string()))?;
                if otp.len() != self.config.otp_len {
                    return Err(Error::OtpLengthMismatch {
                        otp: otp.len(),
                        encoded: self.config.otp_len,
                    });
                }
            }
        }

        if state.sessions.contains_key(&kind) {
            return Err(Error::AlreadyInProgress(kind));
        }

        let session = Session {
            nonce: Self::fresh_nonce(),
            provided: Vec::new(),
            required: state.secret_threshold,
            request: request.clone(),
        };
        debug!("{} session started, nonce {}", kind, session.nonce);
        state.sessions.insert(kind, session);

        Ok(state.snapshot(kind))
    }

    fn submit(
        &self,
        kind: CeremonyKind,
        share: &KeyShare,
        nonce: &str,
        reset: bool,
    ) -> Result<SessionState> {
        let mut state = self.write()?;
        state.ensure_initialized()?;

        let known = state.keys.iter().any(|k| k.as_slice() == share.as_bytes());
        let policy = self.config.duplicate_shares;

        let session = state
            .sessions
            .get_mut(&kind)
            .ok_or(Error::NotStarted(kind))?;

        if session.nonce != nonce {
            return Err(Error::NonceMismatch(kind));
        }

        if reset {
            // the share that carried the reset does not count
            session.provided.clear();
            debug!("{} session reset", kind);
            return Ok(state.snapshot(kind));
        }

        if !known {
            return Err(Error::UnknownShare);
        }

        let duplicate = session.provided.iter().any(|p| p.as_slice() == share.as_bytes());
        if duplicate && policy == DuplicateShares::Reject {
            return Err(Error::DuplicateShare(kind));
        }

        session.provided.push(share.as_bytes().to_vec());
        if (session.provided.len() as u32) < session.required {
            return Ok(state.snapshot(kind));
        }

        let session = state
            .sessions
            .remove(&kind)
            .ok_or(Error::NotStarted(kind))?;
        state.complete(session)
    }

    fn cancel(&self, kind: CeremonyKind) -> Result<()> {
        let mut state = self.write()?;
        state.ensure_initialized()?;
        if state.sessions.remove(&kind).is_some() {
            debug!("{} session cancelled", kind);
        }
        Ok(())
    }

    fn rekey_backup_keys(&self) -> Result<Option<RekeyBackup>> {
        let state = self.read()?;
        state.ensure_initialized()?;
        Ok(state.backup.clone())
    }

    fn delete_rekey_backup_keys(&self) -> Result<()> {
        let mut state = self.write()?;
        state.ensure_initialized()?;
        if state.backup.take().is_some() {
            info!("rekey backup deleted");
        }
        Ok(())
    }
}
