//! error types for key ceremonies

use thiserror::Error;

use crate::session::CeremonyKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === codec errors ===
    #[error("malformed share: {0}")]
    MalformedShare(String),

    #[error("malformed one-time pad: {0}")]
    MalformedPad(String),

    #[error("otp length mismatch: otp is {otp} bytes, encoded token is {encoded} bytes")]
    OtpLengthMismatch { otp: usize, encoded: usize },

    #[error("decoded token is not valid text")]
    MalformedToken,

    // === server-side conflicts ===
    #[error("{0} ceremony already in progress")]
    AlreadyInProgress(CeremonyKind),

    #[error("server already initialized")]
    AlreadyInitialized,

    #[error("server not initialized")]
    NotInitialized,

    #[error("server is not sealed")]
    NotSealed,

    #[error("server is sealed")]
    Sealed,

    // === session errors ===
    #[error("{0} nonce does not match the active session")]
    NonceMismatch(CeremonyKind),

    #[error("no {0} ceremony in progress")]
    NotStarted(CeremonyKind),

    #[error("share already provided in this {0} session")]
    DuplicateShare(CeremonyKind),

    #[error("share is not part of the current key set")]
    UnknownShare,

    #[error("insufficient shares: submitted {provided}, threshold {threshold}")]
    InsufficientShares { provided: usize, threshold: usize },

    #[error("{0} ceremony completed without a result payload")]
    IncompleteResult(CeremonyKind),

    #[error("invalid session state: {0}")]
    InvalidSession(String),

    #[error("invalid threshold parameters: {threshold} of {shares}")]
    InvalidParameters { shares: u32, threshold: u32 },

    #[error("{keys} pgp keys for {shares} shares")]
    PgpKeyCount { keys: usize, shares: u32 },

    // === external executor ===
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

/// a backend round-trip, as far as retrying it is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    IsInitialized,
    Initialize,
    Seal,
    Status,
    Initiate,
    Submit,
    Cancel,
    RekeyBackup,
    DeleteRekeyBackup,
}

impl Call {
    /// repeating the call leaves the server as a single call would
    pub fn is_idempotent(self) -> bool {
        matches!(
            self,
            Call::IsInitialized
                | Call::Status
                | Call::Cancel
                | Call::RekeyBackup
                | Call::DeleteRekeyBackup
        )
    }
}

impl Error {
    /// whether a failed `call` may be reissued as-is
    ///
    /// only transport failures of idempotent calls qualify. a submit that
    /// timed out may have been recorded, so callers re-read status instead
    /// of resubmitting.
    pub fn is_retryable(&self, call: Call) -> bool {
        matches!(self, Error::Transport(_)) && call.is_idempotent()
    }
}
