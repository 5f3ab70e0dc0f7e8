//! # keyceremony
//!
//! threshold key ceremonies against a secret-management server: unseal,
//! rekey and root token generation.
//!
//! the server splits and reconstructs the master key. this crate only
//! orchestrates share submission and tracks what the server reports.
//!
//! ## session model
//!
//! ```text
//!          initiate                 submit (p+1 < K)
//!   Idle ───────────▶ Collecting ◀──────────────────┐
//!    ▲                 │  │  └────────────────────────┘
//!    │    cancel       │  │ submit (p+1 == K)
//!    ├─────────────────┘  ▼
//!    └────────────── Terminal(result)
//! ```
//!
//! - every session is identified by a server-issued nonce
//! - every response is a snapshot, never cached as truth
//! - at most one session per kind, enforced by the server
//! - `reset` zeroes progress under the same nonce
//!
//! ## usage
//!
//! ```rust,ignore
//! use keyceremony::{Bootstrap, InitOptions, OneTimePad, RekeyParams, SoftwareServer};
//!
//! let boot = Bootstrap::new(SoftwareServer::new());
//!
//! // initialize with 5 shares, 3 to unseal
//! let creds = boot.initialize_and_unseal(&InitOptions::new(5, 3))?;
//!
//! // new root token, masked in transit with a one-time pad
//! let otp = OneTimePad::generate();
//! let token = boot.rotate_root_token(&otp, &creds.shares)?;
//!
//! // fresh share set, same root token
//! let creds = boot.rekey(&RekeyParams::new(8, 4), &creds.with_root_token(token))?;
//! ```

pub mod backend;
pub mod bootstrap;
pub mod ceremony;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod quorum;
pub mod session;
pub mod share;
pub mod wire;

pub use backend::{InitOptions, InitiateRequest, RekeyBackup, RekeyParams, SystemBackend};
pub use bootstrap::Bootstrap;
pub use ceremony::{
    Ceremony, CeremonyClient, EncodedToken, GenerateRoot, GenerateRootParams, Rekey, Unseal,
    UnsealOutcome,
};
pub use codec::{decode_generated_token, decode_share, reencode, Encoding, OneTimePad};
pub use error::{Call, Error, Result};
pub use quorum::run_to_completion;
pub use session::{CeremonyKind, SessionExtra, SessionState};
pub use share::{KeyShare, MasterCredentials};

#[cfg(feature = "software")]
pub use backend::software::{DuplicateShares, ServerConfig, SoftwareServer};
