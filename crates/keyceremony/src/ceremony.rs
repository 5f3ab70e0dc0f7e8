//! per-kind ceremony clients
//!
//! unseal, rekey and root generation share one state machine:
//!
//! ```text
//!   Idle --initiate--> Collecting(nonce, K, 0)
//!   Collecting --submit--> Collecting(p+1)       while p+1 < K
//!   Collecting --submit--> Terminal(result)      at p+1 == K, back to Idle
//!   Collecting --submit(reset)--> Collecting(0)  same nonce
//!   any --cancel--> Idle
//! ```
//!
//! they differ only in initiate parameters and terminal payload, so one
//! generic client is parameterized by a `Ceremony` marker type.

use std::marker::PhantomData;

use tracing::{debug, info, warn};

use crate::backend::{InitiateRequest, RekeyParams, SystemBackend};
use crate::codec::OneTimePad;
use crate::quorum::run_to_completion;
use crate::session::{CeremonyKind, SessionExtra, SessionState};
use crate::share::KeyShare;
use crate::{Error, Result};

/// capability set of one ceremony kind
pub trait Ceremony {
    const KIND: CeremonyKind;

    /// initiate parameters
    type Params;

    /// terminal result
    type Output;

    /// build the initiate call
    fn request(params: &Self::Params) -> Result<InitiateRequest>;

    /// pull the result out of a completing snapshot
    fn extract(state: SessionState) -> Result<Self::Output>;
}

/// unseal the server
#[derive(Debug, Clone, Copy)]
pub struct Unseal;

/// replace the master share set
#[derive(Debug, Clone, Copy)]
pub struct Rekey;

/// generate a new root token
#[derive(Debug, Clone, Copy)]
pub struct GenerateRoot;

/// result of a completed unseal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsealOutcome {
    pub sealed: bool,
}

/// otp-masked root token as returned by the server (base64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedToken(pub String);

impl EncodedToken {
    /// unmask with the pad used at initiate time
    pub fn decode(&self, otp: &OneTimePad) -> Result<String> {
        otp.decode_token(&self.0)
    }
}

/// root generation parameters
#[derive(Debug, Clone)]
pub struct GenerateRootParams {
    pub otp: OneTimePad,
    pub pgp_key: Option<String>,
}

impl GenerateRootParams {
    pub fn new(otp: OneTimePad) -> Self {
        Self { otp, pgp_key: None }
    }

    pub fn with_pgp_key(mut self, key: impl Into<String>) -> Self {
        self.pgp_key = Some(key.into());
        self
    }
}

impl Ceremony for Unseal {
    const KIND: CeremonyKind = CeremonyKind::Unseal;
    type Params = ();
    type Output = UnsealOutcome;

    fn request(_: &()) -> Result<InitiateRequest> {
        Ok(InitiateRequest::Unseal)
    }

    fn extract(state: SessionState) -> Result<UnsealOutcome> {
        match state.extra {
            SessionExtra::Unseal { sealed, .. } => Ok(UnsealOutcome { sealed }),
            _ => Err(Error::IncompleteResult(Self::KIND)),
        }
    }
}

impl Ceremony for Rekey {
    const KIND: CeremonyKind = CeremonyKind::Rekey;
    type Params = RekeyParams;
    type Output = Vec<KeyShare>;

    fn request(params: &RekeyParams) -> Result<InitiateRequest> {
        params.validate()?;
        Ok(InitiateRequest::Rekey(params.clone()))
    }

    fn extract(state: SessionState) -> Result<Vec<KeyShare>> {
        match state.extra {
            SessionExtra::Rekey {
                keys: Some(keys), ..
            } if !keys.is_empty() => Ok(keys),
            _ => Err(Error::IncompleteResult(Self::KIND)),
        }
    }
}

impl Ceremony for GenerateRoot {
    const KIND: CeremonyKind = CeremonyKind::GenerateRoot;
    type Params = GenerateRootParams;
    type Output = EncodedToken;

    fn request(params: &GenerateRootParams) -> Result<InitiateRequest> {
        if params.otp.is_empty() {
            return Err(Error::MalformedPad("empty pad".into()));
        }
        Ok(InitiateRequest::GenerateRoot {
            otp: params.otp.to_base64(),
            pgp_key: params.pgp_key.clone(),
        })
    }

    fn extract(state: SessionState) -> Result<EncodedToken> {
        match state.extra {
            SessionExtra::GenerateRoot {
                encoded_token: Some(token),
                ..
            } if !token.is_empty() => Ok(EncodedToken(token)),
            _ => Err(Error::IncompleteResult(Self::KIND)),
        }
    }
}

/// client for one ceremony kind
///
/// holds no session state of its own: the nonce is passed on every
/// submission and every answer comes from the backend.
pub struct CeremonyClient<'a, B: SystemBackend + ?Sized, C: Ceremony> {
    backend: &'a B,
    _kind: PhantomData<C>,
}

impl<'a, B: SystemBackend + ?Sized, C: Ceremony> CeremonyClient<'a, B, C> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            _kind: PhantomData,
        }
    }

    pub fn kind(&self) -> CeremonyKind {
        C::KIND
    }

    /// current server-side status
    pub fn status(&self) -> Result<SessionState> {
        self.checked(self.backend.status(C::KIND)?)
    }

    /// start a session
    ///
    /// fails with `AlreadyInProgress` if one is active. never cancels the
    /// existing session on the caller's behalf.
    pub fn initiate(&self, params: &C::Params) -> Result<SessionState> {
        let request = C::request(params)?;
        match self.backend.initiate(&request) {
            Ok(state) => {
                info!("{} ceremony initiated, threshold {}", C::KIND, state.threshold);
                self.checked(state)
            }
            Err(e @ Error::AlreadyInProgress(_)) => {
                warn!("{} ceremony already in progress", C::KIND);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// clear any session of this kind, no-op if none
    pub fn cancel(&self) -> Result<()> {
        self.backend.cancel(C::KIND)?;
        info!("{} ceremony cancelled", C::KIND);
        Ok(())
    }

    /// submit one share
    ///
    /// with `reset`, the server zeroes progress under the same nonce and the
    /// share is not counted. an empty nonce is only passed on for unseal,
    /// which some servers run without one.
    pub fn submit_share(&self, share: &KeyShare, nonce: &str, reset: bool) -> Result<SessionState> {
        if nonce.is_empty() && C::KIND != CeremonyKind::Unseal {
            return Err(Error::NotStarted(C::KIND));
        }
        let state = self.backend.submit(C::KIND, share, nonce, reset)?;
        self.checked(state)
    }

    /// submit shares until completion and return the terminal result
    pub fn submit_all(&self, shares: &[KeyShare], nonce: &str) -> Result<C::Output> {
        let state = run_to_completion(shares, |share| self.submit_share(share, nonce, false))?;
        C::extract(state)
    }

    /// initiate, then drive `shares` to completion
    pub fn run(&self, params: &C::Params, shares: &[KeyShare]) -> Result<C::Output> {
        let state = self.initiate(params)?;
        self.submit_all(shares, &state.nonce)
    }

    fn checked(&self, state: SessionState) -> Result<SessionState> {
        if state.kind() != C::KIND {
            return Err(Error::InvalidSession(format!(
                "expected {} status, got {}",
                C::KIND,
                state.kind()
            )));
        }
        state.validate()?;
        debug!(
            "{} status: started={} provided={}/{} complete={}",
            C::KIND,
            state.started,
            state.provided,
            state.threshold,
            state.complete
        );
        Ok(state)
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareServer;
    use crate::backend::InitOptions;
    use crate::share::MasterCredentials;

    fn unsealed() -> (SoftwareServer, MasterCredentials) {
        let server = SoftwareServer::new();
        let creds = server.initialize(&InitOptions::new(5, 3)).unwrap();
        CeremonyClient::<_, Unseal>::new(&server)
            .run(&(), &creds.shares)
            .unwrap();
        (server, creds)
    }

    #[test]
    fn test_generate_root_round_trip() {
        let (server, creds) = unsealed();
        let client = CeremonyClient::<_, GenerateRoot>::new(&server);

        let status = client.status().unwrap();
        assert!(!status.started);

        let otp = OneTimePad::generate();
        let state = client.initiate(&GenerateRootParams::new(otp.clone())).unwrap();
        assert!(state.started);
        assert!(!state.nonce.is_empty());

        let encoded = client.submit_all(&creds.shares, &state.nonce).unwrap();
        let token = encoded.decode(&otp).unwrap();
        assert_eq!(token, server.root_token().unwrap());
    }

    #[test]
    fn test_cancel_then_status_idle() {
        let (server, creds) = unsealed();
        let client = CeremonyClient::<_, GenerateRoot>::new(&server);

        let state = client
            .initiate(&GenerateRootParams::new(OneTimePad::generate()))
            .unwrap();
        let state = client.submit_share(&creds.shares[0], &state.nonce, false).unwrap();
        assert!(state.started);
        assert_eq!(state.provided, 1);

        client.cancel().unwrap();
        assert!(!client.status().unwrap().started);
        client.cancel().unwrap();
    }

    #[test]
    fn test_submit_without_session() {
        let (server, creds) = unsealed();
        let client = CeremonyClient::<_, Rekey>::new(&server);
        let err = client.submit_share(&creds.shares[0], "deadbeef", false);
        assert!(matches!(err, Err(Error::NotStarted(CeremonyKind::Rekey))));
        let err = client.submit_share(&creds.shares[0], "", false);
        assert!(matches!(err, Err(Error::NotStarted(CeremonyKind::Rekey))));
    }

    #[test]
    fn test_invalid_rekey_params_never_reach_server() {
        let (server, _) = unsealed();
        let client = CeremonyClient::<_, Rekey>::new(&server);
        let err = client.initiate(&RekeyParams::new(3, 4));
        assert!(matches!(err, Err(Error::InvalidParameters { shares: 3, threshold: 4 })));
        assert!(!client.status().unwrap().started);
    }

    #[test]
    fn test_extract_without_payload_fails() {
        let state = SessionState {
            started: false,
            nonce: String::new(),
            threshold: 3,
            provided: 0,
            complete: true,
            extra: SessionExtra::GenerateRoot {
                encoded_token: None,
                pgp_fingerprint: None,
            },
        };
        assert!(matches!(
            GenerateRoot::extract(state),
            Err(Error::IncompleteResult(CeremonyKind::GenerateRoot))
        ));
    }

    #[test]
    fn test_empty_pad_never_reaches_server() {
        let (server, _) = unsealed();
        let client = CeremonyClient::<_, GenerateRoot>::new(&server);
        let err = client.initiate(&GenerateRootParams::new(OneTimePad::from_bytes(vec![])));
        assert!(matches!(err, Err(Error::MalformedPad(_))));
        assert!(!client.status().unwrap().started);
    }
}
