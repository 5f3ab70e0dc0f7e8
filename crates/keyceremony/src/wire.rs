//! json payloads of the server's ceremony endpoints
//!
//! transports implementing `SystemBackend` serialize the request types and
//! map response bodies into `SessionState` / `MasterCredentials` here, so the
//! ceremony code never sees raw json.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::backend::{InitOptions, InitiateRequest, RekeyBackup};
use crate::session::{CeremonyKind, SessionExtra, SessionState};
use crate::share::{KeyShare, MasterCredentials};
use crate::{Error, Result};

// === requests ===

/// body of the initialize call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pgp_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_token_pgp_key: Option<String>,
}

impl From<&InitOptions> for InitRequest {
    fn from(options: &InitOptions) -> Self {
        Self {
            secret_shares: options.secret_shares,
            secret_threshold: options.secret_threshold,
            pgp_keys: options.pgp_keys.clone(),
            root_token_pgp_key: options.root_token_pgp_key.clone(),
        }
    }
}

/// body of an initiate call, shape depends on the ceremony
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum InitiateBody {
    /// unseal has no initiate body
    Empty {},
    Rekey {
        secret_shares: u32,
        secret_threshold: u32,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pgp_keys: Vec<String>,
        backup: bool,
    },
    GenerateRoot {
        otp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pgp_key: Option<String>,
    },
}

impl From<&InitiateRequest> for InitiateBody {
    fn from(request: &InitiateRequest) -> Self {
        match request {
            InitiateRequest::Unseal => InitiateBody::Empty {},
            InitiateRequest::Rekey(params) => InitiateBody::Rekey {
                secret_shares: params.secret_shares,
                secret_threshold: params.secret_threshold,
                pgp_keys: params.pgp_keys.clone(),
                backup: params.backup,
            },
            InitiateRequest::GenerateRoot { otp, pgp_key } => InitiateBody::GenerateRoot {
                otp: otp.clone(),
                pgp_key: pgp_key.clone(),
            },
        }
    }
}

/// body of a share submission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// share, hex encoded
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nonce: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
}

impl SubmitRequest {
    pub fn new(share: &KeyShare, nonce: &str, reset: bool) -> Self {
        Self {
            key: share.to_hex(),
            nonce: nonce.to_string(),
            reset,
        }
    }
}

// === responses ===

/// response of initialize
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitResponse {
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    pub root_token: String,
}

impl TryFrom<InitResponse> for MasterCredentials {
    type Error = Error;

    fn try_from(resp: InitResponse) -> Result<Self> {
        let shares = parse_keys(&resp.keys, &resp.keys_base64)?;
        Ok(MasterCredentials::new(shares, resp.root_token))
    }
}

/// seal status, also the response of an unseal submission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealStatusResponse {
    #[serde(default = "default_true")]
    pub initialized: bool,
    pub sealed: bool,
    /// threshold
    pub t: u32,
    /// total shares
    pub n: u32,
    pub progress: u32,
    #[serde(default)]
    pub nonce: String,
}

impl From<SealStatusResponse> for SessionState {
    fn from(resp: SealStatusResponse) -> Self {
        // servers without unseal nonces only show progress
        let started = resp.sealed && (!resp.nonce.is_empty() || resp.progress > 0);
        SessionState {
            started,
            nonce: if started { resp.nonce } else { String::new() },
            threshold: resp.t,
            provided: if resp.sealed { resp.progress } else { 0 },
            complete: !resp.sealed,
            extra: SessionExtra::Unseal {
                sealed: resp.sealed,
                shares: resp.n,
            },
        }
    }
}

/// rekey status, also the response of rekey initiate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RekeyStatusResponse {
    pub started: bool,
    #[serde(default)]
    pub nonce: String,
    /// new threshold
    pub t: u32,
    /// new share count
    pub n: u32,
    pub progress: u32,
    /// current threshold, shares needed to authorize
    pub required: u32,
    #[serde(default)]
    pub pgp_fingerprints: Option<Vec<String>>,
    #[serde(default)]
    pub backup: bool,
}

impl From<RekeyStatusResponse> for SessionState {
    fn from(resp: RekeyStatusResponse) -> Self {
        SessionState {
            started: resp.started,
            nonce: resp.nonce,
            threshold: resp.required,
            provided: resp.progress,
            complete: false,
            extra: SessionExtra::Rekey {
                new_shares: resp.n,
                new_threshold: resp.t,
                backup: resp.backup,
                pgp_fingerprints: resp.pgp_fingerprints.unwrap_or_default(),
                keys: None,
            },
        }
    }
}

/// response of a rekey share submission
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RekeyUpdateResponse {
    #[serde(default)]
    pub nonce: String,
    pub complete: bool,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub t: u32,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub required: u32,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
    #[serde(default)]
    pub keys_base64: Option<Vec<String>>,
    #[serde(default)]
    pub pgp_fingerprints: Option<Vec<String>>,
    #[serde(default)]
    pub backup: bool,
}

impl TryFrom<RekeyUpdateResponse> for SessionState {
    type Error = Error;

    fn try_from(resp: RekeyUpdateResponse) -> Result<Self> {
        let keys = match (&resp.keys, resp.complete) {
            (Some(hex), true) => Some(parse_keys(hex, resp.keys_base64.as_deref().unwrap_or(&[]))?),
            (None, true) => return Err(Error::IncompleteResult(CeremonyKind::Rekey)),
            (_, false) => None,
        };
        let new_shares = keys.as_ref().map_or(resp.n, |k| k.len() as u32);

        Ok(SessionState {
            started: !resp.complete,
            nonce: if resp.complete { String::new() } else { resp.nonce },
            threshold: resp.required,
            provided: if resp.complete { 0 } else { resp.progress },
            complete: resp.complete,
            extra: SessionExtra::Rekey {
                new_shares,
                new_threshold: resp.t,
                backup: resp.backup,
                pgp_fingerprints: resp.pgp_fingerprints.unwrap_or_default(),
                keys,
            },
        })
    }
}

/// root generation status, also the response of initiate and submit
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateRootStatusResponse {
    pub started: bool,
    #[serde(default)]
    pub nonce: String,
    pub progress: u32,
    pub required: u32,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub encoded_token: String,
    /// older servers
    #[serde(default)]
    pub encoded_root_token: String,
    #[serde(default)]
    pub pgp_fingerprint: String,
}

impl From<GenerateRootStatusResponse> for SessionState {
    fn from(resp: GenerateRootStatusResponse) -> Self {
        let encoded = if resp.encoded_token.is_empty() {
            resp.encoded_root_token
        } else {
            resp.encoded_token
        };
        SessionState {
            started: resp.started,
            nonce: resp.nonce,
            threshold: resp.required,
            provided: resp.progress,
            complete: resp.complete,
            extra: SessionExtra::GenerateRoot {
                encoded_token: non_empty(encoded),
                pgp_fingerprint: non_empty(resp.pgp_fingerprint),
            },
        }
    }
}

/// stored rekey backup
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RekeyBackupResponse {
    pub nonce: String,
    /// encrypted shares by pgp fingerprint
    #[serde(default)]
    pub keys: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub keys_base64: BTreeMap<String, Vec<String>>,
}

impl From<RekeyBackupResponse> for RekeyBackup {
    fn from(resp: RekeyBackupResponse) -> Self {
        RekeyBackup {
            nonce: resp.nonce,
            keys: resp.keys,
        }
    }
}

/// map a status or submit response body of the given ceremony
pub fn parse_session(kind: CeremonyKind, body: &str) -> Result<SessionState> {
    let state: SessionState = match kind {
        CeremonyKind::Unseal => serde_json::from_str::<SealStatusResponse>(body)?.into(),
        CeremonyKind::Rekey => {
            let value: serde_json::Value = serde_json::from_str(body)?;
            if value.get("complete").is_some() {
                SessionState::try_from(serde_json::from_value::<RekeyUpdateResponse>(value)?)?
            } else {
                serde_json::from_value::<RekeyStatusResponse>(value)?.into()
            }
        }
        CeremonyKind::GenerateRoot => {
            serde_json::from_str::<GenerateRootStatusResponse>(body)?.into()
        }
    };
    Ok(state)
}

/// map an initialize response body
pub fn parse_init(body: &str) -> Result<MasterCredentials> {
    MasterCredentials::try_from(serde_json::from_str::<InitResponse>(body)?)
}

/// map a rekey backup body
pub fn parse_rekey_backup(body: &str) -> Result<RekeyBackup> {
    Ok(serde_json::from_str::<RekeyBackupResponse>(body)?.into())
}

/// pair up hex and base64 key lists; base64 may be absent
fn parse_keys(hex: &[String], base64: &[String]) -> Result<Vec<KeyShare>> {
    if base64.is_empty() {
        return hex.iter().map(|h| KeyShare::from_hex(h)).collect();
    }
    if hex.len() != base64.len() {
        return Err(Error::MalformedShare(format!(
            "{} hex keys but {} base64 keys",
            hex.len(),
            base64.len()
        )));
    }
    hex.iter()
        .zip(base64)
        .map(|(h, b)| KeyShare::from_pair(h, b))
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RekeyParams;

    #[test]
    fn test_seal_status_collecting() {
        let body = r#"{"type":"shamir","initialized":true,"sealed":true,"t":3,"n":5,"progress":2,"nonce":"9a1c","version":"0.9.0"}"#;
        let state = parse_session(CeremonyKind::Unseal, body).unwrap();
        assert!(state.is_collecting());
        assert_eq!((state.provided, state.threshold), (2, 3));
        assert_eq!(state.nonce, "9a1c");
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_seal_status_unsealed_is_complete() {
        let body = r#"{"sealed":false,"t":3,"n":5,"progress":0,"nonce":""}"#;
        let state = parse_session(CeremonyKind::Unseal, body).unwrap();
        assert!(state.complete);
        assert!(!state.started);
        assert_eq!(state.extra, SessionExtra::Unseal { sealed: false, shares: 5 });
    }

    #[test]
    fn test_seal_status_without_nonce() {
        let idle = parse_session(
            CeremonyKind::Unseal,
            r#"{"sealed":true,"t":3,"n":5,"progress":0,"nonce":""}"#,
        )
        .unwrap();
        assert!(!idle.started);
        assert!(!idle.complete);
        assert!(idle.validate().is_ok());

        let collecting = parse_session(
            CeremonyKind::Unseal,
            r#"{"sealed":true,"t":3,"n":5,"progress":2}"#,
        )
        .unwrap();
        assert!(collecting.is_collecting());
        assert!(collecting.nonce.is_empty());
        assert_eq!(collecting.provided, 2);
        assert!(collecting.validate().is_ok());
    }

    #[cfg(feature = "software")]
    #[test]
    fn test_unseal_status_agrees_with_software_server() {
        use crate::backend::software::SoftwareServer;
        use crate::backend::SystemBackend;

        let server = SoftwareServer::new();
        let creds = server.initialize(&InitOptions::new(3, 2)).unwrap();
        let state = server.initiate(&InitiateRequest::Unseal).unwrap();
        for share in &creds.shares[..2] {
            server.submit(CeremonyKind::Unseal, share, &state.nonce, false).unwrap();
        }

        let body = r#"{"sealed":false,"t":2,"n":3,"progress":0,"nonce":""}"#;
        let mapped = parse_session(CeremonyKind::Unseal, body).unwrap();
        assert_eq!(mapped, server.status(CeremonyKind::Unseal).unwrap());
    }

    #[test]
    fn test_parse_rekey_backup() {
        let body = r#"{"nonce":"2dbd10f1","keys":{"abcd1234":["c1c0"]},"keys_base64":{"abcd1234":["wcA="]}}"#;
        let backup = parse_rekey_backup(body).unwrap();
        assert_eq!(backup.nonce, "2dbd10f1");
        assert_eq!(backup.keys["abcd1234"], vec!["c1c0".to_string()]);
    }

    #[test]
    fn test_rekey_status_after_cancel() {
        let body = r#"{"started":false,"nonce":"","t":0,"n":0,"progress":0,"required":4,"pgp_fingerprints":null,"backup":false}"#;
        let state = parse_session(CeremonyKind::Rekey, body).unwrap();
        assert!(!state.started);
        assert_eq!(state.threshold, 4);
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_rekey_update_complete_carries_keys() {
        let share = KeyShare::new(vec![0xab; 33]).unwrap();
        let body = format!(
            r#"{{"nonce":"77","complete":true,"keys":["{}","{}"],"keys_base64":["{}","{}"],"pgp_fingerprints":null,"backup":false}}"#,
            share.to_hex(),
            share.to_hex(),
            share.to_base64(),
            share.to_base64()
        );
        let state = parse_session(CeremonyKind::Rekey, &body).unwrap();
        assert!(state.complete);
        let SessionExtra::Rekey { keys: Some(keys), new_shares, .. } = state.extra else {
            panic!("missing keys");
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(new_shares, 2);
        assert_eq!(keys[0], share);
    }

    #[test]
    fn test_rekey_update_mismatched_encodings() {
        let a = KeyShare::new(vec![1; 33]).unwrap();
        let b = KeyShare::new(vec![2; 33]).unwrap();
        let body = format!(
            r#"{{"nonce":"77","complete":true,"keys":["{}"],"keys_base64":["{}"]}}"#,
            a.to_hex(),
            b.to_base64()
        );
        assert!(matches!(
            parse_session(CeremonyKind::Rekey, &body),
            Err(Error::MalformedShare(_))
        ));
    }

    #[test]
    fn test_generate_root_complete_with_legacy_field() {
        let body = r#"{"started":true,"nonce":"n1","progress":3,"required":3,"complete":true,"encoded_root_token":"AAEC","pgp_fingerprint":""}"#;
        let state = parse_session(CeremonyKind::GenerateRoot, body).unwrap();
        assert!(state.complete);
        assert_eq!(
            state.extra,
            SessionExtra::GenerateRoot {
                encoded_token: Some("AAEC".into()),
                pgp_fingerprint: None,
            }
        );
    }

    #[test]
    fn test_parse_init() {
        let share = KeyShare::new(vec![5; 33]).unwrap();
        let body = format!(
            r#"{{"keys":["{}"],"keys_base64":["{}"],"root_token":"s.abc"}}"#,
            share.to_hex(),
            share.to_base64()
        );
        let creds = parse_init(&body).unwrap();
        assert_eq!(creds.root_token, "s.abc");
        assert_eq!(creds.shares, vec![share]);
    }

    #[test]
    fn test_bad_json_is_payload_error() {
        assert!(matches!(
            parse_session(CeremonyKind::GenerateRoot, "{"),
            Err(Error::Payload(_))
        ));
    }

    #[test]
    fn test_request_bodies() {
        let body = InitiateBody::from(&InitiateRequest::Rekey(RekeyParams::new(8, 4)));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["secret_shares"], 8);
        assert_eq!(json["secret_threshold"], 4);
        assert!(json.get("pgp_keys").is_none());

        let unseal = serde_json::to_string(&InitiateBody::from(&InitiateRequest::Unseal)).unwrap();
        assert_eq!(unseal, "{}");

        let share = KeyShare::new(vec![0x0f, 0xf0]).unwrap();
        let submit = serde_json::to_value(SubmitRequest::new(&share, "n1", false)).unwrap();
        assert_eq!(submit["key"], "0ff0");
        assert!(submit.get("reset").is_none());

        let init = serde_json::to_value(InitRequest::from(&InitOptions::new(10, 5))).unwrap();
        assert_eq!(init["secret_shares"], 10);
    }
}
