//! key shares and the credentials produced by initialization
//!
//! a share is held as bytes and presented as either:
//! - hex string
//! - base64 string

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::{decode_share, reencode, Encoding};
use crate::{Error, Result};

/// one fragment of the master key set
///
/// never mutated once created. the bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    bytes: Vec<u8>,
}

impl KeyShare {
    /// create a share from raw bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::MalformedShare("empty share".into()));
        }
        Ok(Self { bytes })
    }

    /// parse share text in the given encoding
    pub fn parse(text: &str, encoding: Encoding) -> Result<Self> {
        Ok(Self {
            bytes: decode_share(text, encoding)?,
        })
    }

    /// decode from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        Self::parse(s, Encoding::Hex)
    }

    /// decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        Self::parse(s, Encoding::Base64)
    }

    /// build a share from both textual forms, which must agree
    pub fn from_pair(hex: &str, base64: &str) -> Result<Self> {
        let a = Self::from_hex(hex)?;
        let b = Self::from_base64(base64)?;
        if a != b {
            return Err(Error::MalformedShare(
                "hex and base64 forms decode to different bytes".into(),
            ));
        }
        Ok(a)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// encode in the given encoding
    pub fn encode(&self, encoding: Encoding) -> String {
        reencode(&self.bytes, encoding)
    }

    /// encode as hex string
    pub fn to_hex(&self) -> String {
        self.encode(Encoding::Hex)
    }

    /// encode as base64
    pub fn to_base64(&self) -> String {
        self.encode(Encoding::Base64)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyShare({} bytes)", self.bytes.len())
    }
}

impl Serialize for KeyShare {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeyShare {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// share set plus root token, as produced by initialize
#[derive(Clone, Serialize, Deserialize)]
pub struct MasterCredentials {
    pub shares: Vec<KeyShare>,
    pub root_token: String,
}

impl MasterCredentials {
    pub fn new(shares: Vec<KeyShare>, root_token: impl Into<String>) -> Self {
        Self {
            shares,
            root_token: root_token.into(),
        }
    }

    /// credentials after a rekey: new shares, same root token
    pub fn with_shares(&self, shares: Vec<KeyShare>) -> Self {
        Self {
            shares,
            root_token: self.root_token.clone(),
        }
    }

    /// credentials after root generation: same shares, new token
    pub fn with_root_token(&self, root_token: impl Into<String>) -> Self {
        Self {
            shares: self.shares.clone(),
            root_token: root_token.into(),
        }
    }

    /// hex forms of every share
    pub fn hex_shares(&self) -> Vec<String> {
        self.shares.iter().map(KeyShare::to_hex).collect()
    }

    /// base64 forms of every share
    pub fn base64_shares(&self) -> Vec<String> {
        self.shares.iter().map(KeyShare::to_base64).collect()
    }
}

impl fmt::Debug for MasterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterCredentials")
            .field("shares", &self.shares.len())
            .field("root_token", &"<redacted>")
            .finish()
    }
}
