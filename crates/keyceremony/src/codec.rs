//! share and token encodings
//!
//! shares travel in two textual forms:
//! - hex string (the server's `keys`)
//! - base64 string (the server's `keys_base64`)
//!
//! a generated root token travels masked with a caller-chosen one-time pad.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{random_vec, xor};
use crate::{Error, Result};

/// default one-time pad length in bytes
pub const DEFAULT_OTP_LEN: usize = 16;

/// textual encoding of a share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Hex,
    Base64,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Hex => write!(f, "hex"),
            Encoding::Base64 => write!(f, "base64"),
        }
    }
}

/// decode share text in the stated encoding
pub fn decode_share(text: &str, encoding: Encoding) -> Result<Vec<u8>> {
    let text = text.trim();
    let bytes = match encoding {
        Encoding::Hex => hex::decode(text)
            .map_err(|e| Error::MalformedShare(format!("invalid {}: {}", encoding, e)))?,
        Encoding::Base64 => STANDARD
            .decode(text)
            .map_err(|e| Error::MalformedShare(format!("invalid {}: {}", encoding, e)))?,
    };

    if bytes.is_empty() {
        return Err(Error::MalformedShare("empty share".into()));
    }
    Ok(bytes)
}

/// encode share bytes in the target encoding
pub fn reencode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Hex => hex::encode(bytes),
        Encoding::Base64 => STANDARD.encode(bytes),
    }
}

/// recover a generated token from its otp-masked bytes
pub fn decode_generated_token(otp: &[u8], encoded: &[u8]) -> Result<String> {
    if otp.len() != encoded.len() {
        return Err(Error::OtpLengthMismatch {
            otp: otp.len(),
            encoded: encoded.len(),
        });
    }
    let plain = xor(encoded, otp)?;
    String::from_utf8(plain).map_err(|_| Error::MalformedToken)
}

/// one-time pad masking a freshly generated root token in transit
///
/// only ever sent to the generate-root initiate call, and used locally to
/// decode the result.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OneTimePad {
    bytes: Vec<u8>,
}

impl OneTimePad {
    /// random pad of the default length
    pub fn generate() -> Self {
        Self::with_len(DEFAULT_OTP_LEN)
    }

    /// random pad of a given length
    pub fn with_len(len: usize) -> Self {
        Self {
            bytes: random_vec(len),
        }
    }

    /// pad from caller-supplied bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// parse a base64 pad
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| Error::MalformedPad(e.to_string()))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// base64 form sent to the server
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// decode the server's base64 `encoded_token` against this pad
    pub fn decode_token(&self, encoded_base64: &str) -> Result<String> {
        let encoded = STANDARD
            .decode(encoded_base64.trim())
            .map_err(|_| Error::MalformedToken)?;
        decode_generated_token(&self.bytes, &encoded)
    }
}

impl fmt::Debug for OneTimePad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OneTimePad({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_share_hex_and_base64_agree() {
        let hex_bytes = decode_share("00ff10", Encoding::Hex).unwrap();
        let b64_bytes = decode_share("AP8Q", Encoding::Base64).unwrap();
        assert_eq!(hex_bytes, vec![0x00, 0xff, 0x10]);
        assert_eq!(hex_bytes, b64_bytes);
    }

    #[test]
    fn test_decode_share_rejects_bad_text() {
        assert!(matches!(
            decode_share("not hex", Encoding::Hex),
            Err(Error::MalformedShare(_))
        ));
        assert!(matches!(
            decode_share("@@@", Encoding::Base64),
            Err(Error::MalformedShare(_))
        ));
        assert!(matches!(
            decode_share("", Encoding::Hex),
            Err(Error::MalformedShare(_))
        ));
    }

    #[test]
    fn test_decode_share_trims_whitespace() {
        let bytes = decode_share("  abcd\n", Encoding::Hex).unwrap();
        assert_eq!(bytes, vec![0xab, 0xcd]);
    }

    #[test]
    fn test_otp_length_mismatch_is_hard_failure() {
        let err = decode_generated_token(&[0u8; 16], &[0u8; 15]).unwrap_err();
        assert!(matches!(err, Error::OtpLengthMismatch { otp: 16, encoded: 15 }));
    }

    #[test]
    fn test_non_utf8_token_rejected() {
        let otp = [0u8; 2];
        let encoded = [0xff, 0xfe];
        assert!(matches!(
            decode_generated_token(&otp, &encoded),
            Err(Error::MalformedToken)
        ));
    }

    #[test]
    fn test_pad_decodes_base64_token() {
        let otp = OneTimePad::from_bytes((0u8..16).collect());
        let token = b"s.Q7mW2xkP9aLr0v";
        let masked = xor(token, otp.as_bytes()).unwrap();
        let decoded = otp.decode_token(&STANDARD.encode(masked)).unwrap();
        assert_eq!(decoded.as_bytes(), token);
    }

    #[test]
    fn test_bad_pad_text_is_pad_error() {
        assert!(matches!(
            OneTimePad::from_base64("not*base64"),
            Err(Error::MalformedPad(_))
        ));
        let otp = OneTimePad::from_base64(" AAECAw== ").unwrap();
        assert_eq!(otp.as_bytes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_pad_debug_hides_bytes() {
        let otp = OneTimePad::from_bytes(vec![7u8; 16]);
        assert_eq!(format!("{:?}", otp), "OneTimePad(16 bytes)");
    }

    proptest! {
        #[test]
        fn prop_reencode_roundtrips_across_encodings(bytes in proptest::collection::vec(any::<u8>(), 1..64)) {
            for from in [Encoding::Hex, Encoding::Base64] {
                for to in [Encoding::Hex, Encoding::Base64] {
                    let decoded = decode_share(&reencode(&bytes, from), from).unwrap();
                    let back = decode_share(&reencode(&decoded, to), to).unwrap();
                    prop_assert_eq!(&back, &bytes);
                }
            }
        }

        #[test]
        fn prop_otp_unmasks_token(token in "[a-zA-Z0-9.]{1,48}", seed in any::<u64>()) {
            use rand::{RngCore, SeedableRng};
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut otp = vec![0u8; token.len()];
            rng.fill_bytes(&mut otp);

            let masked = xor(&otp, token.as_bytes()).unwrap();
            prop_assert_eq!(decode_generated_token(&otp, &masked).unwrap(), token);
        }

        #[test]
        fn prop_unequal_lengths_always_fail(otp_len in 0usize..40, enc_len in 0usize..40) {
            prop_assume!(otp_len != enc_len);
            let result = decode_generated_token(&vec![1u8; otp_len], &vec![2u8; enc_len]);
            let is_mismatch = matches!(result, Err(Error::OtpLengthMismatch { .. }));
            prop_assert!(is_mismatch);
        }
    }
}
