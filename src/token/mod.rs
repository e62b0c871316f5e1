//! Compact HMAC-signed token codec.
//!
//! Signs and verifies a three-segment dot-delimited token
//! (`header.payload.signature`, each base64url without padding) carrying a
//! JSON payload, authenticated with HMAC-SHA256 over the first two segments.
//! The codec does not interpret claims; callers embedding `exp`/`iat` must
//! check them separately.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::error::{token_error, Error, TokenErrorKind};

type HmacSha256 = Hmac<Sha256>;

/// Fixed token header: HS256 is the only algorithm this codec speaks.
#[derive(Debug, Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

/// Codec over a shared symmetric secret.
///
/// The resulting token is independently verifiable by any holder of the same
/// secret; no external lookup is involved.
pub struct CompactTokenCodec {
    secret: String,
}

impl CompactTokenCodec {
    /// Create a codec with the given signing secret.
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Sign a JSON payload into a compact token.
    pub fn sign(&self, payload: &serde_json::Value) -> Result<String, Error> {
        let header = Header {
            alg: "HS256",
            typ: "JWT",
        };

        let header_json = serde_json::to_vec(&header).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Token(TokenErrorKind::Malformed),
        })?;
        let payload_json = serde_json::to_vec(payload).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Token(TokenErrorKind::Malformed),
        })?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Verify a compact token and return its payload.
    ///
    /// Fails with `Malformed` unless the token has exactly three decodable
    /// segments, and `InvalidSignature` when the recomputed HMAC does not
    /// match. Signature comparison is constant time.
    pub fn verify(&self, token: &str) -> Result<serde_json::Value, Error> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(token_error(
                TokenErrorKind::Malformed,
                "token does not have exactly three segments",
            ));
        }

        let signature = URL_SAFE_NO_PAD.decode(segments[2]).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Token(TokenErrorKind::Malformed),
        })?;

        let signing_input = format!("{}.{}", segments[0], segments[1]);
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature).map_err(|_| {
            token_error(
                TokenErrorKind::InvalidSignature,
                "token signature does not match",
            )
        })?;

        let payload_json = URL_SAFE_NO_PAD.decode(segments[1]).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Token(TokenErrorKind::Malformed),
        })?;

        serde_json::from_slice(&payload_json).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: crate::error::ErrorKind::Token(TokenErrorKind::Malformed),
        })
    }

    fn mac(&self) -> Result<HmacSha256, Error> {
        HmacSha256::new_from_slice(self.secret.as_bytes()).map_err(|_| {
            token_error(TokenErrorKind::Malformed, "invalid HMAC key")
        })
    }
}
