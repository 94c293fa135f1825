//! Common errors

use std::error::Error as StdError;

use thiserror::Error;

use crate::{clock::UnixTime, jwa, jwk::KeyId};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The reasons a bearer token can be refused
///
/// Every variant collapses to the same "not authorized" answer at the
/// HTTP boundary. The distinction exists for diagnostics only.
#[derive(Debug, Error)]
pub enum TokenInvalid {
    /// The header declares an algorithm other than the single allowed one
    #[error("token algorithm '{found}' is not the approved algorithm '{expected}'")]
    AlgorithmMismatch {
        /// The approved algorithm
        expected: jwa::Algorithm,
        /// The algorithm named by the token or its key
        found: String,
    },

    /// The header names no key, or a key absent from the current key set
    #[error("no trusted key matches the token's key id")]
    UnknownKey {
        /// The key id named in the header, if any
        kid: Option<KeyId>,
    },

    /// The signature does not verify against the resolved key
    #[error("signature mismatch")]
    BadSignature,

    /// The token is at or past its `exp` claim, or has none
    #[error("token expired")]
    Expired {
        /// The `exp` claim, if present
        exp: Option<UnixTime>,
        /// The time the check was made
        now: UnixTime,
    },

    /// The `iss` claim is missing or differs from the configured issuer
    #[error("invalid issuer")]
    WrongIssuer,

    /// The token cannot be parsed into header, claims and signature
    #[error(transparent)]
    MalformedToken(#[from] MalformedToken),
}

impl TokenInvalid {
    /// A short, stable label for the rejection reason
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AlgorithmMismatch { .. } => "algorithm_mismatch",
            Self::UnknownKey { .. } => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::Expired { .. } => "expired",
            Self::WrongIssuer => "wrong_issuer",
            Self::MalformedToken(_) => "malformed_token",
        }
    }
}

/// The section of a compact JWT that failed to parse
#[derive(Debug, Error)]
pub enum MalformedToken {
    /// The token is not three `.`-separated sections
    #[error("malformed JWT")]
    Structure,

    /// The header section is not base64url-encoded JSON
    #[error("malformed JWT header")]
    Header(#[source] BoxError),

    /// The payload section is not base64url-encoded JSON claims
    #[error("malformed JWT payload")]
    Payload(#[source] BoxError),

    /// The signature section is not base64url
    #[error("malformed JWT signature")]
    Signature(#[source] BoxError),
}

pub(crate) fn malformed_header(source: impl Into<BoxError>) -> TokenInvalid {
    MalformedToken::Header(source.into()).into()
}

pub(crate) fn malformed_payload(source: impl Into<BoxError>) -> TokenInvalid {
    MalformedToken::Payload(source.into()).into()
}

pub(crate) fn malformed_signature(source: impl Into<BoxError>) -> TokenInvalid {
    MalformedToken::Signature(source.into()).into()
}

/// A failure to obtain the identity provider's signing keys
#[derive(Debug, Error)]
pub enum KeySetError {
    /// The key set endpoint could not be reached or timed out
    #[error("error requesting key set")]
    Network(#[source] reqwest::Error),

    /// The key set endpoint answered with a non-success status
    #[error("key set endpoint returned status {status}")]
    Status {
        /// The HTTP status code returned
        status: u16,
    },

    /// The response body is not a JSON Web Key Set
    #[error("malformed key set")]
    MalformedKeySet(#[source] BoxError),
}

/// The sealed value could not be opened
///
/// Carries no detail. A wrong key, a truncated value and a forged tag are
/// indistinguishable to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("unable to open sealed value")]
pub struct DecryptError {
    _p: (),
}

pub(crate) const fn decrypt_error() -> DecryptError {
    DecryptError { _p: () }
}

/// The configured cookie key cannot be used with AES-GCM
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("cookie key must be 16 or 32 bytes, got {len}")]
pub struct CipherKeyError {
    len: usize,
}

pub(crate) const fn cipher_key_error(len: usize) -> CipherKeyError {
    CipherKeyError { len }
}

/// A failure to seal a value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("unable to seal value")]
pub struct SealError {
    _p: (),
}

pub(crate) const fn seal_error() -> SealError {
    SealError { _p: () }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_distinct() {
        let reasons = [
            TokenInvalid::AlgorithmMismatch {
                expected: jwa::Algorithm::RS256,
                found: "none".into(),
            }
            .reason(),
            TokenInvalid::UnknownKey { kid: None }.reason(),
            TokenInvalid::BadSignature.reason(),
            TokenInvalid::Expired {
                exp: None,
                now: UnixTime(0),
            }
            .reason(),
            TokenInvalid::WrongIssuer.reason(),
            TokenInvalid::from(MalformedToken::Structure).reason(),
        ];

        let unique: std::collections::HashSet<_> = reasons.iter().collect();
        assert_eq!(unique.len(), reasons.len());
    }

    #[test]
    fn decrypt_error_has_no_detail() {
        assert_eq!(decrypt_error().to_string(), "unable to open sealed value");
    }
}
