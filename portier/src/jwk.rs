//! Public signing keys as published in a JSON Web Key Set
//!
//! See [RFC7517](https://tools.ietf.org/html/rfc7517). Only RSA signing keys
//! are representable; other key types are filtered out when the set is read.

use std::{convert::TryFrom, fmt};

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;

use crate::{error::TokenInvalid, jwa};

/// An identifier for a JSON Web Key
#[braid(serde, ref_doc = "A borrowed reference to a [`KeyId`]")]
pub struct KeyId;

/// The JWK could not be used as an RSA verification key
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("key rejected: {0}")]
pub struct KeyRejected(&'static str);

/// RSA public key components
///
/// Both components are held big-endian with leading zero bytes removed.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl PublicKey {
    /// Constructs a public key from the raw modulus and exponent
    ///
    /// # Errors
    ///
    /// Returns an error if the modulus is shorter than 2048 bits or the
    /// exponent is empty.
    pub fn from_components(modulus: &[u8], exponent: &[u8]) -> Result<Self, KeyRejected> {
        let modulus = strip_leading_zeros(modulus);
        let exponent = strip_leading_zeros(exponent);

        if modulus.len() < 256 {
            return Err(KeyRejected("modulus must be at least 2048 bits"));
        }

        if exponent.is_empty() {
            return Err(KeyRejected("exponent must not be zero"));
        }

        Ok(Self {
            modulus: modulus.to_vec(),
            exponent: exponent.to_vec(),
        })
    }

    /// The public modulus
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// The public exponent
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    fn verify(&self, alg: jwa::Algorithm, message: &[u8], signature: &[u8]) -> bool {
        let pk = ring::signature::RsaPublicKeyComponents {
            n: self.modulus.as_slice(),
            e: self.exponent.as_slice(),
        };

        pk.verify(alg.verification_params(), message, signature)
            .is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &(self.modulus.len() * 8))
            .field("exponent", &URL_SAFE_NO_PAD.encode(&self.exponent))
            .finish()
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// An RSA signing key from the identity provider's key set
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JwkDto")]
pub struct Jwk {
    id: KeyId,
    algorithm: Option<String>,
    key: PublicKey,
}

impl Jwk {
    /// Constructs a key from its identifier and public components
    pub fn new(id: KeyId, key: PublicKey) -> Self {
        Self {
            id,
            algorithm: None,
            key,
        }
    }

    /// Restricts the key to the given algorithm, as its `alg` member would
    #[must_use]
    pub fn with_algorithm(mut self, alg: jwa::Algorithm) -> Self {
        self.algorithm = Some(alg.as_str().to_owned());
        self
    }

    /// The key's identifier
    #[must_use]
    pub fn key_id(&self) -> &KeyIdRef {
        &self.id
    }

    /// The algorithm the key is restricted to, if declared
    #[must_use]
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    /// The RSA public key
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Verifies `signature` over `message` using `alg`
    ///
    /// # Errors
    ///
    /// Returns [`TokenInvalid::AlgorithmMismatch`] if the key declares a
    /// different algorithm, and [`TokenInvalid::BadSignature`] if the
    /// signature does not verify.
    pub fn verify(
        &self,
        alg: jwa::Algorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), TokenInvalid> {
        if let Some(declared) = self.algorithm() {
            if declared != alg.as_str() {
                return Err(TokenInvalid::AlgorithmMismatch {
                    expected: alg,
                    found: declared.to_owned(),
                });
            }
        }

        if self.key.verify(alg, message, signature) {
            Ok(())
        } else {
            Err(TokenInvalid::BadSignature)
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct JwkDto {
    kty: String,
    #[serde(default)]
    pub(crate) kid: Option<KeyId>,
    #[serde(default)]
    alg: Option<String>,
    #[serde(rename = "use", default)]
    usage: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

impl TryFrom<JwkDto> for Jwk {
    type Error = KeyRejected;

    fn try_from(dto: JwkDto) -> Result<Self, Self::Error> {
        if dto.kty != "RSA" {
            return Err(KeyRejected("not an RSA key"));
        }

        if dto.usage.as_deref().is_some_and(|u| u != "sig") {
            return Err(KeyRejected("not a signing key"));
        }

        let id = dto.kid.ok_or(KeyRejected("missing key id"))?;

        let decode = |v: Option<String>| {
            v.and_then(|v| URL_SAFE_NO_PAD.decode(v).ok())
                .ok_or(KeyRejected("missing or malformed key component"))
        };

        let modulus = decode(dto.n)?;
        let exponent = decode(dto.e)?;

        Ok(Self {
            id,
            algorithm: dto.alg,
            key: PublicKey::from_components(&modulus, &exponent)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn rejects_short_modulus() {
        let err = PublicKey::from_components(&[0xAB; 128], &[1, 0, 1]).unwrap_err();
        assert_eq!(err, KeyRejected("modulus must be at least 2048 bits"));
    }

    #[test]
    fn strips_leading_zero_from_modulus() -> Result<()> {
        let mut modulus = vec![0_u8];
        modulus.extend_from_slice(&[0xC3; 256]);
        let key = PublicKey::from_components(&modulus, &[0, 1, 0, 1])?;
        assert_eq!(key.modulus().len(), 256);
        assert_eq!(key.exponent(), &[1, 0, 1]);
        Ok(())
    }

    #[test]
    fn rejects_encryption_keys() {
        let json = r#"{"kty":"RSA","kid":"k","use":"enc","n":"AQAB","e":"AQAB"}"#;
        let err = serde_json::from_str::<Jwk>(json).unwrap_err();
        assert!(err.to_string().contains("not a signing key"));
    }

    #[test]
    fn rejects_keys_without_id() {
        let json = r#"{"kty":"RSA","n":"AQAB","e":"AQAB"}"#;
        let err = serde_json::from_str::<Jwk>(json).unwrap_err();
        assert!(err.to_string().contains("missing key id"));
    }

    #[test]
    fn declared_algorithm_must_match() -> Result<()> {
        let key = Jwk::new(
            KeyId::from_static("k"),
            PublicKey::from_components(&[0xC3; 256], &[1, 0, 1])?,
        )
        .with_algorithm(jwa::Algorithm::RS512);

        let err = key.verify(jwa::Algorithm::RS256, b"msg", b"sig").unwrap_err();
        assert!(matches!(err, TokenInvalid::AlgorithmMismatch { .. }));
        Ok(())
    }
}
