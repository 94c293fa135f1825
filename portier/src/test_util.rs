//! Fixed signing keys and token builders for tests
//!
//! The key pairs under `data/rsa` are published in two key sets: `JWKS`
//! holds only the primary key, while `JWKS_ROTATED` adds the key the
//! provider rotates to.

#![allow(clippy::missing_panics_doc)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::{rand::SystemRandom, signature::RsaKeyPair};

use crate::{
    clock::UnixTime,
    jwa,
    jwk::{KeyId, KeyIdRef},
    jwt::{Claims, Headers, Jwt},
};

/// Key set containing only the primary key
pub const JWKS: &str = include_str!("../data/rsa/jwks.json");

/// Key set containing both the primary and the rotated key
pub const JWKS_ROTATED: &str = include_str!("../data/rsa/jwks-rotated.json");

/// Key id of the primary key
pub const PRIMARY_KID: &str = "primary-2024";

/// Key id of the rotated key
pub const ROTATED_KID: &str = "rotated-2025";

/// The issuer tokens are signed as
pub const ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_portier";

const PRIMARY_DER: &[u8] = include_bytes!("../data/rsa/primary.pk8.der");
const ROTATED_DER: &[u8] = include_bytes!("../data/rsa/rotated.pk8.der");

/// Signs tokens with one of the fixture keys
#[derive(Debug)]
pub struct TestSigner {
    key: RsaKeyPair,
    kid: KeyId,
}

impl TestSigner {
    /// The key published in both key sets
    #[must_use]
    pub fn primary() -> Self {
        Self::from_der(PRIMARY_DER, PRIMARY_KID)
    }

    /// The key only published in the rotated key set
    #[must_use]
    pub fn rotated() -> Self {
        Self::from_der(ROTATED_DER, ROTATED_KID)
    }

    fn from_der(der: &[u8], kid: &'static str) -> Self {
        Self {
            key: RsaKeyPair::from_pkcs8(der).expect("fixture key is valid PKCS#8"),
            kid: KeyId::from_static(kid),
        }
    }

    /// The id this key is published under
    #[must_use]
    pub fn kid(&self) -> &KeyIdRef {
        &self.kid
    }

    /// Signs `claims` with RS256 and a header naming this key
    pub fn sign(&self, claims: &Claims) -> Jwt {
        let headers = Headers::new(jwa::Algorithm::RS256.as_str(), Some(self.kid.clone()));
        self.sign_with(&headers, claims)
    }

    /// Signs `claims` under an arbitrary header
    ///
    /// The signature is always computed with RS256, whatever `alg` the
    /// header declares.
    pub fn sign_with(&self, headers: &Headers, claims: &Claims) -> Jwt {
        let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(headers).expect("header encodes"));
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("claims encode"));
        let message = format!("{header}.{payload}");

        let mut signature = vec![0; self.key.public().modulus_len()];
        self.key
            .sign(
                jwa::Algorithm::RS256.signing_params(),
                &SystemRandom::new(),
                message.as_bytes(),
                &mut signature,
            )
            .expect("signing succeeds");

        Jwt::from(format!("{message}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }
}

/// Claims that pass validation against [`ISSUER`] at `now`
#[must_use]
pub fn valid_claims(now: UnixTime) -> Claims {
    Claims::new()
        .with_subject("2f1e0a6c-5b0e-4bb4-9d1e-5a0c1f1d2e3f")
        .with_issuer(ISSUER)
        .with_token_use("access")
        .with_username("alice")
        .with_issued_at(now)
        .with_expiration(now.plus(3600))
}
