//! Bearer token verification against the provider's signing keys

use crate::{
    clock::{Clock, System},
    error::TokenInvalid,
    jwa,
    jwt::{Claims, Issuer, JwtRef},
    KeySetCache,
};

/// The rules a token must satisfy beyond a valid signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
    issuer: Issuer,
    algorithm: jwa::Algorithm,
}

impl ValidationPolicy {
    /// Requires tokens to be issued by `issuer` and signed with RS256
    pub fn new(issuer: impl Into<Issuer>) -> Self {
        Self {
            issuer: issuer.into(),
            algorithm: jwa::Algorithm::default(),
        }
    }

    /// Replaces the single approved signing algorithm
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: jwa::Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The issuer tokens must name exactly
    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    /// The approved signing algorithm
    #[must_use]
    pub fn algorithm(&self) -> jwa::Algorithm {
        self.algorithm
    }
}

/// Verifies bearer tokens issued by the identity provider
///
/// A token is accepted only when its header declares the approved
/// algorithm, its signature verifies against a key from the cache, its
/// `exp` lies strictly in the future and its `iss` equals the configured
/// issuer byte for byte.
#[derive(Clone, Debug)]
pub struct TokenVerifier<C = System> {
    keys: KeySetCache,
    policy: ValidationPolicy,
    clock: C,
}

impl TokenVerifier {
    /// Constructs a verifier that reads the system clock
    pub fn new(keys: KeySetCache, policy: ValidationPolicy) -> Self {
        Self {
            keys,
            policy,
            clock: System,
        }
    }
}

impl<C: Clock> TokenVerifier<C> {
    /// Replaces the clock used for expiry checks
    pub fn with_clock<D: Clock>(self, clock: D) -> TokenVerifier<D> {
        TokenVerifier {
            keys: self.keys,
            policy: self.policy,
            clock,
        }
    }

    /// The key cache consulted for signing keys
    pub fn keys(&self) -> &KeySetCache {
        &self.keys
    }

    /// The policy tokens are checked against
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Verifies `token` and returns its claims unchanged
    ///
    /// If the header names a key the cache does not hold, the cache is asked
    /// to refresh once and the lookup is retried.
    ///
    /// # Errors
    ///
    /// Returns the first check the token fails.
    pub async fn verify(&self, token: &JwtRef) -> Result<Claims, TokenInvalid> {
        let result = self.verify_inner(token).await;
        if let Err(error) = &result {
            tracing::debug!(reason = error.reason(), %error, "token rejected");
        }
        result
    }

    async fn verify_inner(&self, token: &JwtRef) -> Result<Claims, TokenInvalid> {
        let decomposed = token.decompose()?;
        let header = decomposed.untrusted_header();

        let expected = self.policy.algorithm;
        if header.alg() != expected.as_str() {
            return Err(TokenInvalid::AlgorithmMismatch {
                expected,
                found: header.alg().to_owned(),
            });
        }

        let kid = header
            .kid()
            .ok_or(TokenInvalid::UnknownKey { kid: None })?;

        let key = match self.keys.lookup(kid) {
            Some(key) => key,
            None => {
                if let Err(error) = self.keys.refresh_on_miss(kid).await {
                    let error: &dyn std::error::Error = &error;
                    tracing::warn!(error, %kid, "unable to refresh key set for unknown key id");
                }

                self.keys
                    .lookup(kid)
                    .ok_or_else(|| TokenInvalid::UnknownKey {
                        kid: Some(kid.to_owned()),
                    })?
            }
        };

        let signature = decomposed.signature()?;
        key.verify(expected, decomposed.message().as_bytes(), &signature)?;

        let claims = decomposed.untrusted_claims()?;

        let now = self.clock.now();
        match claims.exp() {
            Some(exp) if now < exp => {}
            exp => return Err(TokenInvalid::Expired { exp, now }),
        }

        if claims.iss() != Some(&*self.policy.issuer) {
            return Err(TokenInvalid::WrongIssuer);
        }

        Ok(claims)
    }
}
