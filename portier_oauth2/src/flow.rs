//! The authorize, refresh and verify operations exposed to the gateway

use std::sync::Arc;

use portier::{
    clock::{Clock, System},
    error::{DecryptError, SealError, TokenInvalid},
    jwt::Claims,
    CookieCipher, JwtRef, SealedRefreshToken, SealedRefreshTokenRef, TokenVerifier,
};
use thiserror::Error;

use crate::{
    dto::UserInfo,
    exchange::{ExchangeError, TokenEndpoint},
    AccessToken, AccessTokenRef, AuthorizationCodeRef, IdToken, RefreshToken, RefreshTokenRef,
    TokenExchangeClient,
};

/// An authorize or refresh operation did not produce a grant
#[derive(Debug, Error)]
pub enum FlowError {
    /// No authorization code was supplied
    #[error("authorization code is required")]
    MissingCode,

    /// No sealed refresh token was supplied
    #[error("refresh token cookie is required")]
    MissingCookie,

    /// The provider granted tokens without a refresh token
    #[error("identity provider did not issue a refresh token")]
    MissingRefreshToken,

    /// The sealed refresh token could not be opened
    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    /// The refresh token could not be sealed
    #[error(transparent)]
    Seal(#[from] SealError),

    /// The exchange with the provider failed
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The provider issued an access token that does not verify
    #[error("identity provider issued an untrusted access token")]
    UntrustedToken(#[source] TokenInvalid),
}

/// The outcome of a successful authorize or refresh
///
/// The refresh token only ever appears here in sealed form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    /// The access token to hand to the caller
    pub access_token: AccessToken,
    /// The ID token, if one was issued
    pub id_token: Option<IdToken>,
    /// Lifetime of the access token in seconds
    pub expires_in: u64,
    /// The refresh token, sealed for use as a cookie value
    pub sealed_refresh_token: SealedRefreshToken,
}

/// Orchestrates token exchange, verification and sealing
///
/// Holds no per-user state: everything needed to continue a session
/// travels in the sealed refresh token.
#[derive(Debug)]
pub struct AuthFlowController<E = TokenExchangeClient, C = System> {
    exchange: E,
    verifier: TokenVerifier<C>,
    cipher: Arc<CookieCipher>,
}

impl<E, C> AuthFlowController<E, C>
where
    E: TokenEndpoint,
    C: Clock + Send + Sync,
{
    /// Constructs a controller from its collaborators
    pub fn new(exchange: E, verifier: TokenVerifier<C>, cipher: Arc<CookieCipher>) -> Self {
        Self {
            exchange,
            verifier,
            cipher,
        }
    }

    /// Redeems an authorization code
    ///
    /// The access token returned by the provider is verified before it is
    /// handed out. Nothing is sealed unless every step succeeds.
    ///
    /// # Errors
    ///
    /// Fails on an empty code, a failed exchange, an access token that does
    /// not verify, or a grant without a refresh token.
    #[tracing::instrument(skip_all)]
    pub async fn authorize(&self, code: &AuthorizationCodeRef) -> Result<Grant, FlowError> {
        if code.as_str().is_empty() {
            return Err(FlowError::MissingCode);
        }

        let bundle = self.exchange.exchange_code(code).await?;

        let claims = self
            .verifier
            .verify(JwtRef::from_str(bundle.access_token.as_str()))
            .await
            .map_err(FlowError::UntrustedToken)?;

        let refresh_token = bundle.refresh_token.ok_or(FlowError::MissingRefreshToken)?;
        let sealed_refresh_token = self.cipher.seal(refresh_token.as_str())?;

        tracing::info!(
            user.sub = claims.sub().map(|s| s.as_str()).unwrap_or_default(),
            "authorization code redeemed"
        );

        Ok(Grant {
            access_token: bundle.access_token,
            id_token: bundle.id_token,
            expires_in: bundle.expires_in,
            sealed_refresh_token,
        })
    }

    /// Redeems a sealed refresh token
    ///
    /// The result always carries a newly sealed refresh token. When the
    /// provider does not rotate refresh tokens, the existing one is sealed
    /// again under a fresh nonce.
    ///
    /// # Errors
    ///
    /// Fails on empty input, a value that does not open, or a failed exchange.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, sealed: &SealedRefreshTokenRef) -> Result<Grant, FlowError> {
        if sealed.as_str().is_empty() {
            return Err(FlowError::MissingCookie);
        }

        let current = RefreshToken::from(self.cipher.open(sealed)?);
        let bundle = self.exchange.exchange_refresh(&current).await?;

        let next: &RefreshTokenRef = match &bundle.refresh_token {
            Some(rotated) => {
                tracing::debug!("identity provider rotated the refresh token");
                rotated
            }
            None => &current,
        };
        let sealed_refresh_token = self.cipher.seal(next.as_str())?;

        tracing::info!("refresh token redeemed");

        Ok(Grant {
            access_token: bundle.access_token,
            id_token: bundle.id_token,
            expires_in: bundle.expires_in,
            sealed_refresh_token,
        })
    }

    /// Verifies a bearer token
    ///
    /// # Errors
    ///
    /// Returns the reason the token is not trusted.
    pub async fn verify(&self, token: &JwtRef) -> Result<Claims, TokenInvalid> {
        self.verifier.verify(token).await
    }

    /// Fetches the provider's attributes for the holder of `access_token`
    ///
    /// # Errors
    ///
    /// Fails if the provider rejects the token or cannot be reached.
    pub async fn user_info(&self, access_token: &AccessTokenRef) -> Result<UserInfo, ExchangeError> {
        self.exchange.user_info(access_token).await
    }

    /// The verifier used for bearer tokens
    pub fn verifier(&self) -> &TokenVerifier<C> {
        &self.verifier
    }
}
