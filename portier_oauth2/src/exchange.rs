//! Grant exchanges against the identity provider's token endpoint

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode, Url};
use thiserror::Error;

use crate::{
    dto::{self, TokenBundle, UserInfo},
    AccessTokenRef, AuthorizationCodeRef, ClientId, ClientSecret, RefreshTokenRef,
};

/// An exchange with the identity provider failed
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The provider could not be reached or did not answer in time
    #[error("error sending request to identity provider")]
    Network(#[source] reqwest::Error),

    /// The provider rejected the request with an OAuth2 error
    #[error("identity provider rejected the request: {error}")]
    Provider {
        /// The OAuth2 error code, such as `invalid_grant`
        error: String,
        /// The provider's human-readable explanation
        description: Option<String>,
    },

    /// The provider answered with a failure status and no OAuth2 error
    #[error("identity provider returned status {status}")]
    UnexpectedStatus {
        /// The HTTP status code returned
        status: u16,
    },

    /// The provider answered successfully with a body of the wrong shape
    #[error("malformed response from identity provider")]
    MalformedResponse(#[source] serde_json::Error),
}

impl ExchangeError {
    /// Whether the provider explicitly refused the grant or token
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

/// The identity provider's token and userInfo endpoints
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Redeems an authorization code for tokens
    async fn exchange_code(&self, code: &AuthorizationCodeRef)
        -> Result<TokenBundle, ExchangeError>;

    /// Redeems a refresh token for fresh tokens
    async fn exchange_refresh(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenBundle, ExchangeError>;

    /// Fetches the attributes of the user an access token was issued to
    async fn user_info(&self, access_token: &AccessTokenRef) -> Result<UserInfo, ExchangeError>;
}

/// The gateway's registration with the identity provider
#[derive(Clone, Debug)]
pub struct ClientCredentials {
    /// The app client id
    pub client_id: ClientId,
    /// The app client secret
    pub client_secret: ClientSecret,
    /// The redirect URI registered for the app client
    ///
    /// Sent verbatim; the provider rejects any difference from the
    /// registered value.
    pub redirect_uri: String,
}

/// Performs OAuth2 grants with HTTP Basic client authentication
///
/// No request is retried. Timeouts are those of the supplied
/// [`reqwest::Client`].
#[derive(Clone, Debug)]
pub struct TokenExchangeClient {
    client: Client,
    token_url: Url,
    user_info_url: Url,
    credentials: ClientCredentials,
}

impl TokenExchangeClient {
    /// Constructs a client for the given endpoints
    pub fn new(
        client: Client,
        token_url: Url,
        user_info_url: Url,
        credentials: ClientCredentials,
    ) -> Self {
        Self {
            client,
            token_url,
            user_info_url,
            credentials,
        }
    }

    #[tracing::instrument(
        err,
        skip(self, form),
        fields(
            token_url = %self.token_url,
            credentials.client_id = %self.credentials.client_id,
        ),
    )]
    async fn request_tokens<F: serde::Serialize + Send + Sync>(
        &self,
        grant_type: &'static str,
        form: &F,
    ) -> Result<TokenBundle, ExchangeError> {
        tracing::trace!("requesting tokens from identity provider");

        let resp = self
            .client
            .post(self.token_url.clone())
            .basic_auth(
                self.credentials.client_id.as_str(),
                Some(self.credentials.client_secret.as_str()),
            )
            .header(header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(ExchangeError::Network)?;

        let status = resp.status();
        tracing::debug!(
            response.status = status.as_u16(),
            "received token response from identity provider"
        );

        let body = resp.bytes().await.map_err(ExchangeError::Network)?;
        let bundle: TokenBundle = parse_response(status, &body)?;

        tracing::info!(
            has_id_token = bundle.id_token.is_some(),
            has_refresh_token = bundle.refresh_token.is_some(),
            expires_in = bundle.expires_in,
            "received new tokens"
        );

        Ok(bundle)
    }
}

/// An OAuth2 `error` member takes precedence over the status code
fn parse_response<T: serde::de::DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T, ExchangeError> {
    if let Ok(err) = serde_json::from_slice::<dto::ErrorResponse>(body) {
        tracing::warn!(
            http.status_code = status.as_u16(),
            oauth2.error = %err.error,
            oauth2.error_description = err.error_description.as_deref().unwrap_or_default(),
            "identity provider returned an error"
        );
        return Err(ExchangeError::Provider {
            error: err.error,
            description: err.error_description,
        });
    }

    if !status.is_success() {
        tracing::warn!(
            http.status_code = status.as_u16(),
            "identity provider returned an unexpected status"
        );
        return Err(ExchangeError::UnexpectedStatus {
            status: status.as_u16(),
        });
    }

    serde_json::from_slice(body).map_err(ExchangeError::MalformedResponse)
}

#[async_trait]
impl TokenEndpoint for TokenExchangeClient {
    async fn exchange_code(
        &self,
        code: &AuthorizationCodeRef,
    ) -> Result<TokenBundle, ExchangeError> {
        let form = dto::CodeGrant {
            code,
            client_id: &self.credentials.client_id,
            redirect_uri: &self.credentials.redirect_uri,
        };

        self.request_tokens("authorization_code", &form).await
    }

    async fn exchange_refresh(
        &self,
        refresh_token: &RefreshTokenRef,
    ) -> Result<TokenBundle, ExchangeError> {
        let form = dto::RefreshGrant {
            refresh_token,
            client_id: &self.credentials.client_id,
        };

        self.request_tokens("refresh_token", &form).await
    }

    #[tracing::instrument(err, skip_all, fields(user_info_url = %self.user_info_url))]
    async fn user_info(&self, access_token: &AccessTokenRef) -> Result<UserInfo, ExchangeError> {
        let resp = self
            .client
            .get(self.user_info_url.clone())
            .bearer_auth(access_token.as_str())
            .send()
            .await
            .map_err(ExchangeError::Network)?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(ExchangeError::Network)?;
        parse_response(status, &body)
    }
}
