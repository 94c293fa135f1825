//! Where the identity provider publishes its keys and endpoints

use reqwest::Url;

/// The URLs and issuer of an identity provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEndpoints {
    /// The JSON Web Key Set document
    pub jwks_url: Url,
    /// The OAuth2 token endpoint
    pub token_url: Url,
    /// The OpenID Connect userInfo endpoint
    pub user_info_url: Url,
    /// The value tokens carry in their `iss` claim
    pub issuer: String,
}

impl ProviderEndpoints {
    /// The endpoints of an Amazon Cognito user pool
    ///
    /// `auth_domain` is the prefix of the pool's hosted UI domain, as in
    /// `https://{auth_domain}.auth.{region}.amazoncognito.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs do not form valid URLs.
    pub fn cognito(region: &str, pool_id: &str, auth_domain: &str) -> Result<Self, url::ParseError> {
        let issuer = format!("https://cognito-idp.{region}.amazonaws.com/{pool_id}");
        let hosted = format!("https://{auth_domain}.auth.{region}.amazoncognito.com");

        Ok(Self {
            jwks_url: Url::parse(&format!("{issuer}/.well-known/jwks.json"))?,
            token_url: Url::parse(&format!("{hosted}/oauth2/token"))?,
            user_info_url: Url::parse(&format!("{hosted}/oauth2/userInfo"))?,
            issuer,
        })
    }

    /// Replaces the expected issuer
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}
