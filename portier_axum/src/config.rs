//! Process configuration, read once at startup

use std::{fmt, net::SocketAddr, time::Duration};

use clap::Parser;
use portier_oauth2::{ClientCredentials, ClientId, ClientSecret, ProviderEndpoints};
use reqwest::Url;

/// Gateway between a browser front-end and an OAuth2/OpenID Connect provider
#[derive(Debug, Parser)]
#[command(name = "portier", version, about)]
pub struct GatewayConfig {
    /// Address to listen on
    #[arg(long, env = "PORTIER_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Path prefix all routes are mounted under; also the refresh cookie's path
    #[arg(long, env = "PORTIER_BASE_PATH", default_value = "/api-stuff")]
    pub base_path: String,

    /// AWS region of the Cognito user pool
    #[arg(long, env = "AWS_COGNITO_REGION")]
    pub region: String,

    /// Cognito user pool id
    #[arg(long, env = "AWS_COGNITO_POOL_ID")]
    pub pool_id: String,

    /// Expected `iss` claim; derived from region and pool id when omitted
    #[arg(long, env = "AWS_COGNITO_POOL_ISS")]
    pub issuer: Option<String>,

    /// Prefix of the user pool's hosted UI domain
    #[arg(long, env = "AWS_COGNITO_AUTH_DOMAIN")]
    pub auth_domain: String,

    /// App client id
    #[arg(long, env = "AWS_COGNITO_APP_CLIENT_ID")]
    pub client_id: ClientId,

    /// App client secret
    #[arg(long, env = "AWS_COGNITO_APP_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: ClientSecret,

    /// Redirect URI registered for the app client, sent verbatim
    #[arg(long, env = "AWS_COGNITO_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Key sealing refresh token cookies: 16 bytes for AES-128-GCM, 32 for AES-256-GCM
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: SecretKey,

    /// Override for the JSON Web Key Set URL
    #[arg(long, env = "PORTIER_JWKS_URL")]
    pub jwks_url: Option<Url>,

    /// Override for the OAuth2 token endpoint
    #[arg(long, env = "PORTIER_TOKEN_URL")]
    pub token_url: Option<Url>,

    /// Override for the userInfo endpoint
    #[arg(long, env = "PORTIER_USER_INFO_URL")]
    pub user_info_url: Option<Url>,

    /// Timeout applied to every request to the identity provider
    #[arg(long, env = "PORTIER_HTTP_TIMEOUT_SECS", default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// Minimum time between key set refreshes triggered by unknown key ids
    #[arg(long, env = "PORTIER_JWKS_MIN_REFRESH_SECS", default_value_t = 30)]
    pub jwks_min_refresh_secs: u64,

    /// Refresh the key set in the background at this interval
    #[arg(long, env = "PORTIER_JWKS_REFRESH_INTERVAL_SECS")]
    pub jwks_refresh_interval_secs: Option<u64>,

    /// Domain attribute of the refresh token cookie
    #[arg(long, env = "PORTIER_COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Mark the refresh token cookie `Secure`
    #[arg(long, env = "PORTIER_COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Lifetime of the refresh token cookie
    #[arg(long, env = "PORTIER_COOKIE_MAX_AGE_SECS", default_value_t = 5000)]
    pub cookie_max_age_secs: i64,
}

impl GatewayConfig {
    /// The provider endpoints, with any overrides applied
    ///
    /// # Errors
    ///
    /// Returns an error if the Cognito settings do not form valid URLs.
    pub fn endpoints(&self) -> Result<ProviderEndpoints, url::ParseError> {
        let mut endpoints =
            ProviderEndpoints::cognito(&self.region, &self.pool_id, &self.auth_domain)?;

        if let Some(issuer) = &self.issuer {
            endpoints = endpoints.with_issuer(issuer.clone());
        }
        if let Some(url) = &self.jwks_url {
            endpoints.jwks_url = url.clone();
        }
        if let Some(url) = &self.token_url {
            endpoints.token_url = url.clone();
        }
        if let Some(url) = &self.user_info_url {
            endpoints.user_info_url = url.clone();
        }

        Ok(endpoints)
    }

    /// The app client registration
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
        }
    }

    /// The timeout for requests to the identity provider
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Attributes of the refresh token cookie
    pub fn cookie_settings(&self) -> CookieSettings {
        CookieSettings {
            path: self.base_path.clone(),
            domain: self.cookie_domain.clone(),
            secure: self.cookie_secure,
            max_age_secs: self.cookie_max_age_secs,
        }
    }
}

/// Attributes applied to the refresh token cookie
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieSettings {
    /// `Path`
    pub path: String,
    /// `Domain`, omitted when `None`
    pub domain: Option<String>,
    /// `Secure`
    pub secure: bool,
    /// `Max-Age` in seconds
    pub max_age_secs: i64,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            path: "/api-stuff".to_owned(),
            domain: None,
            secure: false,
            max_age_secs: 5000,
        }
    }
}

/// The raw bytes of the cookie sealing key
#[derive(Clone)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// The key bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<String> for SecretKey {
    fn from(raw: String) -> Self {
        Self(raw.into_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("***SECRET KEY***")
    }
}
