//! OAuth2 grant flows for a relying-party gateway
//!
//! The browser completes the provider's hosted login and hands the gateway
//! an authorization code. The gateway redeems the code at the provider's
//! token endpoint, confirms the returned access token verifies, and gives
//! the browser the access token plus the refresh token sealed into an
//! opaque cookie value. Later, the sealed value is traded back for fresh
//! tokens without the gateway keeping any session state of its own.
//!
//! ```
//! use std::sync::Arc;
//!
//! use portier::{CookieCipher, KeySetCache, SigningKeySet, TokenVerifier, ValidationPolicy};
//! use portier_oauth2::{
//!     AuthFlowController, ClientCredentials, ClientId, ClientSecret, ProviderEndpoints,
//!     TokenExchangeClient,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoints = ProviderEndpoints::cognito("us-east-1", "us-east-1_example", "example")?;
//!
//! let exchange = TokenExchangeClient::new(
//!     reqwest::Client::new(),
//!     endpoints.token_url.clone(),
//!     endpoints.user_info_url.clone(),
//!     ClientCredentials {
//!         client_id: ClientId::from_static("client"),
//!         client_secret: ClientSecret::from_static("secret"),
//!         redirect_uri: "https://app.example/callback".to_owned(),
//!     },
//! );
//!
//! let keys = KeySetCache::from_key_set(SigningKeySet::default());
//! let verifier = TokenVerifier::new(keys, ValidationPolicy::new(endpoints.issuer.clone()));
//! let cipher = Arc::new(CookieCipher::new(&[0x42; 32])?);
//!
//! let flow = AuthFlowController::new(exchange, verifier, cipher);
//! # let _ = flow;
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod dto;
pub mod exchange;
mod flow;
mod provider;

pub use braids::*;
#[doc(inline)]
pub use dto::{TokenBundle, UserInfo};
#[doc(inline)]
pub use exchange::{ClientCredentials, ExchangeError, TokenEndpoint, TokenExchangeClient};
#[doc(inline)]
pub use flow::{AuthFlowController, FlowError, Grant};
#[doc(inline)]
pub use provider::ProviderEndpoints;
