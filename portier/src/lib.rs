//! Token trust for a gateway acting as an OAuth2/OpenID Connect relying party
//!
//! The identity provider issues RS256-signed JSON Web Tokens and publishes
//! its public keys as a JSON Web Key Set ([RFC7517][]). This crate holds
//! those keys, verifies bearer tokens ([RFC7519][]) against them, and seals
//! refresh tokens so they can be handed to the browser as an opaque cookie.
//!
//! * [`KeySetCache`] holds the current [`SigningKeySet`] and refreshes it
//!   when a token names a key it has not seen.
//! * [`TokenVerifier`] checks algorithm, signature, expiry and issuer.
//! * [`CookieCipher`] seals and opens refresh tokens with AES-GCM.
//!
//! [RFC7517]: https://tools.ietf.org/html/rfc7517
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```no_run
//! use portier::{jwt::JwtRef, KeySetCache, KeySetOptions, TokenVerifier, ValidationPolicy};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeySetCache::fetch(
//!     "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example/.well-known/jwks.json",
//!     reqwest::Client::new(),
//!     KeySetOptions::default(),
//! )
//! .await?;
//!
//! let verifier = TokenVerifier::new(
//!     keys,
//!     ValidationPolicy::new("https://cognito-idp.us-east-1.amazonaws.com/us-east-1_example"),
//! );
//!
//! let claims = verifier.verify(JwtRef::from_str("eyJhbGciOi...")).await?;
//! println!("hello, {:?}", claims.username());
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
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod cipher;
pub mod clock;
pub mod error;
pub mod jwa;
pub mod jwk;
mod jwks;
pub mod jwt;
mod keys;
mod verify;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

#[doc(inline)]
pub use cipher::{CookieCipher, SealedRefreshToken, SealedRefreshTokenRef};
#[doc(inline)]
pub use jwk::Jwk;
#[doc(inline)]
pub use jwks::SigningKeySet;
#[doc(inline)]
pub use jwt::{Jwt, JwtRef};
#[doc(inline)]
pub use keys::{KeySetCache, KeySetOptions};
#[doc(inline)]
pub use verify::{TokenVerifier, ValidationPolicy};
