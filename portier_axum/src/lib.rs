//! HTTP surface of the `portier` gateway
//!
//! Mounts the authorize, refresh and logout routes that drive the OAuth2
//! grants, plus routes gated by a verified `Authorization: Bearer` token.
//!
//! | Route        | Gate   | Success                                      |
//! |--------------|--------|----------------------------------------------|
//! | `authorize`  | none   | `{"access_token"}` and the refresh cookie    |
//! | `refresh`    | none   | `{"access_token"}` and a new refresh cookie  |
//! | `logout`     | none   | the refresh cookie is cleared                |
//! | `wide-open`  | none   | a fixed message                              |
//! | `top-secret` | bearer | a greeting for the verified user             |
//! | `user-info`  | bearer | the provider's userInfo attributes           |

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

pub mod config;
pub mod gate;
pub mod routes;
pub mod util;

pub use config::{CookieSettings, GatewayConfig};
pub use gate::{bearer_layer, Authenticated, VerifyBearer};
pub use routes::{router, AppState};
