use std::fmt;

use aliri_braid::braid;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(&self.0, &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// The identifier of the app client registered with the identity provider
#[braid(serde)]
pub struct ClientId;

/// The app client's secret
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

limited_reveal!(ClientSecretRef: "CLIENT SECRET", 0);

/// A single-use authorization code returned by the hosted login page
#[braid(serde, debug = "owned", display = "owned")]
pub struct AuthorizationCode;

limited_reveal!(AuthorizationCodeRef: "AUTHORIZATION CODE", 5);

/// An access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

limited_reveal!(AccessTokenRef: "ACCESS TOKEN", 15);

/// An OpenID Connect ID token
#[braid(serde, debug = "owned", display = "owned")]
pub struct IdToken;

limited_reveal!(IdTokenRef: "ID TOKEN", 15);

/// A refresh token
///
/// Refresh tokens leave the gateway only after being sealed into a
/// [`SealedRefreshToken`](portier::SealedRefreshToken).
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_hidden_by_default() {
        let secret = ClientSecret::from_static("hunter2");
        assert_eq!(format!("{secret:?}"), "***CLIENT SECRET***");
        assert_eq!(format!("{secret}"), "***CLIENT SECRET***");
        assert_eq!(format!("{secret:#?}"), "\"…\"");

        let refresh = RefreshToken::from_static("eyJjdHkiOiJKV1QiLCJlbmMiOiJBMjU2R0NNIn0");
        assert!(!format!("{refresh:?}").contains("eyJ"));
    }

    #[test]
    fn access_token_reveals_prefix_on_request() {
        let token = AccessToken::from_static("eyJraWQiOiJwcmltYXJ5LTIwMjQiLCJhbGciOiJSUzI1NiJ9");
        assert_eq!(format!("{token:#?}"), "\"eyJraWQiOiJwcm…\"");
        assert_eq!(
            format!("{token:#}"),
            "eyJraWQiOiJwcmltYXJ5LTIwMjQiLCJhbGciOiJSUzI1NiJ9"
        );
    }
}
