//! The bearer-token gate placed in front of protected routes

use std::{fmt, future::Future, pin::Pin, sync::Arc};

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use http::{header, Request, StatusCode};
use portier::{clock::Clock, jwt::Claims, Jwt};
use portier_oauth2::{AuthFlowController, TokenEndpoint};
use tower_http::auth::{AsyncAuthorizeRequest, AsyncRequireAuthorizationLayer};

use crate::util::{message, unauthorized};

/// The verified identity of the caller, attached by the gate
#[derive(Clone, Debug)]
pub struct Authenticated {
    /// The verified claims
    pub claims: Claims,
    /// The bearer token the claims were read from
    pub token: Jwt,
}

/// Verifies the `Authorization: Bearer` token of each request
///
/// Requests without a valid token are answered with `401 Unauthorized`
/// and never reach the inner service.
pub struct VerifyBearer<E, C> {
    flow: Arc<AuthFlowController<E, C>>,
}

impl<E, C> Clone for VerifyBearer<E, C> {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            flow: Arc::clone(&self.flow),
        }
    }
}

impl<E, C> fmt::Debug for VerifyBearer<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VerifyBearer").finish_non_exhaustive()
    }
}

impl<E, C> VerifyBearer<E, C> {
    /// Constructs a gate that verifies tokens with `flow`
    pub fn new(flow: Arc<AuthFlowController<E, C>>) -> Self {
        Self { flow }
    }
}

/// A layer that applies [`VerifyBearer`] to every request
pub fn bearer_layer<E, C>(
    flow: Arc<AuthFlowController<E, C>>,
) -> AsyncRequireAuthorizationLayer<VerifyBearer<E, C>> {
    AsyncRequireAuthorizationLayer::new(VerifyBearer::new(flow))
}

type AuthorizeFuture<B> = Pin<Box<dyn Future<Output = Result<Request<B>, Response>> + Send>>;

impl<B, E, C> AsyncAuthorizeRequest<B> for VerifyBearer<E, C>
where
    B: Send + 'static,
    E: TokenEndpoint + 'static,
    C: Clock + Send + Sync + 'static,
{
    type RequestBody = B;
    type ResponseBody = axum::body::Body;
    type Future = AuthorizeFuture<B>;

    fn authorize(&mut self, mut request: Request<B>) -> Self::Future {
        let flow = Arc::clone(&self.flow);

        Box::pin(async move {
            let token = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_jwt)
                .ok_or_else(|| {
                    tracing::debug!("bearer token is missing or malformed");
                    unauthorized("")
                })?;

            match flow.verify(&token).await {
                Ok(claims) => {
                    tracing::trace!(user.sub = ?claims.sub(), "bearer token verified");
                    request
                        .extensions_mut()
                        .insert(Authenticated { claims, token });
                    Ok(request)
                }
                Err(error) => {
                    tracing::debug!(reason = error.reason(), "bearer token rejected");
                    Err(unauthorized(""))
                }
            }
        })
    }
}

fn extract_jwt(auth: &str) -> Option<Jwt> {
    let (scheme, token) = auth.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(Jwt::from(token))
    }
}

/// The route was not placed behind the bearer gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingClaims;

impl IntoResponse for MissingClaims {
    fn into_response(self) -> Response {
        tracing::error!("handler expected verified claims but the bearer gate did not run");
        message(StatusCode::INTERNAL_SERVER_ERROR, "oops")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = MissingClaims;

    async fn from_request_parts(req: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        req.extensions.get::<Self>().cloned().ok_or(MissingClaims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bearer_token_case_insensitively() {
        assert_eq!(
            extract_jwt("Bearer a.b.c").as_deref().map(|t| t.as_str()),
            Some("a.b.c")
        );
        assert_eq!(
            extract_jwt("bearer  a.b.c ").as_deref().map(|t| t.as_str()),
            Some("a.b.c")
        );
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert!(extract_jwt("Basic dXNlcjpwYXNz").is_none());
        assert!(extract_jwt("Bearer ").is_none());
        assert!(extract_jwt("Bearer    ").is_none());
        assert!(extract_jwt("a.b.c").is_none());
    }
}
