//! Route handlers and the router that mounts them

use std::{fmt, sync::Arc};

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use http::StatusCode;
use portier::{clock::Clock, SealedRefreshToken, SealedRefreshTokenRef};
use portier_oauth2::{
    AccessToken, AccessTokenRef, AuthFlowController, AuthorizationCode, AuthorizationCodeRef,
    FlowError, Grant, TokenEndpoint, TokenExchangeClient, UserInfo,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::{
    config::CookieSettings,
    gate::{bearer_layer, Authenticated},
    util::{message, Message},
};

/// Name of the cookie carrying the sealed refresh token
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Shared state of the gateway's handlers
pub struct AppState<E = TokenExchangeClient, C = portier::clock::System> {
    flow: Arc<AuthFlowController<E, C>>,
    cookies: Arc<CookieSettings>,
}

impl<E, C> AppState<E, C> {
    /// Bundles the flow controller with the refresh cookie's attributes
    pub fn new(flow: AuthFlowController<E, C>, cookies: CookieSettings) -> Self {
        Self {
            flow: Arc::new(flow),
            cookies: Arc::new(cookies),
        }
    }

    fn refresh_cookie(&self, value: String, max_age_secs: i64) -> Cookie<'static> {
        let mut cookie = Cookie::build((REFRESH_COOKIE, value))
            .http_only(true)
            .secure(self.cookies.secure)
            .same_site(SameSite::Lax)
            .path(self.cookies.path.clone())
            .max_age(time::Duration::seconds(max_age_secs));

        if let Some(domain) = &self.cookies.domain {
            cookie = cookie.domain(domain.clone());
        }

        cookie.build()
    }

    fn grant_cookie(&self, sealed: &SealedRefreshTokenRef) -> Cookie<'static> {
        self.refresh_cookie(sealed.as_str().to_owned(), self.cookies.max_age_secs)
    }

    fn respond(&self, jar: CookieJar, grant: Grant) -> (CookieJar, Json<TokenBody>) {
        let jar = jar.add(self.grant_cookie(&grant.sealed_refresh_token));
        (jar, Json(grant.into()))
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        self.refresh_cookie(String::new(), 0)
    }
}

impl<E, C> Clone for AppState<E, C> {
    fn clone(&self) -> Self {
        Self {
            flow: Arc::clone(&self.flow),
            cookies: Arc::clone(&self.cookies),
        }
    }
}

impl<E, C> fmt::Debug for AppState<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AppState")
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

/// Builds the gateway's router with every route mounted under `base_path`
///
/// `top-secret` and `user-info` sit behind the bearer gate; the rest are
/// open.
pub fn router<E, C>(state: AppState<E, C>, base_path: &str) -> Router
where
    E: TokenEndpoint + 'static,
    C: Clock + Send + Sync + 'static,
{
    let protected = Router::new()
        .route("/top-secret", get(top_secret))
        .route("/user-info", get(user_info::<E, C>))
        .route_layer(bearer_layer(Arc::clone(&state.flow)));

    let routes = Router::new()
        .route("/authorize", get(authorize::<E, C>))
        .route("/refresh", get(refresh::<E, C>))
        .route("/logout", get(logout::<E, C>))
        .route("/wide-open", get(wide_open))
        .merge(protected)
        .with_state(state);

    let base_path = base_path.trim_end_matches('/');
    let app = if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(base_path, routes)
    };

    app.layer(TraceLayer::new_for_http())
}

/// A handler failure, mapped onto the response the browser sees
///
/// Provider detail stays in the logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiError {
    /// The request lacked what the operation needs
    BadRequest,
    /// The identity provider could not be used to complete the operation
    TokenRequest,
    /// The userInfo lookup failed
    UserInfo,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest => message(StatusCode::BAD_REQUEST, "bad request"),
            Self::TokenRequest => {
                message(StatusCode::INTERNAL_SERVER_ERROR, "problem requesting tokens")
            }
            Self::UserInfo => message(
                StatusCode::UNPROCESSABLE_ENTITY,
                "unable to retrieve user info",
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthorizeParams {
    code: Option<AuthorizationCode>,
}

#[derive(Debug, Deserialize)]
struct RefreshParams {
    refresh: Option<SealedRefreshToken>,
}

#[derive(Debug, Serialize)]
struct TokenBody {
    access_token: AccessToken,
}

impl From<Grant> for TokenBody {
    fn from(grant: Grant) -> Self {
        Self {
            access_token: grant.access_token,
        }
    }
}

async fn authorize<E, C>(
    State(state): State<AppState<E, C>>,
    jar: CookieJar,
    Query(params): Query<AuthorizeParams>,
) -> Result<(CookieJar, Json<TokenBody>), ApiError>
where
    E: TokenEndpoint,
    C: Clock + Send + Sync,
{
    let code = params
        .code
        .as_deref()
        .unwrap_or_else(|| AuthorizationCodeRef::from_str(""));

    let grant = state.flow.authorize(code).await.map_err(|error| match error {
        FlowError::MissingCode => ApiError::BadRequest,
        error => {
            tracing::warn!(%error, "authorization code grant failed");
            ApiError::TokenRequest
        }
    })?;

    Ok(state.respond(jar, grant))
}

async fn refresh<E, C>(
    State(state): State<AppState<E, C>>,
    jar: CookieJar,
    Query(params): Query<RefreshParams>,
) -> Result<(CookieJar, Json<TokenBody>), ApiError>
where
    E: TokenEndpoint,
    C: Clock + Send + Sync,
{
    let sealed = params
        .refresh
        .filter(|s| !s.as_str().is_empty())
        .or_else(|| {
            jar.get(REFRESH_COOKIE)
                .map(|c| SealedRefreshToken::from(c.value()))
        })
        .unwrap_or_else(|| SealedRefreshToken::from_static(""));

    let result = state.flow.refresh(&sealed).await;
    let grant = result.map_err(|error| match error {
        FlowError::MissingCookie | FlowError::Decrypt(_) => {
            tracing::debug!(%error, "refresh request rejected");
            ApiError::BadRequest
        }
        FlowError::Exchange(e) if e.is_rejection() => {
            tracing::info!(error = %e, "identity provider rejected refresh token");
            ApiError::BadRequest
        }
        error => {
            tracing::warn!(%error, "refresh token grant failed");
            ApiError::TokenRequest
        }
    })?;

    Ok(state.respond(jar, grant))
}

async fn logout<E, C>(
    State(state): State<AppState<E, C>>,
    jar: CookieJar,
) -> (CookieJar, Json<Message<&'static str>>) {
    (
        jar.add(state.removal_cookie()),
        Json(Message::new("logged out")),
    )
}

async fn wide_open() -> Json<Message<&'static str>> {
    Json(Message::new("this endpoint is open to everyone"))
}

async fn top_secret(auth: Authenticated) -> Json<Message> {
    let name = auth
        .claims
        .username()
        .or_else(|| auth.claims.sub().map(|s| s.as_str()))
        .unwrap_or("stranger");

    Json(Message::new(format!(
        "Hey, {name}! Only verified callers get to read this."
    )))
}

async fn user_info<E, C>(
    State(state): State<AppState<E, C>>,
    auth: Authenticated,
) -> Result<Json<Message<UserInfo>>, ApiError>
where
    E: TokenEndpoint,
    C: Clock + Send + Sync,
{
    let token = AccessTokenRef::from_str(auth.token.as_str());
    match state.flow.user_info(token).await {
        Ok(info) => Ok(Json(Message::new(info))),
        Err(error) => {
            tracing::info!(%error, "userInfo lookup failed");
            Err(ApiError::UserInfo)
        }
    }
}
