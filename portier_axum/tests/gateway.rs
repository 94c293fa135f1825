use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    Router,
};
use color_eyre::Result;
use http::{header, Request, StatusCode};
use portier::{
    clock::{TestClock, UnixTime},
    test_util::{valid_claims, TestSigner, ISSUER, JWKS},
    CookieCipher, KeySetCache, SealedRefreshTokenRef, SigningKeySet, TokenVerifier,
    ValidationPolicy,
};
use portier_axum::{router, AppState, CookieSettings};
use portier_oauth2::{
    AuthFlowController, ClientCredentials, ClientId, ClientSecret, TokenExchangeClient,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::{
    matchers::{bearer_token, body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

const NOW: UnixTime = UnixTime(1_700_000_000);
const COOKIE_KEY: &[u8; 16] = b"sixteen-byte-key";

struct Gateway {
    idp: MockServer,
    cipher: Arc<CookieCipher>,
    app: Router,
}

async fn gateway() -> Result<Gateway> {
    let idp = MockServer::start().await;

    let exchange = TokenExchangeClient::new(
        reqwest::Client::builder()
            .timeout(Duration::from_millis(500))
            .build()?,
        format!("{}/oauth2/token", idp.uri()).parse()?,
        format!("{}/oauth2/userInfo", idp.uri()).parse()?,
        ClientCredentials {
            client_id: ClientId::from_static("client-123"),
            client_secret: ClientSecret::from_static("s3cret"),
            redirect_uri: "http://localhost:3000/callback".to_owned(),
        },
    );

    let keys = KeySetCache::from_key_set(SigningKeySet::from_json(JWKS.as_bytes())?);
    let verifier =
        TokenVerifier::new(keys, ValidationPolicy::new(ISSUER)).with_clock(TestClock::new(NOW));
    let cipher = Arc::new(CookieCipher::new(COOKIE_KEY)?);
    let flow = AuthFlowController::new(exchange, verifier, Arc::clone(&cipher));

    Ok(Gateway {
        idp,
        cipher,
        app: router(AppState::new(flow, CookieSettings::default()), "/api-stuff"),
    })
}

impl Gateway {
    async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Vec<String>, Value)> {
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_owned)
            .collect();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)?
        };
        Ok((status, cookies, body))
    }

    async fn get(&self, uri: &str) -> Result<(StatusCode, Vec<String>, Value)> {
        self.send(Request::get(uri).body(Body::empty())?).await
    }
}

fn access_token() -> String {
    TestSigner::primary()
        .sign(&valid_claims(NOW))
        .as_str()
        .to_owned()
}

fn token_response(access_token: &str, refresh_token: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access_token,
        "id_token": "id-token",
        "refresh_token": refresh_token,
        "expires_in": 3600,
        "token_type": "Bearer",
    }))
}

fn cookie_value(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("refresh_token="))
        .unwrap_or_default()
}

#[tokio::test]
async fn wide_open_needs_no_token() -> Result<()> {
    let gw = gateway().await?;
    let (status, _, body) = gw.get("/api-stuff/wide-open").await?;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    Ok(())
}

#[tokio::test]
async fn routes_live_under_base_path() -> Result<()> {
    let gw = gateway().await?;
    let (status, _, _) = gw.get("/wide-open").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() -> Result<()> {
    let gw = gateway().await?;
    let response = gw
        .app
        .clone()
        .oneshot(Request::get("/api-stuff/top-secret").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE),
        Some(&http::HeaderValue::from_static(
            r#"Bearer error="invalid_token""#
        ))
    );

    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body, json!({ "message": "not authorized" }));
    Ok(())
}

#[tokio::test]
async fn top_secret_greets_verified_user() -> Result<()> {
    let gw = gateway().await?;
    let request = Request::get("/api-stuff/top-secret")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token()))
        .body(Body::empty())?;

    let (status, _, body) = gw.send(request).await?;

    assert_eq!(status, StatusCode::OK);
    let greeting = body["message"].as_str().unwrap_or_default();
    assert!(greeting.starts_with("Hey, alice!"), "{greeting}");
    Ok(())
}

#[tokio::test]
async fn expired_token_is_unauthorized() -> Result<()> {
    let gw = gateway().await?;
    let expired = TestSigner::primary().sign(&valid_claims(NOW).with_expiration(NOW));
    let request = Request::get("/api-stuff/top-secret")
        .header(header::AUTHORIZATION, format!("Bearer {}", expired.as_str()))
        .body(Body::empty())?;

    let (status, _, body) = gw.send(request).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "message": "not authorized" }));
    Ok(())
}

#[tokio::test]
async fn token_from_unknown_key_is_unauthorized() -> Result<()> {
    let gw = gateway().await?;
    let forged = TestSigner::rotated().sign(&valid_claims(NOW));
    let request = Request::get("/api-stuff/top-secret")
        .header(header::AUTHORIZATION, format!("Bearer {}", forged.as_str()))
        .body(Body::empty())?;

    let (status, _, _) = gw.send(request).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn authorize_without_code_is_bad_request() -> Result<()> {
    let gw = gateway().await?;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&gw.idp)
        .await;

    let (status, cookies, body) = gw.get("/api-stuff/authorize").await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "bad request" }));
    assert!(cookies.is_empty());
    Ok(())
}

#[tokio::test]
async fn authorize_returns_access_token_and_sealed_cookie() -> Result<()> {
    let gw = gateway().await?;
    let access = access_token();
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("code=validcode123"))
        .respond_with(token_response(&access, "R"))
        .expect(1)
        .mount(&gw.idp)
        .await;

    let (status, cookies, body) = gw.get("/api-stuff/authorize?code=validcode123").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "access_token": access }));

    let [cookie] = cookies.as_slice() else {
        panic!("expected one cookie, got {cookies:?}");
    };
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/api-stuff"));
    assert!(cookie.contains("Max-Age=5000"));
    assert!(!cookie.contains("Secure"));

    let opened = gw.cipher.open(SealedRefreshTokenRef::from_str(cookie_value(cookie)))?;
    assert_eq!(opened, "R");
    Ok(())
}

#[tokio::test]
async fn authorize_failure_hides_provider_detail() -> Result<()> {
    let gw = gateway().await?;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Authorization code has been consumed",
        })))
        .mount(&gw.idp)
        .await;

    let (status, cookies, body) = gw.get("/api-stuff/authorize?code=used").await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "problem requesting tokens" }));
    assert!(cookies.is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_accepts_query_parameter() -> Result<()> {
    let gw = gateway().await?;
    let sealed = gw.cipher.seal("R")?;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R"))
        .respond_with(token_response("A2", "R2"))
        .expect(1)
        .mount(&gw.idp)
        .await;

    let (status, cookies, body) = gw
        .get(&format!("/api-stuff/refresh?refresh={}", sealed.as_str()))
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "access_token": "A2" }));
    let opened = gw
        .cipher
        .open(SealedRefreshTokenRef::from_str(cookie_value(&cookies[0])))?;
    assert_eq!(opened, "R2");
    Ok(())
}

#[tokio::test]
async fn refresh_falls_back_to_cookie() -> Result<()> {
    let gw = gateway().await?;
    let sealed = gw.cipher.seal("R")?;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("refresh_token=R"))
        .respond_with(token_response("A2", "R2"))
        .expect(1)
        .mount(&gw.idp)
        .await;

    let request = Request::get("/api-stuff/refresh")
        .header(header::COOKIE, format!("refresh_token={}", sealed.as_str()))
        .body(Body::empty())?;
    let (status, cookies, _) = gw.send(request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(cookies.len(), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_without_token_is_bad_request() -> Result<()> {
    let gw = gateway().await?;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&gw.idp)
        .await;

    let (status, _, body) = gw.get("/api-stuff/refresh").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "bad request" }));

    let (status, _, _) = gw.get("/api-stuff/refresh?refresh=not-a-sealed-token").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn revoked_refresh_token_is_bad_request() -> Result<()> {
    let gw = gateway().await?;
    let sealed = gw.cipher.seal("revoked")?;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Refresh Token has been revoked",
        })))
        .mount(&gw.idp)
        .await;

    let (status, cookies, _) = gw
        .get(&format!("/api-stuff/refresh?refresh={}", sealed.as_str()))
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(cookies.is_empty());
    Ok(())
}

#[tokio::test]
async fn unresponsive_provider_fails_refresh_without_cookie() -> Result<()> {
    let gw = gateway().await?;
    let sealed = gw.cipher.seal("R")?;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(token_response("A2", "R2").set_delay(Duration::from_secs(5)))
        .mount(&gw.idp)
        .await;

    let (status, cookies, body) = gw
        .get(&format!("/api-stuff/refresh?refresh={}", sealed.as_str()))
        .await?;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "problem requesting tokens" }));
    assert!(cookies.is_empty());
    Ok(())
}

#[tokio::test]
async fn logout_clears_cookie() -> Result<()> {
    let gw = gateway().await?;
    let (status, cookies, _) = gw.get("/api-stuff/logout").await?;

    assert_eq!(status, StatusCode::OK);
    let [cookie] = cookies.as_slice() else {
        panic!("expected one cookie, got {cookies:?}");
    };
    assert_eq!(cookie_value(cookie), "");
    assert!(cookie.contains("Max-Age=0"));
    assert!(cookie.contains("Path=/api-stuff"));
    Ok(())
}

#[tokio::test]
async fn user_info_relays_provider_attributes() -> Result<()> {
    let gw = gateway().await?;
    let access = access_token();
    Mock::given(method("GET"))
        .and(path("/oauth2/userInfo"))
        .and(bearer_token(access.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sub": "2f1e0a6c-5b0e-4bb4-9d1e-5a0c1f1d2e3f",
            "email": "alice@example.com",
            "email_verified": "true",
            "username": "alice",
        })))
        .expect(1)
        .mount(&gw.idp)
        .await;

    let request = Request::get("/api-stuff/user-info")
        .header(header::AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let (status, _, body) = gw.send(request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["email"], "alice@example.com");
    assert_eq!(body["message"]["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn user_info_failure_is_unprocessable() -> Result<()> {
    let gw = gateway().await?;
    Mock::given(method("GET"))
        .and(path("/oauth2/userInfo"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_token",
            "error_description": "Access token has been revoked",
        })))
        .mount(&gw.idp)
        .await;

    let request = Request::get("/api-stuff/user-info")
        .header(header::AUTHORIZATION, format!("Bearer {}", access_token()))
        .body(Body::empty())?;
    let (status, _, body) = gw.send(request).await?;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].is_string());
    Ok(())
}
