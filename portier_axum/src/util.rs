use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

/// The JSON body of every error response and of plain message responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message<T = String> {
    /// The payload
    pub message: T,
}

impl<T> Message<T> {
    /// Wraps a payload
    pub fn new(message: T) -> Self {
        Self { message }
    }
}

/// A response with `status` and a `{"message": ...}` body
pub fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(Message::new(message))).into_response()
}

/// Build a `401 Unauthorized` response with the appropriate `www-authenticate` header
///
/// The description provided will be automatically escaped to make sure it
/// is header-friendly.
///
/// The prepared response will have the form:
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// www-authenticate: Bearer error="invalid_token" error_description="{description}"
///
/// {"message":"not authorized"}
/// ```
///
/// `error_description` is omitted if `description` is empty.
pub fn unauthorized(description: &str) -> Response {
    let mut resp = message(StatusCode::UNAUTHORIZED, "not authorized");
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, invalid_token(description));
    resp
}

fn invalid_token(description: &str) -> HeaderValue {
    const BARE: &str = r#"Bearer error="invalid_token""#;

    if description.is_empty() {
        HeaderValue::from_static(BARE)
    } else {
        HeaderValue::try_from(format!(
            r#"Bearer error="invalid_token" error_description="{}""#,
            description.escape_default()
        ))
        .unwrap_or_else(|_| HeaderValue::from_static(BARE))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn extract_www_authenticate_headers(resp: &Response) -> BTreeSet<&str> {
        resp.headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    #[tokio::test]
    async fn unauthorized_escapes_description_and_keeps_message_body() {
        let resp = unauthorized("\0\n\tjeton™: \"Ĉu la ĵetono validas?\"");

        let expected = BTreeSet::from([
            r#"Bearer error="invalid_token" error_description="\u{0}\n\tjeton\u{2122}: \"\u{108}u la \u{135}etono validas?\"""#,
        ]);
        assert_eq!(extract_www_authenticate_headers(&resp), expected);
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, serde_json::json!({ "message": "not authorized" }));
    }

    #[test]
    fn in_unauthorized_with_empty_description_doesnt_include_description() {
        let resp = unauthorized("");

        let headers = extract_www_authenticate_headers(&resp);

        assert_eq!(headers, BTreeSet::from([r#"Bearer error="invalid_token""#]));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
