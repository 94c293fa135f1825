//! Wire shapes exchanged with the identity provider's OAuth2 endpoints

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::{
    AccessToken, AuthorizationCodeRef, ClientIdRef, IdToken, RefreshToken, RefreshTokenRef,
};

/// Form body of an authorization code grant
#[derive(Debug)]
pub(crate) struct CodeGrant<'a> {
    pub code: &'a AuthorizationCodeRef,
    pub client_id: &'a ClientIdRef,
    pub redirect_uri: &'a str,
}

impl Serialize for CodeGrant<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("CodeGrant", 4)?;
        ser.serialize_field("grant_type", "authorization_code")?;
        ser.serialize_field("code", self.code.as_str())?;
        ser.serialize_field("client_id", self.client_id)?;
        ser.serialize_field("redirect_uri", self.redirect_uri)?;
        ser.end()
    }
}

/// Form body of a refresh token grant
#[derive(Debug)]
pub(crate) struct RefreshGrant<'a> {
    pub refresh_token: &'a RefreshTokenRef,
    pub client_id: &'a ClientIdRef,
}

impl Serialize for RefreshGrant<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("RefreshGrant", 3)?;
        ser.serialize_field("grant_type", "refresh_token")?;
        ser.serialize_field("client_id", self.client_id)?;
        ser.serialize_field("refresh_token", self.refresh_token.as_str())?;
        ser.end()
    }
}

/// The tokens returned by a successful grant
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenBundle {
    /// The access token
    pub access_token: AccessToken,

    /// The ID token, when the `openid` scope was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,

    /// A refresh token; providers that do not rotate refresh tokens omit
    /// it from refresh grant responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<RefreshToken>,

    /// Lifetime of the access token in seconds
    pub expires_in: u64,

    /// The token type, normally `Bearer`
    #[serde(default = "bearer")]
    pub token_type: String,
}

fn bearer() -> String {
    "Bearer".to_owned()
}

/// An OAuth2 error response as described in RFC 6749 §5.2
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// The standard claims returned by the provider's userInfo endpoint
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserInfo {
    /// Subject
    pub sub: String,

    /// Email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider has verified the email address
    #[serde(
        default,
        deserialize_with = "bool_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub email_verified: Option<bool>,

    /// The provider's user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Every other attribute, as returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cognito reports booleans in userInfo as the strings `"true"`/`"false"`
fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match Option::<BoolOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolOrString::Bool(b)) => Ok(Some(b)),
        Some(BoolOrString::String(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(&s),
                &"a boolean",
            )),
        },
    }
}
