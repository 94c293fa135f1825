//! Compact JSON Web Tokens as issued by the identity provider
//!
//! The specification for this standard can be found in [RFC7519][].
//!
//! A token is three base64url sections separated by `.`: a header naming
//! the signing algorithm and key, a payload of claims, and a signature over
//! the first two sections. Nothing in the header or payload may be trusted
//! until the signature has been verified; [`JwtRef::decompose`] only splits
//! the token so the verifier can decide which key to check it against.
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use std::fmt;

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{
    clock::UnixTime,
    error::{self, MalformedToken, TokenInvalid},
    jwk::{KeyId, KeyIdRef},
};

/// An audience
#[braid(serde, ref_doc = "A borrowed reference to an [`Audience`]")]
pub struct Audience;

/// An issuer of JWTs
#[braid(serde, ref_doc = "A borrowed reference to an [`Issuer`]")]
pub struct Issuer;

/// The subject of a JWT
#[braid(serde, ref_doc = "A borrowed reference to a [`Subject`]")]
pub struct Subject;

/// A JSON Web Token
///
/// This type provides custom implementations of [`Display`][JwtRef#impl-Display] and
/// [`Debug`][JwtRef#impl-Debug] to prevent unintentional disclosures of sensitive values.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "\
    A borrowed reference to a JSON Web Token ([`Jwt`])\n\
    \n\
    Formatting never reveals the signature unless the alternate form is requested."
)]
#[must_use]
pub struct Jwt;

/// Prints `***JWT***` unless the alternate form (`{:#?}`) is requested, in
/// which case the header and payload are shown and the signature is elided.
/// A width (`{:#12?}`) reveals that many characters of the signature.
impl fmt::Debug for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, 0)?;
            } else {
                limited_reveal(&self.0, &mut *f, 0)?;
            }
            f.write_str("\"")
        } else {
            f.write_str("***JWT***")
        }
    }
}

/// Prints `***JWT***` unless the alternate form (`{:#}`) is requested, in
/// which case the whole token is written.
impl fmt::Display for JwtRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            if let Some(last_period) = self.0.rfind('.') {
                f.write_str(&self.0[..=last_period])?;
                limited_reveal(&self.0[last_period + 1..], &mut *f, usize::MAX)
            } else {
                limited_reveal(&self.0, &mut *f, usize::MAX)
            }
        } else {
            f.write_str("***JWT***")
        }
    }
}

pub(crate) fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
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

/// The JOSE header of a token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

impl Headers {
    /// A header declaring `alg` and naming the signing key `kid`
    pub fn new(alg: impl Into<String>, kid: Option<KeyId>) -> Self {
        Self {
            alg: alg.into(),
            kid,
            typ: Some("JWT".to_owned()),
        }
    }

    /// The declared signing algorithm, exactly as written
    #[must_use]
    pub fn alg(&self) -> &str {
        &self.alg
    }

    /// The id of the key the token claims to be signed with
    #[must_use]
    pub fn kid(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }
}

/// A set of zero or more [`Audience`]s
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Audience>", into = "OneOrMany<Audience>")]
pub struct Audiences(Vec<Audience>);

impl Audiences {
    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the audiences
    pub fn iter(&self) -> impl Iterator<Item = &AudienceRef> {
        self.0.iter().map(std::ops::Deref::deref)
    }
}

impl From<OneOrMany<Audience>> for Audiences {
    fn from(vals: OneOrMany<Audience>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Audiences> for OneOrMany<Audience> {
    fn from(mut vals: Audiences) -> Self {
        match vals.0.pop() {
            Some(single) if vals.0.is_empty() => Self::One(single),
            Some(last) => {
                vals.0.push(last);
                Self::Many(vals.0)
            }
            None => Self::Many(Vec::new()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// A `NumericDate` claim, serialized back exactly as the issuer wrote it
#[derive(Clone, Debug, PartialEq)]
struct NumericDate {
    secs: UnixTime,
    raw: Number,
}

impl From<UnixTime> for NumericDate {
    fn from(secs: UnixTime) -> Self {
        Self {
            secs,
            raw: Number::from(secs.0),
        }
    }
}

impl Serialize for NumericDate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Number::deserialize(deserializer)?;
        let secs = UnixTime::deserialize(raw.clone()).map_err(serde::de::Error::custom)?;
        Ok(Self { secs, raw })
    }
}

/// The claim set of a token
///
/// The registered and provider-specific claims the gateway reads are typed;
/// every other claim is kept verbatim in [`Claims::extra`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub: Option<Subject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Audiences::is_empty")]
    aud: Audiences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<NumericDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    iat: Option<NumericDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_use: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Claims {
    /// An empty claim set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `sub` claim
    #[must_use]
    pub fn with_subject(mut self, sub: impl Into<Subject>) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Sets the `iss` claim
    #[must_use]
    pub fn with_issuer(mut self, iss: impl Into<Issuer>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    /// Sets the `aud` claim to a single audience
    #[must_use]
    pub fn with_audience(mut self, aud: impl Into<Audience>) -> Self {
        self.aud = Audiences(vec![aud.into()]);
        self
    }

    /// Sets the `exp` claim
    #[must_use]
    pub fn with_expiration(mut self, exp: UnixTime) -> Self {
        self.exp = Some(exp.into());
        self
    }

    /// Sets the `iat` claim
    #[must_use]
    pub fn with_issued_at(mut self, iat: UnixTime) -> Self {
        self.iat = Some(iat.into());
        self
    }

    /// Sets the `token_use` claim
    #[must_use]
    pub fn with_token_use(mut self, token_use: impl Into<String>) -> Self {
        self.token_use = Some(token_use.into());
        self
    }

    /// Sets the `username` claim
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets an arbitrary claim
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Subject
    #[must_use]
    pub fn sub(&self) -> Option<&SubjectRef> {
        self.sub.as_deref()
    }

    /// Issuer
    #[must_use]
    pub fn iss(&self) -> Option<&IssuerRef> {
        self.iss.as_deref()
    }

    /// Audience
    pub fn aud(&self) -> &Audiences {
        &self.aud
    }

    /// Expires
    #[must_use]
    pub fn exp(&self) -> Option<UnixTime> {
        self.exp.as_ref().map(|d| d.secs)
    }

    /// Issued at
    #[must_use]
    pub fn iat(&self) -> Option<UnixTime> {
        self.iat.as_ref().map(|d| d.secs)
    }

    /// Whether the provider issued this as an `access` or `id` token
    #[must_use]
    pub fn token_use(&self) -> Option<&str> {
        self.token_use.as_deref()
    }

    /// The provider's user name for the subject
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The client the token was issued to
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Claims without a typed accessor
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

/// A token split into its sections, with only the header decoded
///
/// Produced by [`JwtRef::decompose`]. The header is untrusted and is used
/// only to select the key the signature must verify against.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Decomposed<'a> {
    header: Headers,
    message: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> Decomposed<'a> {
    /// The untrusted header
    pub fn untrusted_header(&self) -> &Headers {
        &self.header
    }

    /// The signed portion of the token: `header.payload` as encoded
    #[must_use]
    pub fn message(&self) -> &'a str {
        self.message
    }

    /// Decodes the signature section
    ///
    /// # Errors
    ///
    /// Returns an error if the section is not base64url.
    pub fn signature(&self) -> Result<Vec<u8>, TokenInvalid> {
        URL_SAFE_NO_PAD
            .decode(self.signature)
            .map_err(error::malformed_signature)
    }

    /// Decodes the payload section
    ///
    /// # Errors
    ///
    /// Returns an error if the section is not base64url-encoded JSON claims.
    pub fn untrusted_claims(&self) -> Result<Claims, TokenInvalid> {
        let raw = URL_SAFE_NO_PAD
            .decode(self.payload)
            .map_err(error::malformed_payload)?;
        serde_json::from_slice(&raw).map_err(error::malformed_payload)
    }
}

impl JwtRef {
    /// Splits the token into header, payload and signature and decodes the
    /// header
    ///
    /// # Errors
    ///
    /// Returns an error if the token does not have exactly three sections
    /// or the header is not base64url-encoded JSON.
    pub fn decompose(&self) -> Result<Decomposed<'_>, TokenInvalid> {
        let mut sections = self.as_str().split('.');
        let (h_str, payload, signature) =
            match (sections.next(), sections.next(), sections.next(), sections.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(MalformedToken::Structure.into()),
            };

        let message = &self.as_str()[..h_str.len() + 1 + payload.len()];

        let h_raw = URL_SAFE_NO_PAD
            .decode(h_str)
            .map_err(error::malformed_header)?;
        let header: Headers = serde_json::from_slice(&h_raw).map_err(error::malformed_header)?;

        Ok(Decomposed {
            header,
            message,
            payload,
            signature,
        })
    }
}
