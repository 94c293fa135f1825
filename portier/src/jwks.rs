use std::{collections::HashMap, convert::TryFrom};

use serde::Deserialize;

use crate::{
    error::KeySetError,
    jwk::{JwkDto, KeyId, KeyIdRef},
    Jwk,
};

/// The identity provider's signing keys, indexed by key id
///
/// A set is never modified after construction; a refreshed key set
/// replaces the previous one as a whole.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "KeySetDto")]
pub struct SigningKeySet {
    keys: HashMap<KeyId, Jwk>,
}

impl SigningKeySet {
    /// Builds a key set from the given keys
    ///
    /// When two keys share an id, the first one wins.
    pub fn from_keys(keys: impl IntoIterator<Item = Jwk>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            map.entry(key.key_id().to_owned()).or_insert(key);
        }
        Self { keys: map }
    }

    /// Parses a JSON Web Key Set document
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::MalformedKeySet`] if the document is not a
    /// JSON object with a `keys` array. Individual keys that cannot be used
    /// for RS* verification are skipped.
    pub fn from_json(document: &[u8]) -> Result<Self, KeySetError> {
        serde_json::from_slice(document).map_err(|e| KeySetError::MalformedKeySet(e.into()))
    }

    /// Looks up a key by its id
    #[must_use]
    pub fn lookup(&self, kid: &KeyIdRef) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    /// The number of usable keys in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set holds no usable keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the key ids in the set
    pub fn key_ids(&self) -> impl Iterator<Item = &KeyIdRef> {
        self.keys.keys().map(std::ops::Deref::deref)
    }
}

#[derive(Deserialize)]
struct KeySetDto {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl From<KeySetDto> for SigningKeySet {
    fn from(dto: KeySetDto) -> Self {
        Self::from_keys(dto.keys)
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct MaybeJwksVisitor;

    impl<'de> serde::de::Visitor<'de> for MaybeJwksVisitor {
        type Value = Vec<Jwk>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a list of JWK objects")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut values = Vec::with_capacity(seq.size_hint().unwrap_or_default());
            let mut index = 0_usize;

            while let Some(value) = seq.next_element::<MaybeJwk>()? {
                match value {
                    MaybeJwk::Jwk(dto) => {
                        let kid = dto.kid.clone();
                        match Jwk::try_from(dto) {
                            Ok(jwk) => values.push(jwk),
                            Err(error) => {
                                tracing::warn!(
                                    jwks.idx = index,
                                    jwk.kid = ?kid,
                                    %error,
                                    "ignoring unusable JWK"
                                );
                            }
                        }
                    }
                    MaybeJwk::Unknown(_) => {
                        tracing::warn!(jwks.idx = index, "ignoring unrecognized JWK");
                    }
                }
                index += 1;
            }

            Ok(values)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(JwkDto),
        Unknown(serde::de::IgnoredAny),
    }

    deserializer.deserialize_seq(MaybeJwksVisitor)
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;
    use crate::test_util::{JWKS, PRIMARY_KID};

    const JWKS_WITH_FOREIGN_KEYS: &str = r#"
        {
            "keys": [
                { "kid": "ec-1", "kty": "EC", "crv": "P-256", "x": "AA", "y": "AA", "use": "sig" },
                { "kid": "hmac-1", "kty": "oct", "k": "dGVzdA" },
                { "kid": "rsa-enc", "kty": "RSA", "use": "enc", "n": "AQAB", "e": "AQAB" },
                "not even an object"
            ]
        }
    "#;

    #[test]
    fn decodes_provider_key_set() -> Result<()> {
        let set = SigningKeySet::from_json(JWKS.as_bytes())?;
        assert_eq!(set.len(), 1);
        assert!(set.lookup(KeyIdRef::from_str(PRIMARY_KID)).is_some());
        Ok(())
    }

    #[test]
    #[traced_test]
    fn skips_keys_it_cannot_verify_with() -> Result<()> {
        let set = SigningKeySet::from_json(JWKS_WITH_FOREIGN_KEYS.as_bytes())?;
        assert!(set.is_empty());
        assert!(logs_contain("ignoring unusable JWK"));
        assert!(logs_contain("ignoring unrecognized JWK"));
        Ok(())
    }

    #[test]
    fn missing_keys_member_is_malformed() {
        let err = SigningKeySet::from_json(br#"{"not_keys": []}"#).unwrap_err();
        assert!(matches!(err, KeySetError::MalformedKeySet(_)));
    }

    #[test]
    fn lookup_misses_unknown_ids() -> Result<()> {
        let set = SigningKeySet::from_json(JWKS.as_bytes())?;
        assert!(set.lookup(KeyIdRef::from_str("someone-else")).is_none());
        Ok(())
    }
}
