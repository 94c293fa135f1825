//! Authenticated encryption of refresh tokens for storage in a cookie
//!
//! A sealed value is `nonce || ciphertext || tag`, encoded as unpadded
//! base64url so it can be used as a cookie value without quoting. Every
//! call to [`CookieCipher::seal`] draws a fresh random nonce, so sealing the
//! same token twice yields two unrelated values.

use std::fmt;

use aliri_braid::braid;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::{
    aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};

use crate::{
    error::{self, CipherKeyError, DecryptError, SealError},
    jwt::limited_reveal,
};

/// A refresh token sealed by a [`CookieCipher`]
///
/// Anyone holding the sealed value can trade it for fresh tokens, so it is
/// redacted when printed. The alternate forms reveal it.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ref_doc = "A borrowed reference to a [`SealedRefreshToken`]"
)]
pub struct SealedRefreshToken;

impl fmt::Debug for SealedRefreshTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            limited_reveal(&self.0, &mut *f, 0)?;
            f.write_str("\"")
        } else {
            f.write_str("***SEALED REFRESH TOKEN***")
        }
    }
}

impl fmt::Display for SealedRefreshTokenRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            limited_reveal(&self.0, &mut *f, usize::MAX)
        } else {
            f.write_str("***SEALED REFRESH TOKEN***")
        }
    }
}

/// Seals and opens refresh tokens with a process-wide AES-GCM key
///
/// The key length selects the cipher: 16 bytes for AES-128-GCM, 32 bytes
/// for AES-256-GCM. The key is never printed.
pub struct CookieCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CookieCipher {
    /// Constructs a cipher from raw key bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the key is neither 16 nor 32 bytes long.
    pub fn new(key: &[u8]) -> Result<Self, CipherKeyError> {
        let algorithm = match key.len() {
            16 => &aead::AES_128_GCM,
            32 => &aead::AES_256_GCM,
            len => return Err(error::cipher_key_error(len)),
        };

        let key = UnboundKey::new(algorithm, key).map_err(|_| error::cipher_key_error(key.len()))?;

        Ok(Self {
            key: LessSafeKey::new(key),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypts `plaintext` under a freshly generated nonce
    ///
    /// # Errors
    ///
    /// Returns an error only if the system random number generator fails.
    pub fn seal(&self, plaintext: &str) -> Result<SealedRefreshToken, SealError> {
        let mut nonce = [0_u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| error::seal_error())?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::empty(), &mut in_out)
            .map_err(|_| error::seal_error())?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&in_out);

        Ok(SealedRefreshToken::new(URL_SAFE_NO_PAD.encode(sealed)))
    }

    /// Decrypts a value produced by [`seal`][Self::seal]
    ///
    /// # Errors
    ///
    /// Fails if the value is not base64url, is too short to hold a nonce and
    /// tag, was sealed under a different key, or was altered in any way.
    pub fn open(&self, sealed: &SealedRefreshTokenRef) -> Result<String, DecryptError> {
        let raw = URL_SAFE_NO_PAD
            .decode(sealed.as_str())
            .map_err(|_| error::decrypt_error())?;

        if raw.len() < NONCE_LEN + self.key.algorithm().tag_len() {
            return Err(error::decrypt_error());
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce).map_err(|_| error::decrypt_error())?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| error::decrypt_error())?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| error::decrypt_error())
    }
}

impl fmt::Debug for CookieCipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CookieCipher")
            .field("algorithm", self.key.algorithm())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const KEY: &[u8; 32] = b"0123456789abcdef0123456789abcdef";
    const OTHER_KEY: &[u8; 32] = b"fedcba9876543210fedcba9876543210";
    const TOKEN: &str = "eyJjdHkiOiJKV1QiLCJlbmMiOiJBMjU2R0NNIiwiYWxnIjoiUlNBLU9BRVAifQ.opaque-refresh";

    #[test]
    fn round_trips() -> Result<()> {
        let cipher = CookieCipher::new(KEY)?;
        let sealed = cipher.seal(TOKEN)?;
        assert_eq!(cipher.open(&sealed)?, TOKEN);
        Ok(())
    }

    #[test]
    fn accepts_128_bit_keys() -> Result<()> {
        let cipher = CookieCipher::new(&KEY[..16])?;
        let sealed = cipher.seal(TOKEN)?;
        assert_eq!(cipher.open(&sealed)?, TOKEN);
        Ok(())
    }

    #[test]
    fn rejects_other_key_lengths() {
        for len in [0, 15, 24, 33] {
            let err = CookieCipher::new(&vec![7; len]).unwrap_err();
            assert_eq!(err, error::cipher_key_error(len));
        }
    }

    #[test]
    fn every_seal_uses_a_fresh_nonce() -> Result<()> {
        let cipher = CookieCipher::new(KEY)?;
        let first = cipher.seal(TOKEN)?;
        let second = cipher.seal(TOKEN)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn sealed_value_is_cookie_safe() -> Result<()> {
        let sealed = CookieCipher::new(KEY)?.seal(TOKEN)?;
        assert!(sealed
            .as_str()
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        Ok(())
    }

    #[test]
    fn any_flipped_byte_fails_to_open() -> Result<()> {
        let cipher = CookieCipher::new(KEY)?;
        let sealed = cipher.seal(TOKEN)?;
        let raw = URL_SAFE_NO_PAD.decode(sealed.as_str())?;

        for idx in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[idx] ^= 0x01;
            let tampered = SealedRefreshToken::new(URL_SAFE_NO_PAD.encode(tampered));
            assert_eq!(cipher.open(&tampered), Err(error::decrypt_error()), "byte {idx}");
        }
        Ok(())
    }

    #[test]
    fn wrong_key_fails_to_open() -> Result<()> {
        let sealed = CookieCipher::new(KEY)?.seal(TOKEN)?;
        let other = CookieCipher::new(OTHER_KEY)?;
        assert!(other.open(&sealed).is_err());
        Ok(())
    }

    #[test]
    fn truncated_or_garbage_input_fails_to_open() -> Result<()> {
        let cipher = CookieCipher::new(KEY)?;
        let sealed = cipher.seal(TOKEN)?;

        for bad in [
            "",
            "not base64!",
            &sealed.as_str()[..16],
            &sealed.as_str()[..sealed.as_str().len() - 4],
        ] {
            assert!(cipher.open(SealedRefreshTokenRef::from_str(bad)).is_err(), "{bad:?}");
        }
        Ok(())
    }

    #[test]
    fn debug_does_not_reveal_key() -> Result<()> {
        let cipher = CookieCipher::new(KEY)?;
        let debug = format!("{cipher:?}");
        assert!(!debug.contains("0123456789abcdef"));
        Ok(())
    }

    #[test]
    fn sealed_value_is_redacted_when_printed() -> Result<()> {
        let sealed = CookieCipher::new(KEY)?.seal("refresh")?;

        let printed = format!("{sealed:?} / {sealed} / {:?}", &*sealed);
        assert!(!printed.contains(sealed.as_str()), "{printed}");
        assert_eq!(format!("{sealed}"), "***SEALED REFRESH TOKEN***");
        assert_eq!(format!("{sealed:#}"), sealed.as_str());
        Ok(())
    }
}
