//! A shared, refreshable view of the identity provider's signing keys

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use reqwest::{
    header::{self, HeaderValue},
    Client, StatusCode,
};
use tokio::{sync::Mutex, time::Instant};

use crate::{error::KeySetError, jwk::KeyIdRef, Jwk, SigningKeySet};

/// Tuning for a remotely backed [`KeySetCache`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySetOptions {
    /// The shortest time allowed between two refreshes triggered by an
    /// unknown key id
    pub min_refresh_interval: Duration,
}

impl Default for KeySetOptions {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct VolatileData {
    keys: Arc<SigningKeySet>,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl VolatileData {
    fn new(keys: SigningKeySet) -> Self {
        Self {
            keys: Arc::new(keys),
            etag: None,
            last_modified: None,
        }
    }
}

#[derive(Debug)]
struct RemoteOptions {
    jwks_url: String,
    client: Client,
    min_refresh_interval: Duration,
    /// Held for the duration of a fetch; records when the last one started
    last_attempt: Mutex<Option<Instant>>,
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<VolatileData>,
    remote: Option<RemoteOptions>,
}

/// The signing keys currently trusted for token verification
///
/// Clones share the same key set. Readers always observe a complete key
/// set: a refresh builds the new set off to the side and swaps it in whole,
/// and a failed refresh leaves the current set in place.
#[derive(Debug, Clone)]
#[must_use]
pub struct KeySetCache {
    inner: Arc<Inner>,
}

impl KeySetCache {
    /// Constructs a cache over a fixed key set that is never refreshed
    pub fn from_key_set(keys: SigningKeySet) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(VolatileData::new(keys)),
                remote: None,
            }),
        }
    }

    /// Constructs a cache by fetching the key set published at `jwks_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be retrieved or parsed.
    pub async fn fetch(
        jwks_url: impl Into<String>,
        client: Client,
        options: KeySetOptions,
    ) -> Result<Self, KeySetError> {
        let jwks_url = jwks_url.into();
        let data = get_key_set(&client, &jwks_url, None)
            .await?
            .ok_or(KeySetError::Status {
                status: StatusCode::NOT_MODIFIED.as_u16(),
            })?;

        tracing::info!(jwks.url = %jwks_url, jwks.keys = data.keys.len(), "key set loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(data),
                remote: Some(RemoteOptions {
                    jwks_url,
                    client,
                    min_refresh_interval: options.min_refresh_interval,
                    last_attempt: Mutex::new(None),
                }),
            }),
        })
    }

    /// A snapshot of the current key set
    #[must_use]
    pub fn key_set(&self) -> Arc<SigningKeySet> {
        Arc::clone(&self.inner.data.load().keys)
    }

    /// Looks up a key by id in the current key set
    #[must_use]
    pub fn lookup(&self, kid: &KeyIdRef) -> Option<Jwk> {
        self.inner.data.load().keys.lookup(kid).cloned()
    }

    /// Replaces the key set
    pub fn set_key_set(&self, keys: SigningKeySet) {
        self.inner.data.store(Arc::new(VolatileData::new(keys)));
    }

    /// Re-fetches the key set from the remote URL
    ///
    /// No retries are attempted. If the attempt fails, no change is made to
    /// the current key set. A static cache returns `Ok` without doing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the key set cannot be retrieved or parsed.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        if let Some(remote) = &self.inner.remote {
            tracing::Span::current().record("jwks.url", remote.jwks_url.as_str());

            let mut last_attempt = remote.last_attempt.lock().await;
            *last_attempt = Some(Instant::now());
            self.refresh_remote(remote).await?;
        }

        Ok(())
    }

    /// Refreshes the key set after a lookup for `kid` missed
    ///
    /// Concurrent callers share a single outbound fetch, and no fetch is made
    /// if the previous one started less than the minimum refresh interval ago.
    /// Returns whether `kid` is present in the key set afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch was attempted and failed.
    #[tracing::instrument(skip(self), fields(jwks.url = tracing::field::Empty))]
    pub async fn refresh_on_miss(&self, kid: &KeyIdRef) -> Result<bool, KeySetError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(false);
        };
        tracing::Span::current().record("jwks.url", remote.jwks_url.as_str());

        let mut last_attempt = remote.last_attempt.lock().await;

        if self.inner.data.load().keys.lookup(kid).is_some() {
            return Ok(true);
        }

        if let Some(at) = *last_attempt {
            if at.elapsed() < remote.min_refresh_interval {
                tracing::debug!("key set refreshed recently; not fetching again");
                return Ok(false);
            }
        }

        *last_attempt = Some(Instant::now());
        self.refresh_remote(remote).await?;

        Ok(self.inner.data.load().keys.lookup(kid).is_some())
    }

    async fn refresh_remote(&self, remote: &RemoteOptions) -> Result<(), KeySetError> {
        tracing::debug!("refreshing key set");

        let current = self.inner.data.load_full();
        match get_key_set(&remote.client, &remote.jwks_url, Some(&*current)).await {
            Ok(Some(data)) => {
                tracing::info!(jwks.keys = data.keys.len(), "key set refreshed");
                self.inner.data.store(Arc::new(data));
                Ok(())
            }
            Ok(None) => {
                tracing::debug!("key set not modified");
                Ok(())
            }
            Err(error) => {
                let error_ref: &dyn std::error::Error = &error;
                tracing::warn!(error = error_ref, "key set refresh failed; keeping current keys");
                Err(error)
            }
        }
    }

    /// Refreshes the key set in the background every `interval`
    ///
    /// Failures are logged and retried on the next tick. Must be called
    /// from within a Tokio runtime.
    pub fn spawn_refresh(&self, interval: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;
            loop {
                timer.tick().await;
                // Logged inside refresh; the next tick retries
                let _ = this.refresh().await;
            }
        });
    }
}

/// Returns `None` when the server reports the cached copy is current
async fn get_key_set(
    client: &Client,
    jwks_url: &str,
    cached: Option<&VolatileData>,
) -> Result<Option<VolatileData>, KeySetError> {
    let mut request = client.get(jwks_url);

    if let Some(cached) = cached {
        if let Some(etag) = &cached.etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        } else if let Some(last_modified) = &cached.last_modified {
            request = request.header(header::IF_MODIFIED_SINCE, last_modified);
        }
    }

    let response = request.send().await.map_err(KeySetError::Network)?;

    if cached.is_some() && response.status() == StatusCode::NOT_MODIFIED {
        return Ok(None);
    } else if !response.status().is_success() {
        return Err(KeySetError::Status {
            status: response.status().as_u16(),
        });
    }

    let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
    let last_modified = response
        .headers()
        .get(header::LAST_MODIFIED)
        .map(ToOwned::to_owned);

    let body = response.bytes().await.map_err(KeySetError::Network)?;
    let keys = SigningKeySet::from_json(&body)?;

    Ok(Some(VolatileData {
        keys: Arc::new(keys),
        etag,
        last_modified,
    }))
}
