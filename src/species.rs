//! Read-only species reference lookup with a long-TTL list cache.
//!
//! The reference service is near-static data consumed only when starting a
//! new hunt, so the full list is cached client-side for a day and lookups
//! have no synchronization concerns at all.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::remote::{RemoteError, RemoteResult};

/// How long a fetched species list stays fresh.
pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One entry of the full species list, enough for autocomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesEntry {
    /// Lowercase species name.
    pub name: String,
    /// Reference-service species number.
    pub id: u32,
    /// Thumbnail sprite URL, when the service provides one.
    #[serde(default)]
    pub sprite: Option<String>,
}

/// Full lookup result for a single species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesInfo {
    /// Lowercase species name.
    pub name: String,
    /// Sprite URL, when the service provides one.
    #[serde(default)]
    pub sprite: Option<String>,
    /// Ordered type list, possibly empty.
    #[serde(default)]
    pub types: Vec<String>,
    /// Reference-service species number.
    pub id: u32,
}

/// The species reference service.
#[async_trait]
pub trait SpeciesSource: Send + Sync {
    /// Exact-name lookup. `None` when the service does not know the name.
    async fn lookup(&self, name: &str) -> RemoteResult<Option<SpeciesInfo>>;

    /// The full species list.
    async fn list(&self) -> RemoteResult<Vec<SpeciesEntry>>;
}

/// Caching front for a [`SpeciesSource`].
pub struct SpeciesClient<S> {
    source: S,
    ttl: Duration,
    cached: Option<(Instant, Vec<SpeciesEntry>)>,
}

impl<S: SpeciesSource> SpeciesClient<S> {
    /// Wraps `source` with the default one-day list TTL.
    pub fn new(source: S) -> Self {
        Self::with_ttl(source, DEFAULT_LIST_TTL)
    }

    /// Wraps `source` with a custom list TTL.
    pub fn with_ttl(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: None,
        }
    }

    /// Exact-name lookup; input is trimmed and lowercased first.
    pub async fn lookup(&self, name: &str) -> RemoteResult<Option<SpeciesInfo>> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Ok(None);
        }
        self.source.lookup(&name).await
    }

    /// The full species list, served from cache while fresh.
    ///
    /// An empty response is passed through but never cached, so a service
    /// hiccup does not pin an empty list for a whole TTL window.
    pub async fn list(&mut self) -> RemoteResult<Vec<SpeciesEntry>> {
        if let Some((fetched_at, list)) = &self.cached {
            if fetched_at.elapsed() < self.ttl {
                return Ok(list.clone());
            }
        }
        let list = self.source.list().await?;
        if !list.is_empty() {
            self.cached = Some((Instant::now(), list.clone()));
        }
        Ok(list)
    }
}

/// HTTP implementation of [`SpeciesSource`] against the reference endpoints.
pub struct HttpSpecies {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSpecies {
    /// Creates a new client for the reference service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Creates a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> RemoteResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SpeciesSource for HttpSpecies {
    async fn lookup(&self, name: &str) -> RemoteResult<Option<SpeciesInfo>> {
        let matches: Vec<SpeciesInfo> =
            self.get_json("/pokemon/search", &[("q", name)]).await?;
        Ok(matches.into_iter().next())
    }

    async fn list(&self) -> RemoteResult<Vec<SpeciesEntry>> {
        self.get_json("/pokemon/list", &[]).await
    }
}
