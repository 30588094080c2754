//! ENS name resolution with fixed-fallback degradation.
//!
//! `resolve()` never fails outward: every lookup error or empty result
//! degrades to the configured fallback address, logged at WARN. Callers
//! treat the result as a valid address either way.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::ResolveError;

/// Reserved suffix for relayable identities.
pub const ENS_SUFFIX: &str = ".eth";

/// Check whether a string is a 0x-prefixed 40-hex-digit Ethereum address.
pub fn is_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

// ── Name service ────────────────────────────────────────────────────

/// Raw name lookup — fallible, may legitimately find no address.
#[async_trait]
pub trait NameService: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Option<String>, ResolveError>;
}

/// ENS lookup against an HTTP resolution endpoint.
///
/// `GET {base_url}/{name}` is expected to answer with a JSON object whose
/// `address` field is the resolved address or null.
pub struct HttpNameService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    address: Option<String>,
}

impl HttpNameService {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl NameService for HttpNameService {
    async fn lookup(&self, name: &str) -> Result<Option<String>, ResolveError> {
        let url = format!("{}/{name}", self.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ResolveError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ResolveError::Request(format!(
                "resolver endpoint returned {}",
                resp.status()
            )));
        }

        let body: ResolveResponse = resp
            .json()
            .await
            .map_err(|e| ResolveError::Malformed(e.to_string()))?;

        // Endpoints occasionally echo junk for unregistered names; only a
        // well-formed address counts as resolved.
        Ok(body.address.filter(|a| is_address(a)))
    }
}

// ── Resolver ────────────────────────────────────────────────────────

/// Name resolver with the fixed-fallback policy.
///
/// Successful resolutions are cached in-process; the cache is an
/// optimization only, repeated misses re-query the name service.
pub struct EnsResolver {
    service: Arc<dyn NameService>,
    fallback_address: String,
    cache: RwLock<HashMap<String, String>>,
}

impl EnsResolver {
    pub fn new(service: Arc<dyn NameService>, fallback_address: String) -> Self {
        Self {
            service,
            fallback_address,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an ENS name to an address. Never fails: lookup errors and
    /// empty results yield the fallback address.
    pub async fn resolve(&self, name: &str) -> String {
        if let Some(hit) = self.cache.read().await.get(name) {
            return hit.clone();
        }

        match self.service.lookup(name).await {
            Ok(Some(address)) => {
                tracing::debug!("Resolved {name} to {address}");
                self.cache
                    .write()
                    .await
                    .insert(name.to_string(), address.clone());
                address
            }
            Ok(None) => {
                tracing::warn!(
                    "Failed to resolve ENS name {name}; using fallback address {}",
                    self.fallback_address
                );
                self.fallback_address.clone()
            }
            Err(e) => {
                tracing::warn!(
                    "Error resolving ENS name {name}: {e}; using fallback address {}",
                    self.fallback_address
                );
                self.fallback_address.clone()
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
