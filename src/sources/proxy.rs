use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use tracing::{debug, instrument, trace, warn};

use super::Fetcher;
use crate::config::ProxyConfig;
use crate::{ProxyInfo, SourceResult};

/// Pseudo-members of a selector group that are not real exit nodes
pub const RESERVED_MEMBERS: [&str; 3] = ["DIRECT", "REJECT", "GLOBAL"];

#[derive(Debug, Deserialize)]
struct ProxiesResponse {
    proxies: HashMap<String, ProxyGroup>,
}

#[derive(Debug, Deserialize)]
struct ProxyGroup {
    #[serde(default)]
    now: String,
    #[serde(default)]
    all: Vec<String>,
}

/// Shared access to the proxy controller API
#[derive(Debug, Clone)]
pub struct ProxyApi {
    config: ProxyConfig,
    base: Url,
    client: Client,
}

impl ProxyApi {
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let base = Url::parse(&config.endpoint)
            .with_context(|| format!("invalid proxy endpoint {}", config.endpoint))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("invalid proxy endpoint {}", config.endpoint);
        }

        let client = Client::builder()
            .build()
            .context("failed to build proxy HTTP client")?;
        Ok(Self {
            config,
            base,
            client,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Endpoint URL with each segment appended and percent-encoded.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn request(&self, method: reqwest::Method, segments: &[&str]) -> RequestBuilder {
        let request = self.client.request(method, self.url(segments));
        match &self.config.secret {
            Some(secret) => request.bearer_auth(secret),
            None => request,
        }
    }

    /// Current selection and candidate members of the managed group.
    async fn group(&self) -> Result<(String, Vec<String>)> {
        let response = self
            .request(reqwest::Method::GET, &["proxies"])
            .timeout(self.config.timeout())
            .send()
            .await
            .context("GET /proxies failed")?;

        if !response.status().is_success() {
            anyhow::bail!("GET /proxies: HTTP error: {}", response.status());
        }

        let mut listing: ProxiesResponse = response
            .json()
            .await
            .context("GET /proxies: failed to parse JSON")?;

        let group = listing
            .proxies
            .remove(&self.config.group)
            .with_context(|| format!("{} not found", self.config.group))?;

        Ok((group.now, candidates(group.all)))
    }

    /// Delay probe for the managed group. Best effort: any failure yields an empty map.
    async fn delays(&self) -> BTreeMap<String, u32> {
        self.probe_delays().await.unwrap_or_else(|e| {
            warn!("delay probe degraded: {e:#}");
            BTreeMap::new()
        })
    }

    async fn probe_delays(&self) -> Result<BTreeMap<String, u32>> {
        let timeout = self.config.probe_timeout_ms.to_string();

        let response = self
            .request(reqwest::Method::GET, &["group", self.config.group.as_str(), "delay"])
            .query(&[
                ("url", self.config.probe_url.as_str()),
                ("timeout", timeout.as_str()),
            ])
            .timeout(self.config.timeout())
            .send()
            .await
            .context("delay probe request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("delay probe: HTTP error: {}", response.status());
        }

        response
            .json()
            .await
            .context("delay probe: failed to parse JSON")
    }
}

/// Removes reserved pseudo-members, preserving order.
pub fn candidates(members: Vec<String>) -> Vec<String> {
    members
        .into_iter()
        .filter(|member| !RESERVED_MEMBERS.contains(&member.as_str()))
        .collect()
}

/// Ensures every candidate has a delay entry, defaulting to 0.
pub fn fill_delays(candidates: &[String], mut delays: BTreeMap<String, u32>) -> BTreeMap<String, u32> {
    for node in candidates {
        delays.entry(node.clone()).or_insert(0);
    }
    delays
}

/// Reads the managed exit-node group and its delays
pub struct ProxyFetcher {
    api: ProxyApi,
}

impl ProxyFetcher {
    pub fn new(api: ProxyApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Fetcher for ProxyFetcher {
    type Output = ProxyInfo;

    fn name(&self) -> &'static str {
        "proxy"
    }

    #[instrument(skip(self), fields(group = %self.api.config.group))]
    async fn fetch(&self) -> SourceResult<ProxyInfo> {
        let (current, candidates) = match self.api.group().await {
            Ok(group) => group,
            Err(e) => {
                warn!("proxy listing failed: {e:#}");
                return SourceResult::failed(format!("{e:#}"));
            }
        };
        trace!("current {current}, {} candidates", candidates.len());

        let delays = fill_delays(&candidates, self.api.delays().await);
        debug!("measured delays: {delays:?}");

        SourceResult::Ok(ProxyInfo {
            current,
            candidates,
            delays,
        })
    }
}
