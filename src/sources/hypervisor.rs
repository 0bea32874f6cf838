use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, trace, warn};

use super::Fetcher;
use crate::config::HypervisorConfig;
use crate::util::format_node_uptime;
use crate::{HypervisorInfo, SourceResult, Workload, WorkloadKind};

#[derive(Debug, Deserialize)]
struct ApiList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    node: String,
    #[serde(default)]
    uptime: u64,
}

#[derive(Debug, Deserialize)]
struct ResourceEntry {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    status: String,
}

/// Reads node and guest inventory from the hypervisor API
pub struct HypervisorFetcher {
    config: HypervisorConfig,
    client: Client,
}

impl HypervisorFetcher {
    pub fn new(config: HypervisorConfig) -> Result<Self> {
        // the hypervisor serves a certificate from an internal CA
        let client = Client::builder()
            .timeout(config.timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build hypervisor HTTP client")?;

        Ok(Self { config, client })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.config.api_url(), path);
        trace!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;

        if !response.status().is_success() {
            anyhow::bail!("GET {path}: HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("GET {path}: failed to read response body"))?;

        serde_json::from_str(&body).with_context(|| format!("GET {path}: failed to parse JSON"))
    }

    async fn primary_node(&self) -> Result<NodeEntry> {
        let nodes: ApiList<NodeEntry> = self.get("/nodes").await?;
        nodes
            .data
            .into_iter()
            .next()
            .context("hypervisor reported no nodes")
    }

    async fn workloads(&self) -> Result<Vec<Workload>> {
        let resources: ApiList<ResourceEntry> = self.get("/cluster/resources?type=vm").await?;

        let mut workloads: Vec<Workload> = resources
            .data
            .into_iter()
            .map(|entry| Workload {
                name: entry.name,
                kind: WorkloadKind::from_resource_type(&entry.kind),
                running: entry.status == "running",
            })
            .collect();
        workloads.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(workloads)
    }
}

#[async_trait]
impl Fetcher for HypervisorFetcher {
    type Output = HypervisorInfo;

    fn name(&self) -> &'static str {
        "hypervisor"
    }

    #[instrument(skip(self), fields(endpoint = %self.config.endpoint))]
    async fn fetch(&self) -> SourceResult<HypervisorInfo> {
        let node = match self.primary_node().await {
            Ok(node) => node,
            Err(e) => {
                warn!("node listing failed: {e:#}");
                return SourceResult::failed(format!("{e:#}"));
            }
        };

        let mut info = HypervisorInfo {
            uptime: format_node_uptime(node.uptime),
            uptime_secs: node.uptime,
            node: node.node,
            workloads: Vec::new(),
            workload_error: None,
        };

        match self.workloads().await {
            Ok(workloads) => {
                debug!("listed {} workloads on {}", workloads.len(), info.node);
                info.workloads = workloads;
            }
            Err(e) => {
                warn!("workload listing failed: {e:#}");
                info.workload_error = Some(format!("{e:#}"));
            }
        }

        SourceResult::Ok(info)
    }
}
