pub mod actors;
pub mod aggregator;
pub mod config;
pub mod control;
pub mod discord;
pub mod render;
pub mod snmp;
pub mod sources;
pub mod util;

use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Outcome of a single source for one aggregation round.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum SourceResult<T> {
    Ok(T),
    Failed(String),
}

impl<T> SourceResult<T> {
    pub fn failed(reason: impl Into<String>) -> Self {
        SourceResult::Failed(reason.into())
    }

    /// Converts a fallible computation, keeping the full error chain as the reason.
    pub fn from_result<E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => SourceResult::Ok(value),
            Err(e) => SourceResult::Failed(format!("{e:#}")),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceResult::Ok(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            SourceResult::Ok(value) => Some(value),
            SourceResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            SourceResult::Ok(_) => None,
            SourceResult::Failed(reason) => Some(reason),
        }
    }
}

/// Merged result of one aggregation round.
///
/// A snapshot is always renderable: each section carries its own outcome, so a
/// failed source only degrades its own section.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub hypervisor: SourceResult<HypervisorInfo>,
    pub router: SourceResult<RouterInfo>,
    pub proxy: SourceResult<ProxyInfo>,
    pub bandwidth: SourceResult<BandwidthSample>,

    /// When the last result came in
    pub captured_at: DateTime<FixedOffset>,

    /// `captured_at` as `HH:MM:SS`
    pub timestamp: String,
}

impl Snapshot {
    /// Number of sources every snapshot reports on
    pub const SOURCE_COUNT: usize = 4;

    /// Names and reasons of every failed source, in display order.
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        [
            ("hypervisor", self.hypervisor.failure()),
            ("router", self.router.failure()),
            ("proxy", self.proxy.failure()),
            ("bandwidth", self.bandwidth.failure()),
        ]
        .into_iter()
        .filter_map(|(name, reason)| reason.map(|reason| (name, reason)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypervisorInfo {
    pub node: String,
    pub uptime_secs: u64,

    /// Uptime as `<d>d <HH>h`
    pub uptime: String,

    /// Guest workloads, sorted by name
    pub workloads: Vec<Workload>,

    /// Set when the node was listed but the workload listing failed
    pub workload_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub name: String,
    pub kind: WorkloadKind,
    pub running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Vm,
    Container,
}

impl WorkloadKind {
    /// Maps the hypervisor's resource type (`qemu`, `lxc`).
    pub fn from_resource_type(kind: &str) -> Self {
        if kind == "qemu" {
            WorkloadKind::Vm
        } else {
            WorkloadKind::Container
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterInfo {
    pub name: String,
    pub cpu: String,
    pub ram: String,
    pub uptime: String,
}

impl Default for RouterInfo {
    fn default() -> Self {
        Self {
            name: "N/A".to_string(),
            cpu: "0".to_string(),
            ram: "N/A".to_string(),
            uptime: "N/A".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyInfo {
    /// Currently selected exit node
    pub current: String,

    /// Selectable exit nodes, reserved pseudo-nodes removed
    pub candidates: Vec<String>,

    /// Round-trip delay per node in ms, 0 when unmeasured
    pub delays: BTreeMap<String, u32>,
}

impl ProxyInfo {
    pub fn delay_of(&self, node: &str) -> u32 {
        self.delays.get(node).copied().unwrap_or(0)
    }

    pub fn is_current(&self, node: &str) -> bool {
        self.current == node
    }
}

/// Throughput of the monitored interface in Mbps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandwidthSample {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
}
