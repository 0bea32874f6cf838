//! Aggregator - concurrent fan-out over all sources with one global deadline
//!
//! ## Flow
//!
//! ```text
//!            ┌─▶ hypervisor task ─┐
//! aggregate ─┼─▶ router task     ─┼─▶ oneshot per source ─▶ FuturesUnordered ─▶ Snapshot
//!            ├─▶ proxy task      ─┤                               ▲
//!            └─▶ bandwidth task  ─┘                    deadline ──┘ (DeadlineExceeded)
//! ```
//!
//! Results are accepted in arrival order. The round ends as soon as every
//! source has reported; if the deadline fires first, the round is abandoned and
//! nothing gathered so far is returned. Per-source failures never end a round.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::FixedOffset;
use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::config::{AggregatorConfig, Config};
use crate::snmp::{SnmpConnector, UdpConnector};
use crate::sources::proxy::ProxyApi;
use crate::sources::{BandwidthFetcher, Fetcher, HypervisorFetcher, ProxyFetcher, RouterFetcher};
use crate::util::{fixed_offset, format_clock, now_at};
use crate::{BandwidthSample, HypervisorInfo, ProxyInfo, RouterInfo, Snapshot, SourceResult};

/// Errors that end an aggregation round without a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// Deadline elapsed before every source reported
    DeadlineExceeded {
        deadline: Duration,
        pending: Vec<&'static str>,
    },

    /// Caller cancelled the round
    Cancelled,
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateError::DeadlineExceeded { deadline, pending } => write!(
                f,
                "timeout fetching dashboard data after {}s (waiting on {})",
                deadline.as_secs_f32(),
                pending.join(", ")
            ),
            AggregateError::Cancelled => write!(f, "dashboard aggregation cancelled"),
        }
    }
}

impl std::error::Error for AggregateError {}

/// The set of fetchers one aggregator drives
pub struct Sources {
    pub hypervisor: Arc<dyn Fetcher<Output = HypervisorInfo>>,
    pub router: Arc<dyn Fetcher<Output = RouterInfo>>,
    pub proxy: Arc<dyn Fetcher<Output = ProxyInfo>>,
    pub bandwidth: Arc<dyn Fetcher<Output = BandwidthSample>>,
}

impl Sources {
    /// Production fetchers talking to the configured upstreams.
    pub fn from_config(config: &Config) -> Result<Self> {
        let connector: Arc<dyn SnmpConnector> = Arc::new(UdpConnector::from_config(&config.router));

        Ok(Self {
            hypervisor: Arc::new(HypervisorFetcher::new(config.hypervisor.clone())?),
            router: Arc::new(RouterFetcher::new(connector.clone())),
            proxy: Arc::new(ProxyFetcher::new(ProxyApi::new(config.proxy.clone())?)),
            bandwidth: Arc::new(BandwidthFetcher::new(
                connector,
                config.router.interface_index,
                config.router.sample_interval(),
            )),
        })
    }
}

/// One source's result as it comes off its channel
enum Arrival {
    Hypervisor(SourceResult<HypervisorInfo>),
    Router(SourceResult<RouterInfo>),
    Proxy(SourceResult<ProxyInfo>),
    Bandwidth(SourceResult<BandwidthSample>),
}

#[derive(Default)]
struct Slots {
    hypervisor: Option<SourceResult<HypervisorInfo>>,
    router: Option<SourceResult<RouterInfo>>,
    proxy: Option<SourceResult<ProxyInfo>>,
    bandwidth: Option<SourceResult<BandwidthSample>>,
}

impl Slots {
    fn record(&mut self, arrival: Arrival) {
        let (name, ok) = match arrival {
            Arrival::Hypervisor(result) => ("hypervisor", self.hypervisor.insert(result).is_ok()),
            Arrival::Router(result) => ("router", self.router.insert(result).is_ok()),
            Arrival::Proxy(result) => ("proxy", self.proxy.insert(result).is_ok()),
            Arrival::Bandwidth(result) => ("bandwidth", self.bandwidth.insert(result).is_ok()),
        };
        debug!(source = name, ok, "source reported");
    }

    fn pending(&self) -> Vec<&'static str> {
        [
            ("hypervisor", self.hypervisor.is_none()),
            ("router", self.router.is_none()),
            ("proxy", self.proxy.is_none()),
            ("bandwidth", self.bandwidth.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, pending)| pending.then_some(name))
        .collect()
    }

    fn into_snapshot(self, offset: FixedOffset) -> Snapshot {
        fn missing<T>() -> SourceResult<T> {
            SourceResult::failed("no result")
        }

        let captured_at = now_at(offset);

        Snapshot {
            hypervisor: self.hypervisor.unwrap_or_else(missing),
            router: self.router.unwrap_or_else(missing),
            proxy: self.proxy.unwrap_or_else(missing),
            bandwidth: self.bandwidth.unwrap_or_else(missing),
            timestamp: format_clock(&captured_at),
            captured_at,
        }
    }
}

/// Runs all sources concurrently and merges them into a [`Snapshot`]
pub struct Aggregator {
    sources: Sources,
    deadline: Duration,
    offset: FixedOffset,
}

impl Aggregator {
    pub fn new(sources: Sources, config: &AggregatorConfig) -> Self {
        Self {
            sources,
            deadline: config.deadline(),
            offset: fixed_offset(config.utc_offset_hours),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Sources::from_config(config)?, &config.aggregator))
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs one aggregation round.
    ///
    /// Fetchers still in flight when the round ends are cancelled through a child
    /// of `parent`; the call does not wait for them to wind down.
    #[instrument(skip_all, fields(deadline = ?self.deadline))]
    pub async fn aggregate(&self, parent: &CancellationToken) -> Result<Snapshot, AggregateError> {
        let round = parent.child_token();
        let _cancel_on_exit = round.clone().drop_guard();

        let mut pending: FuturesUnordered<BoxFuture<'static, Arrival>> = FuturesUnordered::new();
        pending.push(spawn_source(&self.sources.hypervisor, &round, Arrival::Hypervisor));
        pending.push(spawn_source(&self.sources.router, &round, Arrival::Router));
        pending.push(spawn_source(&self.sources.proxy, &round, Arrival::Proxy));
        pending.push(spawn_source(&self.sources.bandwidth, &round, Arrival::Bandwidth));

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        let mut slots = Slots::default();
        while !pending.is_empty() {
            tokio::select! {
                biased;

                _ = parent.cancelled() => {
                    debug!("aggregation cancelled by caller");
                    return Err(AggregateError::Cancelled);
                }
                _ = &mut deadline => {
                    let pending = slots.pending();
                    warn!("deadline exceeded, still waiting on {pending:?}");
                    return Err(AggregateError::DeadlineExceeded {
                        deadline: self.deadline,
                        pending,
                    });
                }
                Some(arrival) = pending.next() => {
                    slots.record(arrival);
                    trace!("{} sources pending", pending.len());
                }
            }
        }

        // the last arrival may be a slot resolved by the cancellation itself
        if parent.is_cancelled() {
            return Err(AggregateError::Cancelled);
        }

        let snapshot = slots.into_snapshot(self.offset);
        debug!(?snapshot, "assembled dashboard snapshot");
        Ok(snapshot)
    }
}

/// Spawns one fetcher as its own task and returns the receiving end of its slot.
///
/// The task resolves its slot exactly once: with the fetch result, or with a
/// failure when the round is cancelled first. A task that dies without sending
/// surfaces as a failure too.
fn spawn_source<T: Send + 'static>(
    fetcher: &Arc<dyn Fetcher<Output = T>>,
    round: &CancellationToken,
    wrap: fn(SourceResult<T>) -> Arrival,
) -> BoxFuture<'static, Arrival> {
    let (tx, rx) = oneshot::channel();
    let fetcher = fetcher.clone();
    let cancel = round.clone();

    tokio::spawn(async move {
        let name = fetcher.name();
        let result = tokio::select! {
            result = fetcher.fetch() => result,
            _ = cancel.cancelled() => {
                debug!("{name} cancelled before reporting");
                SourceResult::failed("cancelled")
            }
        };

        if tx.send(result).is_err() {
            trace!("{name} reported after the round ended");
        }
    });

    async move {
        let result = rx
            .await
            .unwrap_or_else(|_| SourceResult::failed("fetcher terminated unexpectedly"));
        wrap(result)
    }
    .boxed()
}
