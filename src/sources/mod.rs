//! Source fetchers
//!
//! Each fetcher wraps exactly one upstream system and turns a round trip into a
//! [`SourceResult`]. Fetchers never fail out-of-band: every error, including
//! partial decode problems, is folded into the returned value.
//!
//! ```text
//! Aggregator ──spawn──▶ HypervisorFetcher ──HTTPS──▶ hypervisor API
//!            ├─spawn──▶ RouterFetcher     ──SNMP───▶ router agent
//!            ├─spawn──▶ BandwidthFetcher  ──SNMP×2─▶ router agent
//!            └─spawn──▶ ProxyFetcher      ──HTTP───▶ proxy controller
//! ```

pub mod bandwidth;
pub mod hypervisor;
pub mod proxy;
pub mod router;

use async_trait::async_trait;

use crate::SourceResult;

pub use bandwidth::BandwidthFetcher;
pub use hypervisor::HypervisorFetcher;
pub use proxy::ProxyFetcher;
pub use router::RouterFetcher;

/// A single monitoring source
///
/// Implementations own any network session they open and release it before
/// returning. Cancellation is handled by the caller dropping the future.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> SourceResult<Self::Output>;
}
