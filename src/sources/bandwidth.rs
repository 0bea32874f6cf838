use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::Fetcher;
use crate::snmp::{Oid, SnmpConnector, SnmpError, SnmpSession, Value};
use crate::util::round_half_up;
use crate::{BandwidthSample, SourceResult};

/// ifHCInOctets, indexed by ifIndex
pub const OID_IF_HC_IN_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.6";
/// ifHCOutOctets, indexed by ifIndex
pub const OID_IF_HC_OUT_OCTETS: &str = "1.3.6.1.2.1.31.1.1.1.10";

const BITS_PER_MEGABIT: f64 = 1_048_576.0;

/// Samples one interface's octet counters twice and derives throughput
pub struct BandwidthFetcher {
    connector: Arc<dyn SnmpConnector>,
    interface_index: u32,
    interval: Duration,
}

/// One reading of both counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    pub rx_octets: u64,
    pub tx_octets: u64,
}

impl BandwidthFetcher {
    pub fn new(connector: Arc<dyn SnmpConnector>, interface_index: u32, interval: Duration) -> Self {
        Self {
            connector,
            interface_index,
            interval,
        }
    }

    fn counter_oids(&self) -> Result<[Oid; 2], SnmpError> {
        let rx: Oid = OID_IF_HC_IN_OCTETS.parse()?;
        let tx: Oid = OID_IF_HC_OUT_OCTETS.parse()?;
        Ok([rx.child(self.interface_index), tx.child(self.interface_index)])
    }

    async fn measure(&self) -> Result<BandwidthSample, String> {
        let oids = self.counter_oids().map_err(|e| e.to_string())?;
        let mut session = self.connector.connect().await.map_err(|e| e.to_string())?;

        let first = sample(session.as_mut(), &oids).await?;
        tokio::time::sleep(self.interval).await;
        let second = sample(session.as_mut(), &oids).await?;
        drop(session);

        debug!("counter samples {first:?} -> {second:?}");
        Ok(throughput(first, second, self.interval))
    }
}

#[async_trait]
impl Fetcher for BandwidthFetcher {
    type Output = BandwidthSample;

    fn name(&self) -> &'static str {
        "bandwidth"
    }

    #[instrument(skip(self), fields(if_index = self.interface_index))]
    async fn fetch(&self) -> SourceResult<BandwidthSample> {
        match self.measure().await {
            Ok(rates) => SourceResult::Ok(rates),
            Err(e) => {
                warn!("bandwidth sampling failed: {e}");
                SourceResult::Failed(e)
            }
        }
    }
}

async fn sample(session: &mut dyn SnmpSession, oids: &[Oid; 2]) -> Result<CounterSample, String> {
    let varbinds = session.get(oids).await.map_err(|e| e.to_string())?;

    let [rx, tx, ..] = varbinds.as_slice() else {
        return Err("Invalid SNMP response".to_string());
    };

    let counter = |value: &Value| {
        value
            .as_u64()
            .ok_or_else(|| format!("unexpected counter value {value:?}"))
    };

    Ok(CounterSample {
        rx_octets: counter(&rx.value)?,
        tx_octets: counter(&tx.value)?,
    })
}

/// Converts two counter readings taken `elapsed` apart into Mbps.
///
/// Deltas wrap, matching 64-bit counter rollover.
pub fn throughput(first: CounterSample, second: CounterSample, elapsed: Duration) -> BandwidthSample {
    let seconds = elapsed.as_secs_f64().max(f64::EPSILON);
    let rate = |before: u64, after: u64| {
        let bits = after.wrapping_sub(before) as f64 * 8.0;
        round_half_up(bits / BITS_PER_MEGABIT / seconds, 2)
    };

    BandwidthSample {
        rx_mbps: rate(first.rx_octets, second.rx_octets),
        tx_mbps: rate(first.tx_octets, second.tx_octets),
    }
}
