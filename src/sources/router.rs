use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use super::Fetcher;
use crate::snmp::{self, SnmpConnector, Value, VarBind};
use crate::util::format_ticks;
use crate::{RouterInfo, SourceResult};

pub const OID_SYS_NAME: &str = "1.3.6.1.2.1.1.5.0";
pub const OID_CPU_LOAD: &str = "1.3.6.1.2.1.25.3.3.1.2.1";
pub const OID_SYS_UPTIME: &str = "1.3.6.1.2.1.1.3.0";
pub const OID_RAM_USED: &str = "1.3.6.1.2.1.25.2.3.1.6.65536";
pub const OID_RAM_TOTAL: &str = "1.3.6.1.2.1.25.2.3.1.5.65536";

/// Reads identity, load and memory counters from the router
pub struct RouterFetcher {
    connector: Arc<dyn SnmpConnector>,
}

impl RouterFetcher {
    pub fn new(connector: Arc<dyn SnmpConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl Fetcher for RouterFetcher {
    type Output = RouterInfo;

    fn name(&self) -> &'static str {
        "router"
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> SourceResult<RouterInfo> {
        let oids = match snmp::oids(&[
            OID_SYS_NAME,
            OID_CPU_LOAD,
            OID_SYS_UPTIME,
            OID_RAM_USED,
            OID_RAM_TOTAL,
        ]) {
            Ok(oids) => oids,
            Err(e) => return SourceResult::failed(e.to_string()),
        };

        let mut session = match self.connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                warn!("failed to open SNMP session: {e}");
                return SourceResult::failed(e.to_string());
            }
        };

        let varbinds = match session.get(&oids).await {
            Ok(varbinds) => varbinds,
            Err(e) => {
                warn!("router GET failed: {e}");
                return SourceResult::failed(e.to_string());
            }
        };
        drop(session);

        debug!("router returned {} varbinds", varbinds.len());
        SourceResult::Ok(decode_router_info(&varbinds))
    }
}

/// Decodes the five router varbinds, leaving absent fields at their defaults.
pub fn decode_router_info(varbinds: &[VarBind]) -> RouterInfo {
    let mut info = RouterInfo::default();

    let [name, cpu, uptime, ram_used, ram_total, ..] = varbinds else {
        return info;
    };

    if let Some(name) = present(name).and_then(Value::as_text) {
        info.name = name;
    }

    if let Some(cpu) = present(cpu).and_then(Value::as_i64) {
        info.cpu = cpu.to_string();
    }

    if let Some(ticks) = present(uptime).and_then(Value::as_u64) {
        // TimeTicks is an unsigned 32-bit counter
        info.uptime = format_ticks(ticks as u32);
    }

    if let (Some(used), Some(total)) = (
        present(ram_used).and_then(Value::as_u64),
        present(ram_total).and_then(Value::as_u64),
    ) {
        info.ram = format!("{}/{} MB", used / 1024, total / 1024);
    }

    info
}

fn present(varbind: &VarBind) -> Option<&Value> {
    Some(&varbind.value).filter(|value| !value.is_absent())
}
