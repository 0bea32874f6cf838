//! Fake upstreams for integration tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use homedash::config::{AggregatorConfig, Config, HypervisorConfig, ProxyConfig, RouterConfig};
use homedash::snmp::ber::{self, Message, Pdu, PduKind};
use homedash::snmp::{Oid, Value, VarBind};
use homedash::sources::bandwidth::{OID_IF_HC_IN_OCTETS, OID_IF_HC_OUT_OCTETS};
use homedash::sources::router::{
    OID_CPU_LOAD, OID_RAM_TOTAL, OID_RAM_USED, OID_SYS_NAME, OID_SYS_UPTIME,
};
use tokio::net::UdpSocket;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const IF_INDEX: u32 = 12;
pub const RX_STEP: u64 = 262_144;
pub const TX_STEP: u64 = 131_072;

/// SNMP v2c agent on a local UDP port
///
/// Interface counters advance by a fixed step on every read.
pub struct FakeAgent {
    pub addr: SocketAddr,
    pub requests: Arc<AtomicUsize>,
}

impl FakeAgent {
    pub async fn start() -> Self {
        Self::spawn(true).await
    }

    /// Agent that reads requests but never answers.
    pub async fn silent() -> Self {
        Self::spawn(false).await
    }

    async fn spawn(respond: bool) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));
        let seen = requests.clone();

        let rx_oid: Oid = OID_IF_HC_IN_OCTETS.parse::<Oid>().unwrap().child(IF_INDEX);
        let tx_oid: Oid = OID_IF_HC_OUT_OCTETS.parse::<Oid>().unwrap().child(IF_INDEX);

        tokio::spawn(async move {
            let mut counters: HashMap<Oid, u64> = HashMap::new();
            let mut buf = vec![0u8; 2048];
            loop {
                let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                seen.fetch_add(1, Ordering::SeqCst);
                if !respond {
                    continue;
                }

                let request = ber::decode_message(&buf[..len]).unwrap();
                let varbinds = request
                    .pdu
                    .varbinds
                    .iter()
                    .map(|vb| {
                        let value = if vb.oid == rx_oid || vb.oid == tx_oid {
                            let step = if vb.oid == rx_oid { RX_STEP } else { TX_STEP };
                            let counter = counters.entry(vb.oid.clone()).or_insert(1_000_000);
                            *counter += step;
                            Value::Counter64(*counter)
                        } else {
                            router_value(&vb.oid.to_string())
                        };
                        VarBind {
                            oid: vb.oid.clone(),
                            value,
                        }
                    })
                    .collect();

                let response = ber::encode_message(&Message {
                    version: request.version,
                    community: request.community,
                    pdu: Pdu {
                        kind: PduKind::GetResponse,
                        request_id: request.pdu.request_id,
                        error_status: 0,
                        error_index: 0,
                        varbinds,
                    },
                });
                let _ = socket.send_to(&response, peer).await;
            }
        });

        Self { addr, requests }
    }
}

fn router_value(oid: &str) -> Value {
    match oid {
        OID_SYS_NAME => Value::OctetString(b"edge-router".to_vec()),
        OID_CPU_LOAD => Value::Integer(12),
        OID_SYS_UPTIME => Value::TimeTicks(8_640_000 + 366_000),
        OID_RAM_USED => Value::Integer(204_800),
        OID_RAM_TOTAL => Value::Integer(1_048_576),
        _ => Value::NoSuchObject,
    }
}

pub async fn mount_hypervisor(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api2/json/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"node": "pve", "uptime": 183_600, "status": "online"}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api2/json/cluster/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [
                {"name": "windows", "type": "qemu", "status": "stopped"},
                {"name": "adguard", "type": "lxc", "status": "running"}
            ]
        })))
        .mount(server)
        .await;
}

pub fn proxy_listing(current: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "proxies": {
            "ExitNode": {
                "type": "Selector",
                "now": current,
                "all": ["DIRECT", "WG-Solid-SG", "WG-JP", "REJECT"]
            }
        }
    }))
}

pub async fn mount_proxy(server: &MockServer, current: &str) {
    Mock::given(method("GET"))
        .and(path("/proxies"))
        .respond_with(proxy_listing(current))
        .mount(server)
        .await;

    mount_delays(server).await;
}

pub async fn mount_delays(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/group/ExitNode/delay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "WG-Solid-SG": 35,
            "WG-JP": 80
        })))
        .mount(server)
        .await;
}

pub fn test_config(hypervisor: &MockServer, proxy: &MockServer, agent: SocketAddr) -> Config {
    Config {
        hypervisor: HypervisorConfig {
            endpoint: hypervisor.uri(),
            user: "root@pam".to_string(),
            token_name: "dash".to_string(),
            token_value: "secret".to_string(),
            timeout_secs: 2,
        },
        router: RouterConfig {
            ip: agent.ip().to_string(),
            port: agent.port(),
            community: "public".to_string(),
            interface_index: IF_INDEX,
            timeout_secs: 1,
            retries: 0,
            sample_interval_ms: 200,
        },
        proxy: ProxyConfig {
            endpoint: proxy.uri(),
            ..ProxyConfig::default()
        },
        aggregator: AggregatorConfig::default(),
        discord: None,
    }
}
