use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{UdpSocket, lookup_host};
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

use super::ber::{self, Message, Oid, Pdu, PduKind, VarBind};
use super::{SnmpConnector, SnmpError, SnmpSession};
use crate::config::RouterConfig;

const MAX_DATAGRAM: usize = 65_535;

/// Connects v2c sessions to one agent
#[derive(Debug, Clone)]
pub struct UdpConnector {
    target: String,
    community: String,
    timeout: Duration,
    retries: u32,
}

impl UdpConnector {
    pub fn new(
        target: impl Into<String>,
        community: impl Into<String>,
        timeout: Duration,
        retries: u32,
    ) -> Self {
        Self {
            target: target.into(),
            community: community.into(),
            timeout,
            retries,
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(
            config.target(),
            config.community.clone(),
            config.timeout(),
            config.retries,
        )
    }
}

#[async_trait]
impl SnmpConnector for UdpConnector {
    async fn connect(&self) -> Result<Box<dyn SnmpSession>, SnmpError> {
        let session =
            UdpSession::connect(&self.target, &self.community, self.timeout, self.retries).await?;
        Ok(Box::new(session))
    }
}

/// Connected UDP socket plus request bookkeeping
#[derive(Debug)]
pub struct UdpSession {
    socket: UdpSocket,
    community: Vec<u8>,
    timeout: Duration,
    retries: u32,
    next_request_id: i32,
}

impl UdpSession {
    #[instrument(skip(community))]
    pub async fn connect(
        target: &str,
        community: &str,
        timeout: Duration,
        retries: u32,
    ) -> Result<Self, SnmpError> {
        let addr = lookup_host(target)
            .await?
            .next()
            .ok_or_else(|| SnmpError::Resolve(target.to_string()))?;

        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(addr).await?;
        debug!("opened SNMP session to {addr}");

        Ok(Self {
            socket,
            community: community.as_bytes().to_vec(),
            timeout,
            retries,
            next_request_id: initial_request_id(),
        })
    }

    fn take_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    /// Waits for the response matching `request_id`, skipping stale datagrams.
    async fn receive(&self, request_id: i32) -> Result<Pdu, SnmpError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let len = self.socket.recv(&mut buf).await?;
            let message = match ber::decode_message(&buf[..len]) {
                Ok(message) => message,
                Err(SnmpError::Decode(msg)) => {
                    debug!("skipping undecodable {len} byte datagram: {msg}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if message.pdu.kind == PduKind::GetResponse && message.pdu.request_id == request_id {
                return Ok(message.pdu);
            }
            trace!(
                "skipping response with request id {}",
                message.pdu.request_id
            );
        }
    }
}

#[async_trait]
impl SnmpSession for UdpSession {
    async fn get(&mut self, oids: &[Oid]) -> Result<Vec<VarBind>, SnmpError> {
        let request_id = self.take_request_id();
        let request = ber::encode_message(&Message {
            version: ber::VERSION_2C,
            community: self.community.clone(),
            pdu: Pdu::get_request(request_id, oids),
        });

        let attempts = self.retries + 1;
        for attempt in 1..=attempts {
            trace!("GET {} oids, attempt {attempt}/{attempts}", oids.len());
            self.socket.send(&request).await?;

            match timeout(self.timeout, self.receive(request_id)).await {
                Ok(Ok(pdu)) if pdu.error_status != 0 => {
                    return Err(SnmpError::Agent {
                        status: pdu.error_status,
                        index: pdu.error_index,
                    });
                }
                Ok(Ok(pdu)) => return Ok(pdu.varbinds),
                Ok(Err(e)) => return Err(e),
                Err(_) => debug!("attempt {attempt} timed out"),
            }
        }

        Err(SnmpError::Timeout { attempts })
    }
}

fn initial_request_id() -> i32 {
    // any positive start works; spread it so restarts don't reuse ids
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(1);
    (nanos % 1_000_000) as i32 + 1
}
