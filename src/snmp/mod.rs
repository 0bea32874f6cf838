//! Minimal SNMP v2c client
//!
//! Fetchers talk to the router through the [`SnmpConnector`] and
//! [`SnmpSession`] traits. The production implementation is a UDP session
//! ([`session::UdpConnector`]); tests substitute scripted sessions.

pub mod ber;
pub mod session;

use std::fmt;

use async_trait::async_trait;

pub use ber::{Oid, Value, VarBind};
pub use session::{UdpConnector, UdpSession};

/// Errors raised by the SNMP client
#[derive(Debug)]
pub enum SnmpError {
    /// Socket setup or I/O failed
    Io(std::io::Error),

    /// Target could not be resolved to an address
    Resolve(String),

    /// No response after every attempt
    Timeout { attempts: u32 },

    /// Response could not be decoded
    Decode(String),

    /// Agent answered with a non-zero error-status
    Agent { status: i64, index: i64 },

    /// OID string is malformed
    InvalidOid(String),
}

impl fmt::Display for SnmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnmpError::Io(err) => write!(f, "SNMP I/O error: {}", err),
            SnmpError::Resolve(target) => write!(f, "failed to resolve SNMP target {}", target),
            SnmpError::Timeout { attempts } => {
                write!(f, "SNMP request timed out after {} attempts", attempts)
            }
            SnmpError::Decode(msg) => write!(f, "malformed SNMP response: {}", msg),
            SnmpError::Agent { status, index } => {
                write!(f, "SNMP agent error-status {} at index {}", status, index)
            }
            SnmpError::InvalidOid(oid) => write!(f, "invalid OID {}", oid),
        }
    }
}

impl std::error::Error for SnmpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnmpError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SnmpError {
    fn from(err: std::io::Error) -> Self {
        SnmpError::Io(err)
    }
}

/// An open session to one agent. Dropping it closes the socket.
#[async_trait]
pub trait SnmpSession: Send {
    /// Issues one batched GET and returns the varbinds in response order.
    async fn get(&mut self, oids: &[Oid]) -> Result<Vec<VarBind>, SnmpError>;
}

/// Opens sessions to a fixed agent.
#[async_trait]
pub trait SnmpConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SnmpSession>, SnmpError>;
}

/// Parses a list of well-known OID strings.
pub fn oids(list: &[&str]) -> Result<Vec<Oid>, SnmpError> {
    list.iter().map(|oid| oid.parse()).collect()
}
