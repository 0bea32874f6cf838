//! BER encoding of SNMP v2c messages
//!
//! Only the subset needed for `GetRequest`/`GetResponse` exchanges is
//! supported. Lengths use the definite form; the long form is accepted up to
//! four length octets.

use std::fmt;
use std::str::FromStr;

use super::SnmpError;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;
const TAG_GET_REQUEST: u8 = 0xA0;
const TAG_GET_RESPONSE: u8 = 0xA2;

/// SNMP version field value for v2c
pub const VERSION_2C: i64 = 1;

/// Object identifier, e.g. `1.3.6.1.2.1.1.5.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(Vec<u32>);

impl Oid {
    pub fn arcs(&self) -> &[u32] {
        &self.0
    }

    /// Appends one arc, e.g. an interface index.
    pub fn child(&self, arc: u32) -> Oid {
        let mut arcs = self.0.clone();
        arcs.push(arc);
        Oid(arcs)
    }
}

impl FromStr for Oid {
    type Err = SnmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .trim_start_matches('.')
            .split('.')
            .map(|arc| arc.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SnmpError::InvalidOid(s.to_string()))?;

        if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
            return Err(SnmpError::InvalidOid(s.to_string()));
        }

        Ok(Oid(arcs))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arc in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{arc}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    /// True when the agent returned no data for the object.
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::NoSuchObject | Value::NoSuchInstance | Value::EndOfMibView
        )
    }

    /// Any non-negative numeric value, widened to 64 bits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Integer(v) => u64::try_from(*v).ok(),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(u64::from(*v)),
            Value::Counter64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(i64::from(*v)),
            Value::Counter64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub kind: PduKind,
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self {
            kind: PduKind::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids
                .iter()
                .map(|oid| VarBind {
                    oid: oid.clone(),
                    value: Value::Null,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut body = Vec::new();
    write_integer(&mut body, message.version);
    write_tlv(&mut body, TAG_OCTET_STRING, &message.community);
    write_pdu(&mut body, &message.pdu);

    let mut out = Vec::with_capacity(body.len() + 4);
    write_tlv(&mut out, TAG_SEQUENCE, &body);
    out
}

pub fn decode_message(bytes: &[u8]) -> Result<Message, SnmpError> {
    let mut outer = Reader::new(bytes);
    let mut message = outer.expect(TAG_SEQUENCE)?;

    let version = decode_integer(message.expect(TAG_INTEGER)?.rest())?;
    let community = message.expect(TAG_OCTET_STRING)?.rest().to_vec();

    let (tag, content) = message.read_tlv()?;
    let kind = match tag {
        TAG_GET_REQUEST => PduKind::GetRequest,
        TAG_GET_RESPONSE => PduKind::GetResponse,
        other => return Err(decode_error(format!("unsupported PDU type 0x{other:02x}"))),
    };

    let mut pdu = Reader::new(content);
    let request_id = decode_integer(pdu.expect(TAG_INTEGER)?.rest())?;
    let request_id = i32::try_from(request_id)
        .map_err(|_| decode_error(format!("request id {request_id} out of range")))?;
    let error_status = decode_integer(pdu.expect(TAG_INTEGER)?.rest())?;
    let error_index = decode_integer(pdu.expect(TAG_INTEGER)?.rest())?;

    let mut list = pdu.expect(TAG_SEQUENCE)?;
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut varbind = list.expect(TAG_SEQUENCE)?;
        let oid = decode_oid(varbind.expect(TAG_OID)?.rest())?;
        let (tag, content) = varbind.read_tlv()?;
        varbinds.push(VarBind {
            oid,
            value: decode_value(tag, content)?,
        });
    }

    Ok(Message {
        version,
        community,
        pdu: Pdu {
            kind,
            request_id,
            error_status,
            error_index,
            varbinds,
        },
    })
}

fn write_pdu(out: &mut Vec<u8>, pdu: &Pdu) {
    let mut list = Vec::new();
    for varbind in &pdu.varbinds {
        let mut entry = Vec::new();
        write_tlv(&mut entry, TAG_OID, &encode_oid(&varbind.oid));
        write_value(&mut entry, &varbind.value);
        write_tlv(&mut list, TAG_SEQUENCE, &entry);
    }

    let mut body = Vec::new();
    write_integer(&mut body, i64::from(pdu.request_id));
    write_integer(&mut body, pdu.error_status);
    write_integer(&mut body, pdu.error_index);
    write_tlv(&mut body, TAG_SEQUENCE, &list);

    let tag = match pdu.kind {
        PduKind::GetRequest => TAG_GET_REQUEST,
        PduKind::GetResponse => TAG_GET_RESPONSE,
    };
    write_tlv(out, tag, &body);
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(v) => write_integer(out, *v),
        Value::OctetString(bytes) => write_tlv(out, TAG_OCTET_STRING, bytes),
        Value::Null => write_tlv(out, TAG_NULL, &[]),
        Value::ObjectId(oid) => write_tlv(out, TAG_OID, &encode_oid(oid)),
        Value::IpAddress(octets) => write_tlv(out, TAG_IP_ADDRESS, octets),
        Value::Counter32(v) => write_tlv(out, TAG_COUNTER32, &encode_unsigned(u64::from(*v))),
        Value::Gauge32(v) => write_tlv(out, TAG_GAUGE32, &encode_unsigned(u64::from(*v))),
        Value::TimeTicks(v) => write_tlv(out, TAG_TIMETICKS, &encode_unsigned(u64::from(*v))),
        Value::Opaque(bytes) => write_tlv(out, TAG_OPAQUE, bytes),
        Value::Counter64(v) => write_tlv(out, TAG_COUNTER64, &encode_unsigned(*v)),
        Value::NoSuchObject => write_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        Value::NoSuchInstance => write_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        Value::EndOfMibView => write_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
}

fn write_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    write_length(out, content.len());
    out.extend_from_slice(content);
}

fn write_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }

    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn write_integer(out: &mut Vec<u8>, value: i64) {
    let bytes = value.to_be_bytes();
    // drop redundant sign octets, keeping the sign bit intact
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    write_tlv(out, TAG_INTEGER, &bytes[start..]);
}

fn encode_unsigned(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes
        .iter()
        .take_while(|b| **b == 0)
        .count()
        .min(bytes.len() - 1);
    let mut out = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = oid.arcs();
    let mut out = Vec::new();
    let first = arcs.first().copied().unwrap_or(0) * 40 + arcs.get(1).copied().unwrap_or(0);
    write_base128(&mut out, first);
    for arc in arcs.iter().skip(2) {
        write_base128(&mut out, *arc);
    }
    out
}

fn write_base128(out: &mut Vec<u8>, mut value: u32) {
    let mut chunk = [0u8; 5];
    let mut n = 0;
    loop {
        chunk[n] = (value & 0x7F) as u8;
        value >>= 7;
        n += 1;
        if value == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let more = if i > 0 { 0x80 } else { 0 };
        out.push(chunk[i] | more);
    }
}

fn decode_value(tag: u8, content: &[u8]) -> Result<Value, SnmpError> {
    let value = match tag {
        TAG_INTEGER => Value::Integer(decode_integer(content)?),
        TAG_OCTET_STRING => Value::OctetString(content.to_vec()),
        TAG_NULL => Value::Null,
        TAG_OID => Value::ObjectId(decode_oid(content)?),
        TAG_IP_ADDRESS => {
            let octets: [u8; 4] = content
                .try_into()
                .map_err(|_| decode_error("IpAddress must be 4 octets"))?;
            Value::IpAddress(octets)
        }
        TAG_COUNTER32 => Value::Counter32(decode_unsigned32(content)?),
        TAG_GAUGE32 => Value::Gauge32(decode_unsigned32(content)?),
        TAG_TIMETICKS => Value::TimeTicks(decode_unsigned32(content)?),
        TAG_OPAQUE => Value::Opaque(content.to_vec()),
        TAG_COUNTER64 => Value::Counter64(decode_unsigned(content)?),
        TAG_NO_SUCH_OBJECT => Value::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => Value::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => Value::EndOfMibView,
        other => return Err(decode_error(format!("unsupported value type 0x{other:02x}"))),
    };
    Ok(value)
}

fn decode_integer(content: &[u8]) -> Result<i64, SnmpError> {
    if content.is_empty() || content.len() > 8 {
        return Err(decode_error(format!(
            "invalid INTEGER length {}",
            content.len()
        )));
    }

    let negative = content[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for byte in content {
        value = (value << 8) | i64::from(*byte);
    }
    Ok(value)
}

fn decode_unsigned(content: &[u8]) -> Result<u64, SnmpError> {
    let digits = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        _ => content,
    };
    if digits.is_empty() || digits.len() > 8 {
        return Err(decode_error(format!(
            "invalid unsigned length {}",
            content.len()
        )));
    }

    Ok(digits
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte)))
}

fn decode_unsigned32(content: &[u8]) -> Result<u32, SnmpError> {
    let value = decode_unsigned(content)?;
    u32::try_from(value).map_err(|_| decode_error(format!("{value} exceeds 32 bits")))
}

fn decode_oid(content: &[u8]) -> Result<Oid, SnmpError> {
    let mut values = Vec::new();
    let mut current: u32 = 0;
    for (i, byte) in content.iter().enumerate() {
        if current > (u32::MAX >> 7) {
            return Err(decode_error("OID arc overflow"));
        }
        current = (current << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            values.push(current);
            current = 0;
        } else if i == content.len() - 1 {
            return Err(decode_error("truncated OID"));
        }
    }

    let Some((&first, rest)) = values.split_first() else {
        return Err(decode_error("empty OID"));
    };

    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };

    let mut arcs = Vec::with_capacity(values.len() + 1);
    arcs.push(a);
    arcs.push(b);
    arcs.extend_from_slice(rest);
    Ok(Oid(arcs))
}

fn decode_error(msg: impl Into<String>) -> SnmpError {
    SnmpError::Decode(msg.into())
}

/// Cursor over a sequence of TLVs.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn byte(&mut self) -> Result<u8, SnmpError> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| decode_error("unexpected end of message"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8]), SnmpError> {
        let tag = self.byte()?;
        let first = self.byte()?;

        let len = if first & 0x80 == 0 {
            usize::from(first)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 || count > 4 {
                return Err(decode_error(format!("unsupported length form 0x{first:02x}")));
            }
            let mut len = 0usize;
            for _ in 0..count {
                len = (len << 8) | usize::from(self.byte()?);
            }
            len
        };

        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| decode_error("length exceeds message"))?;
        let content = &self.buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, tag: u8) -> Result<Reader<'a>, SnmpError> {
        let (found, content) = self.read_tlv()?;
        if found != tag {
            return Err(decode_error(format!(
                "expected tag 0x{tag:02x}, found 0x{found:02x}"
            )));
        }
        Ok(Reader::new(content))
    }
}
