//! DNS wire format encoding and decoding (RFC 1035).
//!
//! Only the pieces the discovery pipeline needs are implemented: building a
//! single-question query, walking the answer section of a response, and
//! decompressing domain names. Record data is exposed as byte ranges into the
//! original message so NAPTR and SRV rdata can be decoded against the full
//! message (compression pointers may reference any earlier offset).

use std::net::Ipv4Addr;
use std::ops::Range;

use thiserror::Error;

/// Largest response message we accept from the transport.
pub const MAX_ANSWER_BYTES: usize = 4096;

/// IN class code.
pub const CLASS_IN: u16 = 1;

const HEADER_LEN: usize = 12;
const FLAG_RD: u16 = 0x0100;
const MAX_COMPRESSION_JUMPS: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("domain name label exceeds 63 bytes")]
    LabelTooLong,
    #[error("compression pointer loop")]
    PointerLoop,
    #[error("record data extends beyond message")]
    BadRdataLength,
}

/// Query types used by the discovery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 address record
    A = 1,
    /// Service locator record (RFC 2782)
    Srv = 33,
    /// Naming authority pointer record (RFC 2915)
    Naptr = 35,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Srv => write!(f, "SRV"),
            RecordType::Naptr => write!(f, "NAPTR"),
        }
    }
}

/// The 12-byte DNS message header.
#[derive(Debug, Clone, Copy, Default)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    pub fn parse(msg: &[u8]) -> Result<Self, WireError> {
        if msg.len() < HEADER_LEN {
            return Err(WireError::Truncated);
        }
        Ok(Self {
            id: u16::from_be_bytes([msg[0], msg[1]]),
            flags: u16::from_be_bytes([msg[2], msg[3]]),
            qdcount: u16::from_be_bytes([msg[4], msg[5]]),
            ancount: u16::from_be_bytes([msg[6], msg[7]]),
            nscount: u16::from_be_bytes([msg[8], msg[9]]),
            arcount: u16::from_be_bytes([msg[10], msg[11]]),
        })
    }

    pub fn pack(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.flags.to_be_bytes());
        buf.extend_from_slice(&self.qdcount.to_be_bytes());
        buf.extend_from_slice(&self.ancount.to_be_bytes());
        buf.extend_from_slice(&self.nscount.to_be_bytes());
        buf.extend_from_slice(&self.arcount.to_be_bytes());
    }

    /// Response code from the low four flag bits (0 = NOERROR).
    pub fn rcode(&self) -> u8 {
        (self.flags & 0x000F) as u8
    }

    pub fn is_response(&self) -> bool {
        self.flags & 0x8000 != 0
    }
}

/// One answer resource record, with its rdata as a range into the message.
#[derive(Debug, Clone)]
pub struct Answer {
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Range<usize>,
}

/// A parsed response: header plus the answer section.
///
/// Authority and additional sections are not walked; nothing in the
/// discovery pipeline consumes them.
#[derive(Debug)]
pub struct Response {
    pub header: Header,
    pub answers: Vec<Answer>,
}

impl Response {
    pub fn parse(msg: &[u8]) -> Result<Self, WireError> {
        let header = Header::parse(msg)?;
        let mut offset = HEADER_LEN;

        for _ in 0..header.qdcount {
            let (_, consumed) = unpack_domain_name(msg, offset)?;
            offset += consumed + 4; // qtype + qclass
            if offset > msg.len() {
                return Err(WireError::Truncated);
            }
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let (_, consumed) = unpack_domain_name(msg, offset)?;
            offset += consumed;
            if offset + 10 > msg.len() {
                return Err(WireError::Truncated);
            }
            let rtype = u16::from_be_bytes([msg[offset], msg[offset + 1]]);
            let class = u16::from_be_bytes([msg[offset + 2], msg[offset + 3]]);
            let ttl = u32::from_be_bytes([
                msg[offset + 4],
                msg[offset + 5],
                msg[offset + 6],
                msg[offset + 7],
            ]);
            let rdlength = u16::from_be_bytes([msg[offset + 8], msg[offset + 9]]) as usize;
            offset += 10;
            if offset + rdlength > msg.len() {
                return Err(WireError::BadRdataLength);
            }
            answers.push(Answer {
                rtype,
                class,
                ttl,
                rdata: offset..offset + rdlength,
            });
            offset += rdlength;
        }

        Ok(Self { header, answers })
    }
}

/// Builds a single-question query with recursion desired.
pub fn encode_query(id: u16, name: &str, rtype: RecordType) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(HEADER_LEN + name.len() + 6);
    Header {
        id,
        flags: FLAG_RD,
        qdcount: 1,
        ..Default::default()
    }
    .pack(&mut buf);
    pack_domain_name(&mut buf, name)?;
    buf.extend_from_slice(&(rtype as u16).to_be_bytes());
    buf.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buf)
}

/// Encodes a domain name in label format, no compression.
pub fn pack_domain_name(buf: &mut Vec<u8>, name: &str) -> Result<(), WireError> {
    if name != "." {
        for label in name.split('.').filter(|l| !l.is_empty()) {
            if label.len() > 63 {
                return Err(WireError::LabelTooLong);
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);
    Ok(())
}

/// Decompresses a domain name starting at `offset`.
///
/// Returns the name and the number of bytes the name occupies at the call
/// site (up to and including the terminator, or the two pointer bytes when
/// the name is continued elsewhere). The root name decodes as `"."`, which is
/// what the NAPTR replacement comparison relies on.
pub fn unpack_domain_name(msg: &[u8], offset: usize) -> Result<(String, usize), WireError> {
    let mut parts: Vec<String> = Vec::new();
    let mut pos = offset;
    let mut consumed = None;
    let mut jumps = 0;

    loop {
        let len = *msg.get(pos).ok_or(WireError::Truncated)? as usize;

        if len & 0xC0 == 0xC0 {
            let low = *msg.get(pos + 1).ok_or(WireError::Truncated)? as usize;
            if consumed.is_none() {
                consumed = Some(pos + 2 - offset);
            }
            jumps += 1;
            if jumps > MAX_COMPRESSION_JUMPS {
                return Err(WireError::PointerLoop);
            }
            pos = ((len & 0x3F) << 8) | low;
            continue;
        }

        if len > 63 {
            return Err(WireError::LabelTooLong);
        }

        if len == 0 {
            pos += 1;
            break;
        }

        let label = msg
            .get(pos + 1..pos + 1 + len)
            .ok_or(WireError::Truncated)?;
        parts.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;
    }

    let consumed = consumed.unwrap_or(pos - offset);
    let name = if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join(".")
    };

    Ok((name, consumed))
}

/// Reads an A record's address out of its rdata range.
pub fn a_rdata(msg: &[u8], rdata: &Range<usize>) -> Option<Ipv4Addr> {
    let bytes = msg.get(rdata.clone())?;
    if bytes.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
}

/// Decompresses the target host name of an SRV record.
///
/// The target starts six bytes into the rdata, after priority, weight and
/// port.
pub fn srv_target(msg: &[u8], rdata: &Range<usize>) -> Result<String, WireError> {
    if rdata.len() < 7 {
        return Err(WireError::Truncated);
    }
    let (target, _) = unpack_domain_name(msg, rdata.start + 6)?;
    Ok(target)
}
