//! Record type registry: one descriptor per supported record type, mapping
//! raw rdata to a typed value and back. Unsupported types fall back to an
//! opaque byte blob rather than failing the whole packet.
use std::convert::TryFrom;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use byteorder::{BigEndian, ByteOrder};
use dns_derive::DnsEnum;

use crate::error::{DnsError, DnsResult};
use crate::name;
use crate::packet::Packet;

/// Record types the registry has a parse/push/print descriptor for. Anything
/// else still round-trips, just as an opaque [`RData::Unknown`] blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DnsEnum)]
#[repr(u16)]
pub enum KnownType {
    A = 1,
    NS = 2,
    CNAME = 5,
    MX = 15,
    TXT = 16,
    AAAA = 28,
}

/// A record type as it appears on the wire: either one of the known,
/// typed variants, or an opaque numeric code the registry passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RrType(pub u16);

impl RrType {
    pub const A: RrType = RrType(1);
    pub const NS: RrType = RrType(2);
    pub const CNAME: RrType = RrType(5);
    pub const MX: RrType = RrType(15);
    pub const TXT: RrType = RrType(16);
    pub const AAAA: RrType = RrType(28);

    pub fn known(&self) -> Option<KnownType> {
        KnownType::try_from(self.0).ok()
    }
}

impl fmt::Display for RrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known() {
            Some(k) => write!(f, "{}", k),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for RrType {
    type Err = DnsError;

    /// ```
    /// use std::str::FromStr;
    /// use dnslib::rr::RrType;
    ///
    /// assert_eq!(RrType::from_str("MX").unwrap(), RrType::MX);
    /// assert_eq!(RrType::from_str("65399").unwrap(), RrType(65399));
    /// assert!(RrType::from_str("not-a-type").is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(known) = KnownType::from_str(s) {
            return Ok(RrType(known as u16));
        }
        s.parse::<u16>()
            .map(RrType)
            .map_err(|_| DnsError::malformed("unrecognized record type name"))
    }
}

/// `IN` is effectively the only class seen on the wire in practice; modeled
/// the same way as [`RrType`] (closed known set + numeric fallback) so the
/// registry and resolver configuration share one convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DnsEnum)]
#[repr(u16)]
pub enum KnownClass {
    IN = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RrClass(pub u16);

impl RrClass {
    pub const IN: RrClass = RrClass(1);

    pub fn known(&self) -> Option<KnownClass> {
        KnownClass::try_from(self.0).ok()
    }
}

impl fmt::Display for RrClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.known() {
            Some(k) => write!(f, "{}", k),
            None => write!(f, "{}", self.0),
        }
    }
}

impl FromStr for RrClass {
    type Err = DnsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(known) = KnownClass::from_str(s) {
            return Ok(RrClass(known as u16));
        }
        s.parse::<u16>()
            .map(RrClass)
            .map_err(|_| DnsError::malformed("unrecognized record class name"))
    }
}

/// A decoded or to-be-encoded resource record body.
#[derive(Debug, Clone, PartialEq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Mx { preference: u16, exchange: String },
    Ns(String),
    Cname(String),
    Txt(Vec<u8>),
    Unknown(Vec<u8>),
}

/// Decode the rdata of a record whose type/class/length header has already
/// been parsed. `rdata_offset`/`rdata_len` index into `packet`'s own buffer,
/// since NS/CNAME/MX rdata can itself carry compression pointers back into
/// the message.
pub(crate) fn parse(
    rtype: RrType,
    packet: &Packet,
    rdata_offset: usize,
    rdata_len: usize,
) -> DnsResult<RData> {
    let buf = packet.filled();
    if rdata_offset + rdata_len > buf.len() {
        return Err(DnsError::malformed("rdata overruns packet"));
    }
    let raw = &buf[rdata_offset..rdata_offset + rdata_len];

    match rtype.known() {
        Some(KnownType::A) => {
            if raw.len() != 4 {
                return Err(DnsError::malformed("A record rdlength must be 4"));
            }
            Ok(RData::A(Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3])))
        }
        Some(KnownType::AAAA) => {
            if raw.len() != 16 {
                return Err(DnsError::malformed("AAAA record rdlength must be 16"));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(raw);
            Ok(RData::Aaaa(Ipv6Addr::from(octets)))
        }
        Some(KnownType::MX) => {
            if raw.len() < 3 {
                return Err(DnsError::malformed("MX record rdlength must be >= 3"));
            }
            let preference = BigEndian::read_u16(&raw[0..2]);
            let exchange = name::expand(buf, rdata_offset + 2)?;
            Ok(RData::Mx {
                preference,
                exchange,
            })
        }
        Some(KnownType::NS) => Ok(RData::Ns(name::expand(buf, rdata_offset)?)),
        Some(KnownType::CNAME) => Ok(RData::Cname(name::expand(buf, rdata_offset)?)),
        Some(KnownType::TXT) => Ok(RData::Txt(decode_txt(raw)?)),
        None => Ok(RData::Unknown(raw.to_vec())),
    }
}

fn decode_txt(raw: &[u8]) -> DnsResult<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let chunk_len = raw[i] as usize;
        i += 1;
        if i + chunk_len > raw.len() {
            return Err(DnsError::malformed("TXT chunk overruns rdata"));
        }
        out.extend_from_slice(&raw[i..i + chunk_len]);
        i += chunk_len;
    }
    Ok(out)
}

/// Write rdata into `packet`, writing a placeholder rdlength first and
/// backfilling it once the true length is known (names decompress to a
/// variable number of bytes, TXT fragments variably).
pub(crate) fn push(packet: &mut Packet, rdata: &RData) -> DnsResult<()> {
    let rdlength_offset = packet.reserve_u16()?;
    let start = packet.end();

    match rdata {
        RData::A(addr) => packet.append(&addr.octets())?,
        RData::Aaaa(addr) => packet.append(&addr.octets())?,
        RData::Mx {
            preference,
            exchange,
        } => {
            packet.append_u16(*preference)?;
            packet.compress_name(exchange)?;
        }
        RData::Ns(target) | RData::Cname(target) => {
            packet.compress_name(target)?;
        }
        RData::Txt(text) => encode_txt(packet, text)?,
        RData::Unknown(bytes) => packet.append(bytes)?,
    }

    let written = packet.end() - start;
    let rdlength = u16::try_from(written).map_err(|_| DnsError::malformed("rdata too long"))?;
    packet.backfill_u16(rdlength_offset, rdlength);
    Ok(())
}

fn encode_txt(packet: &mut Packet, text: &[u8]) -> DnsResult<()> {
    if text.is_empty() {
        return packet.append(&[0u8]);
    }
    for chunk in text.chunks(255) {
        packet.append(&[chunk.len() as u8])?;
        packet.append(chunk)?;
    }
    Ok(())
}

/// Render rdata the way `print` formats a record for a human reader.
pub(crate) fn print(rdata: &RData) -> String {
    match rdata {
        RData::A(addr) => addr.to_string(),
        RData::Aaaa(addr) => addr.to_string(),
        RData::Mx {
            preference,
            exchange,
        } => format!("{} {}", preference, exchange),
        RData::Ns(name) | RData::Cname(name) => name.clone(),
        RData::Txt(text) => quote_chunks(text),
        RData::Unknown(bytes) => format!("\"{}\"", escape_all(bytes)),
    }
}

fn quote_chunks(text: &[u8]) -> String {
    text.chunks(256)
        .map(|chunk| format!("\"{}\"", escape_printable(chunk)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// TXT's print rule: printable ASCII passes through; quote, backslash, and
/// everything outside the printable range is a `\NNN` decimal escape.
fn escape_printable(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'"' | b'\\' => out.push_str(&format!("\\{:03}", b)),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03}", b)),
        }
    }
    out
}

/// Unknown rdata's print rule: every octet is a `\NNN` decimal escape,
/// unconditionally, with no printable pass-through.
fn escape_all(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for &b in bytes {
        out.push_str(&format!("\\{:03}", b));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_round_trips_through_text() {
        assert_eq!(RrType::from_str("MX").unwrap(), RrType::MX);
        assert_eq!(RrType::MX.to_string(), "MX");
    }

    #[test]
    fn unknown_type_falls_back_to_decimal() {
        let t = RrType::from_str("65399").unwrap();
        assert_eq!(t, RrType(65399));
        assert_eq!(t.to_string(), "65399");
        assert!(t.known().is_none());
    }

    #[test]
    fn txt_chunking_round_trips_a_300_byte_payload() {
        let payload = vec![b'x'; 300];
        let mut packet = Packet::new(1024);
        packet
            .push(
                crate::packet::Section::Answer,
                "example.com.",
                RrType::TXT,
                RrClass::IN,
                60,
                &RData::Txt(payload.clone()),
            )
            .unwrap();

        let mut state = crate::packet::ParseState::new();
        let filter = crate::packet::RrFilter::default();
        let record = packet.next(&mut state, &filter).unwrap().unwrap();
        assert_eq!(record.rdata_len, 302);

        let decoded = parse(RrType::TXT, &packet, record.rdata_offset, record.rdata_len).unwrap();
        assert_eq!(decoded, RData::Txt(payload));
    }

    #[test]
    fn unknown_rdata_escapes_every_octet() {
        let rdata = RData::Unknown(vec![b'a', b'b']);
        assert_eq!(print(&rdata), "\"\\097\\098\"");
    }

    #[test]
    fn txt_rdata_passes_through_printable_but_escapes_quote_and_backslash() {
        let rdata = RData::Txt(vec![b'a', b'"', b'\\', 0x01]);
        assert_eq!(print(&rdata), "\"a\\034\\092\\001\"");
    }
}
