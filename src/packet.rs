//! Fixed-capacity, append-only message buffer: header plus four sections,
//! built through [`Packet::push`] and read back through [`Packet::next`].
//!
//! A small ring of up to 16 prior name offsets drives compression; it lives
//! only for the packet's construction lifetime and is never itself
//! serialized.
use byteorder::{BigEndian, ByteOrder};
use log::trace;
use rand::Rng;

use crate::error::{DnsError, DnsResult};
use crate::format_buffer;
use crate::name;
use crate::rr::{self, RData, RrClass, RrType};
use crate::util;

const HEADER_LEN: usize = 12;
const DICT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Question,
    Answer,
    Authority,
    Additional,
}

impl Section {
    fn bit(self) -> u8 {
        match self {
            Section::Question => 0b0001,
            Section::Answer => 0b0010,
            Section::Authority => 0b0100,
            Section::Additional => 0b1000,
        }
    }

    fn from_bit(bit: u8) -> Option<Section> {
        match bit {
            0b0001 => Some(Section::Question),
            0b0010 => Some(Section::Answer),
            0b0100 => Some(Section::Authority),
            0b1000 => Some(Section::Additional),
            _ => None,
        }
    }

    fn header_offset(self) -> usize {
        match self {
            Section::Question => 4,
            Section::Answer => 6,
            Section::Authority => 8,
            Section::Additional => 10,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Section::Question => "QUESTION",
            Section::Answer => "ANSWER",
            Section::Authority => "AUTHORITY",
            Section::Additional => "ADDITIONAL",
        };
        write!(f, "{}", name)
    }
}

pub const SECTION_MASK_ALL: u8 = 0b1111;

/// Filter for [`Packet::next`]: `None` fields act as wildcards.
#[derive(Debug, Clone, Default)]
pub struct RrFilter {
    pub section_mask: Option<u8>,
    pub rtype: Option<RrType>,
    pub class: Option<RrClass>,
    pub name: Option<String>,
}

/// A fully parsed record: header fields plus where its rdata (if any) lives
/// in the packet's buffer, so callers decode lazily through [`rr::parse`].
#[derive(Debug, Clone)]
pub struct Record {
    pub section: Section,
    pub name: String,
    pub rtype: RrType,
    pub class: RrClass,
    pub ttl: u32,
    pub rdata_offset: usize,
    pub rdata_len: usize,
    pub is_question: bool,
}

/// Externalized iteration state: which section bit we're in, how many
/// records of that section we've already consumed, and where in the buffer
/// the next record header begins. Fits in two machine words, so iteration
/// can be paused and resumed without heap allocation.
#[derive(Debug, Clone, Copy)]
pub struct ParseState {
    section_bit: u8,
    index: u16,
    next_offset: u16,
}

impl ParseState {
    pub fn new() -> Self {
        ParseState {
            section_bit: Section::Question.bit(),
            index: 0,
            next_offset: HEADER_LEN as u16,
        }
    }
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Packet {
    buf: Vec<u8>,
    cap: usize,
    dict: [Option<u16>; DICT_CAPACITY],
    dict_next: usize,
}

impl Packet {
    /// Zeroes the header and reserves `cap` bytes of buffer.
    pub fn new(cap: usize) -> Packet {
        let mut buf = vec![0u8; HEADER_LEN];
        buf.reserve(cap.saturating_sub(HEADER_LEN));
        Packet {
            buf,
            cap,
            dict: [None; DICT_CAPACITY],
            dict_next: 0,
        }
    }

    /// A packet set up as an outbound query: random id, recursion-desired
    /// flag set.
    pub fn new_query(cap: usize) -> Packet {
        let mut packet = Packet::new(cap);
        let id: u16 = rand::thread_rng().gen();
        packet.set_id(id);
        packet.set_flags(0x0100); // RD bit
        packet
    }

    pub fn id(&self) -> u16 {
        BigEndian::read_u16(&self.buf[0..2])
    }

    pub fn set_id(&mut self, id: u16) {
        BigEndian::write_u16(&mut self.buf[0..2], id);
    }

    pub fn flags(&self) -> u16 {
        BigEndian::read_u16(&self.buf[2..4])
    }

    pub fn set_flags(&mut self, flags: u16) {
        BigEndian::write_u16(&mut self.buf[2..4], flags);
    }

    pub fn count(&self, section: Section) -> u16 {
        BigEndian::read_u16(&self.buf[section.header_offset()..section.header_offset() + 2])
    }

    fn set_count(&mut self, section: Section, n: u16) {
        BigEndian::write_u16(
            &mut self.buf[section.header_offset()..section.header_offset() + 2],
            n,
        );
    }

    pub fn end(&self) -> usize {
        self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// The buffer as built so far (header + every section appended).
    pub fn filled(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) -> DnsResult<()> {
        if self.buf.len() + bytes.len() > self.cap {
            return Err(DnsError::BufferExhausted);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn append_u16(&mut self, value: u16) -> DnsResult<()> {
        let mut tmp = [0u8; 2];
        BigEndian::write_u16(&mut tmp, value);
        self.append(&tmp)
    }

    pub(crate) fn append_u32(&mut self, value: u32) -> DnsResult<()> {
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, value);
        self.append(&tmp)
    }

    /// Reserves two bytes for a length field to be patched in later by
    /// [`Packet::backfill_u16`]; returns the offset of the placeholder.
    pub(crate) fn reserve_u16(&mut self) -> DnsResult<usize> {
        let offset = self.buf.len();
        self.append_u16(0)?;
        Ok(offset)
    }

    pub(crate) fn backfill_u16(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.buf[offset..offset + 2], value);
    }

    fn dict_add(&mut self, offset: u16) {
        self.dict[self.dict_next] = Some(offset);
        self.dict_next = (self.dict_next + 1) % DICT_CAPACITY;
    }

    /// Writes `name` in wire format, replacing the longest matching suffix
    /// against a name already in this packet with a compression pointer.
    pub(crate) fn compress_name(&mut self, name: &str) -> DnsResult<()> {
        let new_labels = name::labels(name)?;
        let start = self.buf.len();

        let mut best: Option<(usize, u16)> = None;
        for slot in self.dict.iter().flatten() {
            let dict_offset = *slot;
            let dict_name = match name::expand(&self.buf, dict_offset as usize) {
                Ok(n) => n,
                Err(_) => continue,
            };
            let dict_labels = match name::labels(&dict_name) {
                Ok(l) => l,
                Err(_) => continue,
            };
            let matched = name::common_suffix_len(&new_labels, &dict_labels);
            if matched == 0 {
                continue;
            }
            let skip_count = dict_labels.len() - matched;
            if let Ok(target) = offset_after_labels(&self.buf, dict_offset as usize, skip_count) {
                if target <= 0x3FFF {
                    let better = match best {
                        Some((best_matched, _)) => matched > best_matched,
                        None => true,
                    };
                    if better {
                        best = Some((matched, target as u16));
                    }
                }
            }
        }

        match best {
            Some((matched, target)) => {
                for label in &new_labels[..new_labels.len() - matched] {
                    self.append(&[label.len() as u8])?;
                    self.append(label.as_bytes())?;
                }
                let pointer = 0xC000u16 | target;
                self.append_u16(pointer)?;
            }
            None => {
                for label in &new_labels {
                    self.append(&[label.len() as u8])?;
                    self.append(label.as_bytes())?;
                }
                self.append(&[0u8])?;
            }
        }

        if start <= 0x3FFF {
            self.dict_add(start as u16);
        }
        Ok(())
    }

    /// Appends a record to `section`, rolling the buffer back to its
    /// pre-call state on any failure so the packet stays valid.
    pub fn push(
        &mut self,
        section: Section,
        name: &str,
        rtype: RrType,
        class: RrClass,
        ttl: u32,
        rdata: &RData,
    ) -> DnsResult<()> {
        let snapshot_len = self.buf.len();
        let snapshot_dict = self.dict;
        let snapshot_dict_next = self.dict_next;

        let result = (|| -> DnsResult<()> {
            self.compress_name(name)?;
            self.append_u16(rtype.0)?;
            self.append_u16(class.0)?;

            if section == Section::Question {
                return Ok(());
            }

            self.append_u32(ttl & 0x7FFF_FFFF)?;
            rr::push(self, rdata)?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                self.set_count(section, self.count(section) + 1);
                trace!("pushed {} record: {}", section, format_buffer!("X", &self.buf[snapshot_len..]));
                Ok(())
            }
            Err(e) => {
                self.buf.truncate(snapshot_len);
                self.dict = snapshot_dict;
                self.dict_next = snapshot_dict_next;
                Err(e)
            }
        }
    }

    /// Parses one record header (and, unless the record is a question, its
    /// rdata header) at `offset`. A record is un-TTLed precisely when its
    /// name starts at offset 12 — the first record immediately following
    /// the header — matching the source's `src == 12` signal rather than
    /// the section the iterator happens to be walking, since a packet with
    /// `qdcount == 0` can have a non-question record start at offset 12.
    /// Returns the record and the offset immediately following it.
    fn parse_at(&self, offset: usize, section: Section) -> DnsResult<(Record, usize)> {
        let is_question = offset == HEADER_LEN;
        let name = name::expand(&self.buf, offset)?;
        let after_name = name::skip(&self.buf, offset)?;

        if after_name + 4 > self.buf.len() {
            return Err(DnsError::malformed("record header overruns packet"));
        }
        let rtype = RrType(BigEndian::read_u16(&self.buf[after_name..after_name + 2]));
        let class = RrClass(BigEndian::read_u16(&self.buf[after_name + 2..after_name + 4]));

        if is_question {
            let record = Record {
                section,
                name,
                rtype,
                class,
                ttl: 0,
                rdata_offset: 0,
                rdata_len: 0,
                is_question: true,
            };
            return Ok((record, after_name + 4));
        }

        let ttl_offset = after_name + 4;
        if ttl_offset + 6 > self.buf.len() {
            return Err(DnsError::malformed("record header overruns packet"));
        }
        let ttl = BigEndian::read_u32(&self.buf[ttl_offset..ttl_offset + 4]);
        let rdlength = BigEndian::read_u16(&self.buf[ttl_offset + 4..ttl_offset + 6]) as usize;
        let rdata_offset = ttl_offset + 6;
        if rdata_offset + rdlength > self.buf.len() {
            return Err(DnsError::malformed("rdata overruns packet"));
        }

        let record = Record {
            section,
            name,
            rtype,
            class,
            ttl,
            rdata_offset,
            rdata_len: rdlength,
            is_question: false,
        };
        Ok((record, rdata_offset + rdlength))
    }

    /// Advances `state` to the next record matching `filter`, or `None`
    /// once every section is exhausted. Records not matching the filter are
    /// still walked (to keep `next_offset` correct) but not returned.
    pub fn next(&self, state: &mut ParseState, filter: &RrFilter) -> DnsResult<Option<Record>> {
        loop {
            let section = match Section::from_bit(state.section_bit) {
                Some(s) => s,
                None => return Ok(None),
            };

            if state.index >= self.count(section) {
                state.section_bit <<= 1;
                state.index = 0;
                if Section::from_bit(state.section_bit).is_none() {
                    return Ok(None);
                }
                continue;
            }

            let (record, next_offset) = self.parse_at(state.next_offset as usize, section)?;
            state.index += 1;
            state.next_offset = next_offset as u16;

            let section_ok = filter
                .section_mask
                .map(|mask| mask & section.bit() != 0)
                .unwrap_or(true);
            let type_ok = filter.rtype.map(|t| t == record.rtype).unwrap_or(true);
            let class_ok = filter.class.map(|c| c == record.class).unwrap_or(true);
            let name_ok = filter
                .name
                .as_ref()
                .map(|n| n.eq_ignore_ascii_case(&record.name))
                .unwrap_or(true);

            if section_ok && type_ok && class_ok && name_ok {
                return Ok(Some(record));
            }
        }
    }

    /// Decodes `record`'s rdata from this packet.
    pub fn rdata(&self, record: &Record) -> DnsResult<RData> {
        rr::parse(record.rtype, self, record.rdata_offset, record.rdata_len)
    }

    /// Re-pushes `record` (decoded from `source`) into `self`, giving the
    /// copy a fresh compression dictionary.
    pub fn copy(&mut self, source: &Packet, record: &Record) -> DnsResult<()> {
        if record.is_question {
            return self.push(
                record.section,
                &record.name,
                record.rtype,
                record.class,
                0,
                &RData::Unknown(Vec::new()),
            );
        }
        let rdata = source.rdata(record)?;
        self.push(
            record.section,
            &record.name,
            record.rtype,
            record.class,
            record.ttl,
            &rdata,
        )
    }

    /// Renders `record` the way a human-readable zone dump would.
    pub fn print(&self, record: &Record) -> DnsResult<String> {
        if record.is_question {
            return Ok(format!(
                "; {} {} {}",
                record.name, record.class, record.rtype
            ));
        }
        let rdata = self.rdata(record)?;
        Ok(format!(
            "{} {} {} {} {}",
            record.name,
            record.ttl,
            record.class,
            record.rtype,
            rr::print(&rdata)
        ))
    }
}

impl Default for Packet {
    fn default() -> Self {
        Packet::new_query(512)
    }
}

/// Steps forward `skip_count` labels from `offset`, transparently following
/// any compression pointer encountered along the way — a dictionary name
/// may itself be nothing but a pointer into an earlier name, and the
/// labels being skipped can straddle that pointer. Returns the resulting
/// offset, used as the target of a new compression pointer.
fn offset_after_labels(buf: &[u8], offset: usize, skip_count: usize) -> DnsResult<usize> {
    let mut pos = offset;
    let mut remaining = skip_count;
    let mut hops = 0usize;

    loop {
        if remaining == 0 {
            return Ok(pos);
        }
        let octet = *buf
            .get(pos)
            .ok_or_else(|| DnsError::malformed("name overruns packet"))?;

        if util::is_pointer(octet) {
            hops += 1;
            if hops > name::MAXPTRS {
                return Err(DnsError::malformed("compression pointer chain too long"));
            }
            let hi = (octet & 0x3F) as usize;
            let lo = *buf
                .get(pos + 1)
                .ok_or_else(|| DnsError::malformed("truncated compression pointer"))?
                as usize;
            pos = (hi << 8) | lo;
        } else if util::is_label(octet) {
            let label_len = octet as usize;
            pos += 1 + label_len;
            remaining -= 1;
        } else {
            return Err(DnsError::malformed("reserved label-length bits set"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn push_and_parse_a_question() {
        crate::test_support::init_logging();
        let mut packet = Packet::new(512);
        packet
            .push(
                Section::Question,
                "example.com.",
                RrType::A,
                RrClass::IN,
                0,
                &RData::Unknown(Vec::new()),
            )
            .unwrap();

        assert_eq!(packet.count(Section::Question), 1);
        assert_eq!(
            &packet.filled()[12..],
            &[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0, 0, 1, 0, 1]
        );
    }

    #[test]
    fn record_at_offset_twelve_is_un_ttled_regardless_of_section() {
        // qdcount == 0; the one record present is an Answer whose name
        // happens to start right after the header, written question-shaped
        // (no TTL/rdlength/rdata). Per the source's own signal, any record
        // starting at offset 12 is un-TTLed, independent of which section
        // the iterator is walking.
        let mut packet = Packet::new(512);
        packet
            .buf
            .extend_from_slice(&[7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]);
        packet.append_u16(RrType::A.0).unwrap();
        packet.append_u16(RrClass::IN.0).unwrap();
        packet.set_count(Section::Answer, 1);

        let mut state = ParseState::new();
        let filter = RrFilter::default();
        let record = packet.next(&mut state, &filter).unwrap().unwrap();
        assert!(record.is_question);
        assert_eq!(record.name, "example.com.");
    }

    #[test]
    fn repeated_name_compresses_to_a_pointer() {
        let mut packet = Packet::new(512);
        packet
            .push(
                Section::Question,
                "example.com.",
                RrType::A,
                RrClass::IN,
                0,
                &RData::Unknown(Vec::new()),
            )
            .unwrap();
        packet
            .push(
                Section::Answer,
                "example.com.",
                RrType::A,
                RrClass::IN,
                3600,
                &RData::A(Ipv4Addr::new(93, 184, 216, 34)),
            )
            .unwrap();

        let uncompressed_len = 12 + 17 + 17; // two full names if neither compressed
        assert!(packet.end() < uncompressed_len);

        let mut state = ParseState::new();
        let filter = RrFilter::default();
        let q = packet.next(&mut state, &filter).unwrap().unwrap();
        let a = packet.next(&mut state, &filter).unwrap().unwrap();
        assert_eq!(q.name, "example.com.");
        assert_eq!(a.name, "example.com.");
        assert!(packet.next(&mut state, &filter).unwrap().is_none());
    }

    #[test]
    fn pointer_loop_is_rejected_not_hung() {
        // a name at offset 12 whose pointer targets itself
        let mut buf = vec![0u8; 12];
        buf.push(0xC0);
        buf.push(12);
        assert!(name::expand(&buf, 12).is_err());
    }

    #[test]
    fn mx_record_round_trips_preference_and_name() {
        let mut packet = Packet::new(512);
        packet
            .push(
                Section::Answer,
                "example.com.",
                RrType::MX,
                RrClass::IN,
                3600,
                &RData::Mx {
                    preference: 10,
                    exchange: "mail.example.com.".to_string(),
                },
            )
            .unwrap();

        let mut state = ParseState::new();
        let filter = RrFilter::default();
        let record = packet.next(&mut state, &filter).unwrap().unwrap();
        let rdata = packet.rdata(&record).unwrap();
        assert_eq!(
            rdata,
            RData::Mx {
                preference: 10,
                exchange: "mail.example.com.".to_string()
            }
        );
    }
}
