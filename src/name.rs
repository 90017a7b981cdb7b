//! Domain-name algebra: presentation-form anchoring/cleaving, and the
//! wire-format label walk shared by the packet codec's compression,
//! skip, and decompression operations.
use crate::error::{DnsError, DnsResult};
use crate::util;

/// Maximum serialized name length, including every length octet and the
/// terminating zero label.
pub const MAXNAME: usize = 255;
/// Maximum length of a single label.
pub const MAXLABEL: usize = 63;
/// Maximum number of compression-pointer hops `expand` will follow before
/// declaring a loop.
pub const MAXPTRS: usize = 127;

/// Appends a trailing '.' if the name doesn't already end with one.
///
/// ```
/// use dnslib::name::anchor;
///
/// assert_eq!(anchor("example.com"), "example.com.");
/// assert_eq!(anchor("example.com."), "example.com.");
/// ```
pub fn anchor(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Strips the leftmost label, returning the parent domain, or `None` if
/// there is nothing left to cleave (root or empty name).
///
/// ```
/// use dnslib::name::cleave;
///
/// assert_eq!(cleave("www.example.com."), Some("example.com.".to_string()));
/// assert_eq!(cleave("com."), None);
/// ```
pub fn cleave(name: &str) -> Option<String> {
    let trimmed = name.strip_prefix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find('.') {
        Some(idx) => {
            let parent = &trimmed[idx + 1..];
            if parent.is_empty() {
                None
            } else {
                Some(parent.to_string())
            }
        }
        None => None,
    }
}

/// Number of '.' separators in the presentation form, the quantity the
/// resolver configuration's search algorithm compares against `ndots`.
pub fn count_dots(name: &str) -> usize {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        0
    } else {
        trimmed.matches('.').count()
    }
}

/// Splits an (optionally anchored) presentation-form name into its labels,
/// validating each against the wire-format length limits.
pub(crate) fn labels(name: &str) -> DnsResult<Vec<String>> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut total = 1usize; // terminating zero label
    let mut out = Vec::new();
    for label in trimmed.split('.') {
        if label.is_empty() || label.len() > MAXLABEL {
            return Err(DnsError::NameTooLong);
        }
        total += label.len() + 1;
        if total > MAXNAME {
            return Err(DnsError::NameTooLong);
        }
        out.push(label.to_string());
    }
    Ok(out)
}

fn labels_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Length, in matching trailing labels, of the longest common suffix of
/// two label sequences (used by name compression to find a match point).
pub(crate) fn common_suffix_len(a: &[String], b: &[String]) -> usize {
    let mut n = 0;
    while n < a.len() && n < b.len() && labels_eq(&a[a.len() - 1 - n], &b[b.len() - 1 - n]) {
        n += 1;
    }
    n
}

/// Walks wire-format labels starting at `offset`, returning the offset
/// immediately past the terminating zero label, or past a pointer (a
/// pointer is treated as terminal; its target is not followed).
pub(crate) fn skip(buf: &[u8], offset: usize) -> DnsResult<usize> {
    let mut pos = offset;
    loop {
        let octet = *buf
            .get(pos)
            .ok_or_else(|| DnsError::malformed("name overruns packet"))?;

        if octet == 0 {
            return Ok(pos + 1);
        } else if util::is_pointer(octet) {
            if pos + 2 > buf.len() {
                return Err(DnsError::malformed("truncated compression pointer"));
            }
            return Ok(pos + 2);
        } else if util::is_label(octet) {
            let label_len = octet as usize;
            let next = pos + 1 + label_len;
            if next > buf.len() {
                return Err(DnsError::malformed("label overruns packet"));
            }
            pos = next;
        } else {
            debug_assert!(util::is_reserved(octet));
            return Err(DnsError::malformed("reserved label-length bits set"));
        }
    }
}

/// Decompresses a name starting at `offset` to presentation form, following
/// pointers up to [`MAXPTRS`] hops.
pub(crate) fn expand(buf: &[u8], offset: usize) -> DnsResult<String> {
    let mut out = String::new();
    let mut pos = offset;
    let mut hops = 0usize;

    loop {
        let octet = *buf
            .get(pos)
            .ok_or_else(|| DnsError::malformed("name overruns packet"))?;

        if octet == 0 {
            if out.is_empty() {
                out.push('.');
            }
            return Ok(out);
        } else if util::is_pointer(octet) {
            hops += 1;
            if hops > MAXPTRS {
                return Err(DnsError::malformed("compression pointer chain too long"));
            }
            let hi = (octet & 0x3F) as usize;
            let lo = *buf
                .get(pos + 1)
                .ok_or_else(|| DnsError::malformed("truncated compression pointer"))?
                as usize;
            let target = (hi << 8) | lo;
            if target >= pos {
                return Err(DnsError::malformed("compression pointer does not go backwards"));
            }
            pos = target;
        } else if util::is_label(octet) {
            let label_len = octet as usize;
            let start = pos + 1;
            let end = start + label_len;
            let label = buf
                .get(start..end)
                .ok_or_else(|| DnsError::malformed("label overruns packet"))?;
            out.push_str(std::str::from_utf8(label).map_err(|_| DnsError::malformed("label is not valid utf-8"))?);
            out.push('.');
            pos = end;
        } else {
            debug_assert!(util::is_reserved(octet));
            return Err(DnsError::malformed("reserved label-length bits set"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_appends_trailing_dot_once() {
        assert_eq!(anchor("example.com"), "example.com.");
        assert_eq!(anchor("example.com."), "example.com.");
    }

    #[test]
    fn cleave_strips_leftmost_label() {
        assert_eq!(cleave("www.example.com.").as_deref(), Some("example.com."));
        assert_eq!(cleave("com."), None);
        assert_eq!(cleave("."), None);
        assert_eq!(cleave(""), None);
    }

    #[test]
    fn cleave_terminates_in_bounded_steps() {
        let mut current = Some(anchor("a.b.c.example.com"));
        let mut steps = 0;
        while let Some(name) = current {
            current = cleave(&name);
            steps += 1;
            assert!(steps <= 6);
        }
    }

    #[test]
    fn labels_rejects_overlong_label() {
        let long = "a".repeat(64);
        assert!(labels(&long).is_err());
    }

    #[test]
    fn common_suffix_len_matches_trailing_labels() {
        let a = labels("www.example.com.").unwrap();
        let b = labels("example.com.").unwrap();
        assert_eq!(common_suffix_len(&a, &b), 2);
    }
}
