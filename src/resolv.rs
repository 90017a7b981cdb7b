//! Resolver configuration: nameservers, search list, lookup order and
//! options, loaded from resolver-configuration text and shared
//! read-only across a process via reference counting.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use log::{debug, warn};

use crate::name;

/// Maximum nameservers retained; matches the historical `resolv.conf`
/// convention of three.
pub const MAXNS: usize = 3;
/// Maximum search-list entries.
pub const MAXSEARCH: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    File,
    Bind,
}

#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub ndots: u32,
    pub edns0: bool,
    pub recursive: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            ndots: 1,
            edns0: false,
            recursive: false,
        }
    }
}

#[derive(Debug)]
struct ResolvConfData {
    nameservers: Vec<SocketAddr>,
    search: Vec<String>,
    lookup: Vec<LookupSource>,
    options: Options,
    interface: SocketAddr,
}

impl Default for ResolvConfData {
    fn default() -> Self {
        ResolvConfData {
            nameservers: Vec::new(),
            search: Vec::new(),
            lookup: vec![LookupSource::File, LookupSource::Bind],
            options: Options::default(),
            interface: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        }
    }
}

/// Reference-counted, immutable-after-load resolver configuration.
/// `acquire`/`release` exist as explicit wrapper methods over `Arc`'s own
/// clone/drop, so call sites that want the familiar acquire/release
/// vocabulary can use it; the actual free happens through ordinary Rust
/// ownership, not a hand-rolled counter.
#[derive(Debug, Clone)]
pub struct ResolvConf(Arc<ResolvConfData>);

impl ResolvConf {
    /// A configuration with only the defaults set: lookup order "file then
    /// bind", ndots 1, unspecified interface. If `hostname` is given, its
    /// parent domain becomes an implicit single-entry search list, the way
    /// a freshly opened configuration falls back to the local domain before
    /// any `search`/`domain` directive is read.
    pub fn open(hostname: Option<&str>) -> ResolvConf {
        let mut data = ResolvConfData::default();
        if let Some(host) = hostname {
            if let Some(parent) = name::cleave(&name::anchor(host)) {
                data.search.push(parent);
            }
        }
        ResolvConf(Arc::new(data))
    }

    /// Parses resolver-configuration text: one directive per line,
    /// whitespace/comma-separated tokens, `#`/`;` comments, case-insensitive
    /// keywords. Unrecognized directives and tokens are ignored.
    pub fn load(text: &str) -> ResolvConf {
        let mut data = ResolvConfData::default();

        for line in text.lines() {
            let tokens = tokenize(line);
            let (keyword, rest) = match tokens.split_first() {
                Some((k, r)) => (k, r),
                None => continue,
            };

            match keyword.to_ascii_lowercase().as_str() {
                "nameserver" => {
                    if let Some(addr) = rest.first() {
                        if data.nameservers.len() >= MAXNS {
                            warn!("nameserver list full, dropping {}", addr);
                        } else if let Ok(ip) = addr.parse::<IpAddr>() {
                            data.nameservers.push(SocketAddr::new(ip, 53));
                        } else {
                            warn!("could not parse nameserver address {}", addr);
                        }
                    }
                }
                "domain" | "search" => {
                    data.search.clear();
                    for raw in rest {
                        if data.search.len() >= MAXSEARCH {
                            break;
                        }
                        data.search.push(name::anchor(raw));
                    }
                }
                "lookup" => {
                    data.lookup.clear();
                    for tok in rest {
                        match tok.to_ascii_lowercase().as_str() {
                            "file" => data.lookup.push(LookupSource::File),
                            "bind" => data.lookup.push(LookupSource::Bind),
                            other => warn!("unrecognized lookup source {}", other),
                        }
                    }
                }
                "options" => {
                    for opt in rest {
                        if opt.eq_ignore_ascii_case("edns0") {
                            data.options.edns0 = true;
                        } else if opt.eq_ignore_ascii_case("recursive") {
                            data.options.recursive = true;
                        } else if let Some(n) = opt
                            .strip_prefix("ndots:")
                            .and_then(|n| n.parse::<u32>().ok())
                        {
                            data.options.ndots = n;
                        }
                    }
                }
                "interface" => {
                    if let (Some(addr), Some(port)) = (rest.first(), rest.get(1)) {
                        if let (Ok(ip), Ok(port)) = (addr.parse::<IpAddr>(), port.parse::<u16>()) {
                            data.interface = SocketAddr::new(ip, port);
                        }
                    }
                }
                other => debug!("ignoring unrecognized directive {}", other),
            }
        }

        ResolvConf(Arc::new(data))
    }

    pub fn acquire(&self) -> ResolvConf {
        self.clone()
    }

    pub fn release(self) {
        drop(self);
    }

    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn nameservers(&self) -> &[SocketAddr] {
        &self.0.nameservers
    }

    pub fn search_list(&self) -> &[String] {
        &self.0.search
    }

    pub fn lookup(&self) -> &[LookupSource] {
        &self.0.lookup
    }

    pub fn options(&self) -> &Options {
        &self.0.options
    }

    pub fn interface(&self) -> SocketAddr {
        self.0.interface
    }

    /// Advances `state` to the next search candidate for `qname`, or `None`
    /// once the phases described by [`SearchState`] are exhausted.
    pub fn search(&self, qname: &str, state: &mut SearchState) -> Option<String> {
        let anchored = name::anchor(qname);
        loop {
            match state.phase {
                0 => {
                    state.phase = 1;
                    if state.dots >= self.0.options.ndots {
                        return Some(anchored);
                    }
                }
                1 => {
                    while (state.index as usize) < self.0.search.len() {
                        let suffix = &self.0.search[state.index as usize];
                        state.index += 1;
                        if !suffix.is_empty() {
                            return Some(format!("{}{}", anchored, suffix));
                        }
                    }
                    state.phase = 2;
                }
                2 => {
                    state.phase = 3;
                    if state.dots < self.0.options.ndots {
                        return Some(anchored);
                    }
                }
                _ => return None,
            }
        }
    }
}

/// Maximum words read from one directive line; the rest of an overlong
/// line is silently dropped, matching the source's fixed `words[6]` buffer.
const MAX_WORDS: usize = 6;

fn tokenize(line: &str) -> Vec<String> {
    let line = line.split(['#', ';']).next().unwrap_or("");
    line.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .take(MAX_WORDS)
        .map(|s| s.to_string())
        .collect()
}

/// Externalized state for [`ResolvConf::search`]: phase, search-list index,
/// and the query name's dot count, computed once up front.
#[derive(Debug, Clone, Copy)]
pub struct SearchState {
    phase: u8,
    index: u8,
    dots: u32,
}

impl SearchState {
    pub fn new(qname: &str) -> SearchState {
        SearchState {
            phase: 0,
            index: 0,
            dots: name::count_dots(qname) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_nameserver_options_and_search() {
        crate::test_support::init_logging();
        let conf = ResolvConf::load("nameserver 1.1.1.1\noptions ndots:3 edns0\nsearch a. b.\n");
        assert_eq!(conf.nameservers(), &[SocketAddr::new("1.1.1.1".parse().unwrap(), 53)]);
        assert_eq!(conf.options().ndots, 3);
        assert!(conf.options().edns0);
        assert_eq!(conf.search_list(), &["a.".to_string(), "b.".to_string()]);
        assert_eq!(conf.lookup(), &[LookupSource::File, LookupSource::Bind]);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let conf = ResolvConf::load("# a comment\n\n; also a comment\nnameserver 8.8.8.8\n");
        assert_eq!(conf.nameservers().len(), 1);
    }

    #[test]
    fn directive_line_is_capped_at_six_words() {
        // "lookup" + 6 sources: only the keyword and the first 6 words are
        // read, so the overlong line's tail ("bind" a 6th time) is read as
        // the 6th word and everything past it is dropped, leaving 5 sources.
        let conf = ResolvConf::load("lookup file bind file bind file bind\n");
        assert_eq!(conf.lookup().len(), 5);
    }

    #[test]
    fn nameserver_list_is_bounded() {
        let text = "nameserver 1.1.1.1\nnameserver 2.2.2.2\nnameserver 3.3.3.3\nnameserver 4.4.4.4\n";
        let conf = ResolvConf::load(text);
        assert_eq!(conf.nameservers().len(), MAXNS);
    }

    #[test]
    fn search_iterator_orders_candidates_below_ndots() {
        let conf = ResolvConf::load("search a. b.\n");
        let mut state = SearchState::new("x");
        let mut out = Vec::new();
        while let Some(candidate) = conf.search("x", &mut state) {
            out.push(candidate);
        }
        assert_eq!(out, vec!["x.a.".to_string(), "x.b.".to_string(), "x.".to_string()]);
    }

    #[test]
    fn search_iterator_tries_bare_name_first_above_ndots() {
        let conf = ResolvConf::load("options ndots:2\nsearch a.\n");
        let mut state = SearchState::new("x.y.z");
        let mut out = Vec::new();
        while let Some(candidate) = conf.search("x.y.z", &mut state) {
            out.push(candidate);
        }
        assert_eq!(out, vec!["x.y.z.".to_string(), "x.y.z.a.".to_string()]);
    }

    #[test]
    fn open_with_hostname_seeds_an_implicit_search_entry() {
        let conf = ResolvConf::open(Some("host.example.com"));
        assert_eq!(conf.search_list(), &["example.com.".to_string()]);
    }

    #[test]
    fn acquire_and_release_share_the_same_underlying_data() {
        let conf = ResolvConf::open(None);
        let handle = conf.acquire();
        assert_eq!(conf.refcount(), 2);
        handle.release();
        assert_eq!(conf.refcount(), 1);
    }
}
