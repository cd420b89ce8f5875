use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;

use super::RequestFacts;

static INJECTION_GUARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)union.*select|insert.*into|drop.*table").expect("injection pattern is valid")
});

/// Why a request was blocked outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Blocklisted,
    SuspiciousQuery,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Blocklisted => "blocklist",
            BlockReason::SuspiciousQuery => "block-sql-injection",
        }
    }
}

/// IP safelist/blocklist and query-string injection guard, checked before any throttle
#[derive(Debug, Clone)]
pub struct AccessFilter {
    safelist: HashSet<IpAddr>,
    blocklist: HashSet<IpAddr>,
    safelist_loopback: bool,
}

impl AccessFilter {
    pub fn new() -> Self {
        Self {
            safelist: HashSet::new(),
            blocklist: HashSet::new(),
            safelist_loopback: false,
        }
    }

    #[must_use]
    pub fn with_safelist(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.safelist.extend(ips);
        self
    }

    #[must_use]
    pub fn with_blocklist(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.blocklist.extend(ips);
        self
    }

    /// Lets loopback clients bypass admission (development setups)
    #[must_use]
    pub fn allow_loopback(mut self, allow: bool) -> Self {
        self.safelist_loopback = allow;
        self
    }

    pub fn is_safelisted(&self, ip: IpAddr) -> bool {
        self.safelist.contains(&ip) || (self.safelist_loopback && ip.is_loopback())
    }

    pub fn block_reason(&self, req: &RequestFacts) -> Option<BlockReason> {
        if self.blocklist.contains(&req.ip) {
            return Some(BlockReason::Blocklisted);
        }

        let guard = &*INJECTION_GUARD;
        let query = req.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .any(|(key, value)| guard.is_match(&key) || guard.is_match(&value))
            .then_some(BlockReason::SuspiciousQuery)
    }
}

impl Default for AccessFilter {
    fn default() -> Self {
        Self::new()
    }
}
