//! Proxy lifecycle states and address handling.

use std::fmt;

/// Table backing the `Unchecked` partition.
pub const UNCHECKED_TABLE: &str = "proxies_unchecked";
/// Table backing the `Working` partition.
pub const WORKING_TABLE: &str = "proxies_working";
/// Table backing the `NotWorking` partition.
pub const NOT_WORKING_TABLE: &str = "proxies_not_working";

/// Lifecycle state of a proxy address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyState {
    /// Ingested from a seed list or reset, not yet validated.
    Unchecked,
    /// The last request through the proxy succeeded.
    Working,
    /// The last request through the proxy failed.
    NotWorking,
}

impl ProxyState {
    pub const ALL: [ProxyState; 3] = [
        ProxyState::Unchecked,
        ProxyState::Working,
        ProxyState::NotWorking,
    ];

    /// Name of the table holding this partition.
    pub fn table(self) -> &'static str {
        match self {
            ProxyState::Unchecked => UNCHECKED_TABLE,
            ProxyState::Working => WORKING_TABLE,
            ProxyState::NotWorking => NOT_WORKING_TABLE,
        }
    }

    /// The two partitions an address must leave when it enters this one.
    pub fn others(self) -> [ProxyState; 2] {
        match self {
            ProxyState::Unchecked => [ProxyState::Working, ProxyState::NotWorking],
            ProxyState::Working => [ProxyState::Unchecked, ProxyState::NotWorking],
            ProxyState::NotWorking => [ProxyState::Unchecked, ProxyState::Working],
        }
    }
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyState::Unchecked => "unchecked",
            ProxyState::Working => "working",
            ProxyState::NotWorking => "not_working",
        })
    }
}

/// Canonical form of a `host:port` address as stored in the pool.
pub fn normalize_address(address: &str) -> &str {
    let address = address.trim();
    address
        .strip_prefix("http://")
        .or_else(|| address.strip_prefix("https://"))
        .unwrap_or(address)
        .trim_end_matches('/')
}

/// Build a forward proxy for `address`, used for both http and https targets.
pub fn to_reqwest_proxy(address: &str) -> Result<reqwest::Proxy, reqwest::Error> {
    reqwest::Proxy::all(format!("http://{}", normalize_address(address)))
}
