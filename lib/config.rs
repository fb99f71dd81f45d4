// Stack configuration, read from the environment
//
// WIZ_CHANNELS: Hardware socket channels to use (default: 8, max 8)
// WIZ_SERVER_SLOTS: Logical slots per TCP server (default: 4)
// WIZ_TIMEOUT_MS: Bound on a blocking establish/connect (default: 5000)
// WIZ_POLL_INTERVAL_MS: Pause between status polls (default: 1)
// WIZ_MAC / WIZ_IP / WIZ_SUBNET / WIZ_GATEWAY / WIZ_DNS: network identity
use std::env;
use std::net::Ipv4Addr;
use std::str::FromStr;

use wiz_core::{
    parse_mac, BufferMap, NetworkIdentity, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS,
    MAX_CHANNELS,
};
use wiz_transport::DEFAULT_SERVER_SLOTS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackConfig {
    pub channels: u8,
    pub server_slots: usize,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Applied at start-up when set.
    pub buffer_map: Option<BufferMap>,
    pub identity: NetworkIdentity,
}

impl Default for StackConfig {
    fn default() -> Self {
        StackConfig {
            channels: MAX_CHANNELS,
            server_slots: DEFAULT_SERVER_SLOTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            buffer_map: None,
            identity: NetworkIdentity::default(),
        }
    }
}

impl StackConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any name -> value source; unparsable values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<T> {
            lookup(name).and_then(|s| s.trim().parse().ok())
        }

        let defaults = StackConfig::default();
        let mut identity = defaults.identity.clone();

        if let Some(mac) = lookup("WIZ_MAC").and_then(|s| parse_mac(s.trim())) {
            identity.mac = mac;
        }
        if let Some(ip) = parsed::<Ipv4Addr>(&lookup, "WIZ_IP") {
            identity.ip = ip;
        }
        if let Some(subnet) = parsed::<Ipv4Addr>(&lookup, "WIZ_SUBNET") {
            identity.subnet = subnet;
        }
        if let Some(gateway) = parsed::<Ipv4Addr>(&lookup, "WIZ_GATEWAY") {
            identity.gateway = gateway;
        }
        if let Some(dns) = parsed::<Ipv4Addr>(&lookup, "WIZ_DNS") {
            identity.dns = dns;
        }

        StackConfig {
            channels: parsed::<u8>(&lookup, "WIZ_CHANNELS")
                .unwrap_or(defaults.channels)
                .clamp(1, MAX_CHANNELS),
            server_slots: parsed(&lookup, "WIZ_SERVER_SLOTS").unwrap_or(defaults.server_slots),
            timeout_ms: parsed(&lookup, "WIZ_TIMEOUT_MS").unwrap_or(defaults.timeout_ms),
            poll_interval_ms: parsed(&lookup, "WIZ_POLL_INTERVAL_MS")
                .unwrap_or(defaults.poll_interval_ms),
            buffer_map: None,
            identity,
        }
    }
}
