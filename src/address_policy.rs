//! Blocked network ranges for outbound fetches.
//!
//! The table is immutable and built once on first use. Lookups are pure:
//! no resolution, no I/O.

use std::net::IpAddr;
use std::sync::LazyLock;

use ipnet::IpNet;

/// Private, loopback, link-local, multicast, documentation and reserved ranges.
const BLOCKED_CIDRS: &[&str] = &[
    // IPv4
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.0.2.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "198.51.100.0/24",
    "203.0.113.0/24",
    "224.0.0.0/4",
    "240.0.0.0/4",
    // IPv6
    "::/128",
    "::1/128",
    "2001:db8::/32",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
];

static BLOCKED_PREFIXES: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    BLOCKED_CIDRS
        .iter()
        .map(|cidr| cidr.parse().expect("blocked prefix table is well-formed"))
        .collect()
});

/// Returns the blocked prefix containing `ip`, if any.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are unwrapped first so a
/// loopback address cannot slip through in IPv6 clothing.
pub fn blocked_prefix(ip: IpAddr) -> Option<&'static IpNet> {
    let ip = unmap(ip);
    BLOCKED_PREFIXES.iter().find(|prefix| prefix.contains(&ip))
}

/// Whether `ip` must not be contacted.
pub fn is_blocked(ip: IpAddr) -> bool {
    blocked_prefix(ip).is_some()
}

fn unmap(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
