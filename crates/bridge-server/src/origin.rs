//! Classification of peer addresses.
//!
//! Client traffic is unencrypted, so only peers on the local machine or a
//! private network may connect.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    LocalHost,
    /// RFC 1918 ranges.
    PrivateNetwork,
    /// 169.254/16 and fe80::/10.
    LinkLocal,
    /// fc00::/7.
    UniqueLocal,
    PublicNetwork,
}

impl ConnectionType {
    pub fn is_private(self) -> bool {
        self != ConnectionType::PublicNetwork
    }
}

pub fn classify(ip: IpAddr) -> ConnectionType {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => classify_v4(v4),
            None => classify_v6(v6),
        },
    }
}

fn classify_v4(ip: Ipv4Addr) -> ConnectionType {
    if ip.is_loopback() {
        ConnectionType::LocalHost
    } else if ip.is_private() {
        ConnectionType::PrivateNetwork
    } else if ip.is_link_local() {
        ConnectionType::LinkLocal
    } else {
        ConnectionType::PublicNetwork
    }
}

fn classify_v6(ip: Ipv6Addr) -> ConnectionType {
    let first = ip.segments()[0];
    if ip.is_loopback() {
        ConnectionType::LocalHost
    } else if first & 0xffc0 == 0xfe80 {
        ConnectionType::LinkLocal
    } else if first & 0xfe00 == 0xfc00 {
        ConnectionType::UniqueLocal
    } else {
        ConnectionType::PublicNetwork
    }
}

pub fn is_private(ip: IpAddr) -> bool {
    classify(ip).is_private()
}
