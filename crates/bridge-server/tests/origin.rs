// crates/bridge-server/tests/origin.rs
use std::net::IpAddr;

use bridge_server::origin::{classify, is_private, ConnectionType};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn classifies_v4_ranges() {
    assert_eq!(classify(ip("127.0.0.1")), ConnectionType::LocalHost);
    assert_eq!(classify(ip("10.1.2.3")), ConnectionType::PrivateNetwork);
    assert_eq!(classify(ip("172.16.0.9")), ConnectionType::PrivateNetwork);
    assert_eq!(classify(ip("192.168.1.20")), ConnectionType::PrivateNetwork);
    assert_eq!(classify(ip("169.254.3.4")), ConnectionType::LinkLocal);
    assert_eq!(classify(ip("172.32.0.1")), ConnectionType::PublicNetwork);
    assert_eq!(classify(ip("8.8.8.8")), ConnectionType::PublicNetwork);
}

#[test]
fn classifies_v6_ranges() {
    assert_eq!(classify(ip("::1")), ConnectionType::LocalHost);
    assert_eq!(classify(ip("fe80::1")), ConnectionType::LinkLocal);
    assert_eq!(classify(ip("fd12:3456::1")), ConnectionType::UniqueLocal);
    assert_eq!(classify(ip("2001:4860::8888")), ConnectionType::PublicNetwork);
}

#[test]
fn v4_mapped_addresses_use_the_v4_rules() {
    assert_eq!(classify(ip("::ffff:192.168.0.7")), ConnectionType::PrivateNetwork);
    assert!(!is_private(ip("::ffff:8.8.4.4")));
}
