// crates/bridge-core/tests/discovery_policy.rs
use std::time::{Duration, SystemTime};

use bridge_core::{DiscoveryDecision, DiscoveryState};

fn stamp(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[test]
fn first_sighting_is_fresh() {
    let mut state = DiscoveryState::new();
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Fresh);
}

#[test]
fn unchanged_stamp_is_skipped_after_success() {
    let mut state = DiscoveryState::new();
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Fresh);
    state.record_success(stamp(10));

    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Skip);
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Skip);
}

#[test]
fn failed_attempt_is_retried_while_stamp_unchanged() {
    let mut state = DiscoveryState::new();
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Fresh);
    // no record_success: the engine was not listening yet
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Fresh);
}

#[test]
fn armed_reconnect_forces_exactly_one_attempt() {
    let mut state = DiscoveryState::new();
    state.decide(stamp(10));
    state.record_success(stamp(10));

    state.arm_reconnect();
    assert!(state.is_reconnect_armed());

    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::ForcedReconnect);
    assert!(!state.is_reconnect_armed());
    assert_eq!(state.decide(stamp(10)), DiscoveryDecision::Skip);
}

#[test]
fn changed_stamp_wins_over_armed_reconnect_and_clears_it() {
    let mut state = DiscoveryState::new();
    state.decide(stamp(10));
    state.record_success(stamp(10));
    state.arm_reconnect();

    assert_eq!(state.decide(stamp(20)), DiscoveryDecision::Fresh);
    assert!(!state.is_reconnect_armed());
}
