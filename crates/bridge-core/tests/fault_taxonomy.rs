// crates/bridge-core/tests/fault_taxonomy.rs
use std::io;

use bridge_core::{FaultClass, Response, TransportError};

#[test]
fn io_errors_map_onto_the_taxonomy() {
    let cases = [
        (io::ErrorKind::WouldBlock, TransportError::WouldBlock),
        (io::ErrorKind::TimedOut, TransportError::Timeout),
        (io::ErrorKind::ConnectionReset, TransportError::ConnectionReset),
        (io::ErrorKind::BrokenPipe, TransportError::BrokenPipe),
        (io::ErrorKind::Interrupted, TransportError::Interrupted),
        (io::ErrorKind::ConnectionRefused, TransportError::Refused),
    ];

    for (kind, expected) in cases {
        assert_eq!(TransportError::from(io::Error::from(kind)), expected, "{kind:?}");
    }
}

#[cfg(unix)]
#[test]
fn programming_errors_are_invariant_violations() {
    let err = TransportError::from(io::Error::from_raw_os_error(libc::EBADF));
    assert_eq!(err, TransportError::InvalidHandle);
    assert_eq!(err.class(), FaultClass::Invariant);

    let err = TransportError::from(io::Error::from_raw_os_error(libc::ENOTSOCK));
    assert_eq!(err, TransportError::NotASocket);
    assert!(err.is_fatal());
}

#[test]
fn only_broken_pipe_arms_a_reconnect() {
    assert!(TransportError::BrokenPipe.wants_reconnect());
    assert!(!TransportError::ConnectionReset.wants_reconnect());
    assert!(!TransportError::Interrupted.wants_reconnect());
    assert!(TransportError::Interrupted.is_fatal());
}

#[test]
fn transient_and_rejected_faults_keep_the_transport() {
    assert_eq!(TransportError::WouldBlock.class(), FaultClass::Transient);
    assert_eq!(TransportError::Timeout.class(), FaultClass::Timeout);
    assert!(!TransportError::Timeout.is_fatal());
    assert!(!TransportError::TooLong { len: 10, limit: 5 }.is_fatal());
    assert_eq!(
        TransportError::TooLong { len: 10, limit: 5 }.to_string(),
        "message is too long! 10 vs 5"
    );
}

#[test]
fn responses_expose_text_and_binary_views() {
    let text = Response::text("1");
    assert!(!text.is_binary());
    assert_eq!(text.as_text(), "1");

    let binary = Response::binary(vec![0x31, 0x32]);
    assert!(binary.is_binary());
    assert_eq!(binary.as_text(), "12");

    assert!(Response::error("boom").is_error);
    assert!(Response::empty().is_empty());
}
