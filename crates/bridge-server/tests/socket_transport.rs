// crates/bridge-server/tests/socket_transport.rs
use std::fs;
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bridge_core::{DiscoveryError, DiscoveryState, EngineFamily, TransportError};
use bridge_protocol::wire_types::{FLUSH_MARKER, SOCKET_RECEIVE_BUFFER};
use bridge_server::transport::socket::{read_port_file, SocketConnector, SocketTransport};
use bridge_server::transport::{EngineConnector, EngineReply, EngineTransport};

const LOCAL: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const TIMEOUT: Duration = Duration::from_secs(2);

const LARGE_REPLY_LEN: usize = SOCKET_RECEIVE_BUFFER * 2 + 10;

/// Scripting port that answers the version query, sends `LARGE_REPLY_LEN`
/// bytes for `outs big` and echoes everything else.
fn spawn_engine() -> (SocketAddr, Arc<Mutex<Vec<Vec<u8>>>>) {
    let listener = TcpListener::bind((LOCAL, 0)).unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.ends_with(FLUSH_MARKER) {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }

            let body = request.strip_suffix(FLUSH_MARKER.as_slice()).unwrap_or(&request).to_vec();
            let reply = if body.starts_with(b"outv vmjr") {
                b"2 286 \"Docking Station\"".to_vec()
            } else if body.starts_with(b"outs big") {
                (0..LARGE_REPLY_LEN).map(|i| b'a' + (i % 26) as u8).collect()
            } else {
                [b"ok: ".as_slice(), &body].concat()
            };
            seen.lock().unwrap().push(request);
            let _ = stream.write_all(&reply);
        }
    });

    (addr, requests)
}

fn write_port_file(dir: &tempfile::TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("port");
    fs::write(&path, format!("{port}\n")).unwrap();
    path
}

#[test]
fn each_unit_is_sent_with_the_flush_marker() {
    let (addr, requests) = spawn_engine();
    let mut transport = SocketTransport::new(addr, TIMEOUT, TIMEOUT);

    let reply = transport.send_units(&[b"outs 1 endm".as_slice(), b"outs 2 endm".as_slice()]).unwrap();
    assert_eq!(reply, EngineReply::Text(b"ok: outs 1 endmok: outs 2 endm".to_vec()));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], b"outs 1 endm\nrscr\n".to_vec());
    assert!(!transport.is_closed());
}

#[test]
fn replies_longer_than_the_receive_buffer_are_read_in_full() {
    let (addr, _) = spawn_engine();
    let mut transport = SocketTransport::new(addr, TIMEOUT, TIMEOUT);

    let reply = transport.send_units(&[b"outs big endm".as_slice()]).unwrap();
    let EngineReply::Text(text) = reply else { panic!("expected a text reply") };
    assert_eq!(text.len(), LARGE_REPLY_LEN);
    assert!(text.starts_with(b"abcdefghijklmnopqrstuvwxyzabc"));
    assert_eq!(text[SOCKET_RECEIVE_BUFFER], b'a' + (SOCKET_RECEIVE_BUFFER % 26) as u8);
}

#[test]
fn handshake_parses_the_version_reply() {
    let (addr, _) = spawn_engine();
    let mut transport = SocketTransport::new(addr, TIMEOUT, TIMEOUT);

    let info = transport.handshake().unwrap();
    assert_eq!(info.family, EngineFamily::Socket);
    assert_eq!((info.version_major, info.version_minor), (2, 286));
    assert_eq!(info.name, "Docking Station");
}

#[test]
fn refused_connection_closes_the_transport() {
    let port = {
        let listener = TcpListener::bind((LOCAL, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut transport = SocketTransport::new(SocketAddr::new(LOCAL, port), TIMEOUT, TIMEOUT);

    assert_eq!(transport.send_units(&[b"outs 1".as_slice()]), Err(TransportError::Refused));
    assert!(transport.is_closed());
    assert_eq!(transport.send_units(&[b"outs 1".as_slice()]), Err(TransportError::NotOpen));
}

#[test]
fn port_file_must_hold_a_port_number() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(read_port_file(&write_port_file(&dir, 20001)).unwrap(), 20001);

    let path = dir.path().join("garbage");
    fs::write(&path, "not a port").unwrap();
    assert!(matches!(read_port_file(&path), Err(DiscoveryError::DiscoveryFile { .. })));

    fs::write(&path, "0").unwrap();
    assert!(read_port_file(&path).is_err());
}

#[test]
fn discovery_connects_once_per_port_file_change() {
    let (addr, _) = spawn_engine();
    let dir = tempfile::tempdir().unwrap();
    let path = write_port_file(&dir, addr.port());

    let mut connector = SocketConnector::new(path, LOCAL, TIMEOUT, TIMEOUT);
    let mut state = DiscoveryState::new();

    let session = connector.discover(&mut state).unwrap().expect("engine found");
    assert_eq!(session.info().name, "Docking Station");
    assert!(state.last_stamp().is_some());

    // unchanged file: nothing to do
    assert!(connector.discover(&mut state).unwrap().is_none());

    // an armed reconnect forces exactly one attempt
    state.arm_reconnect();
    assert!(connector.discover(&mut state).unwrap().is_some());
    assert!(!state.is_reconnect_armed());
    assert!(connector.discover(&mut state).unwrap().is_none());
}

#[test]
fn missing_port_file_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let mut connector = SocketConnector::new(dir.path().join("port"), LOCAL, TIMEOUT, TIMEOUT);
    assert!(connector.discover(&mut DiscoveryState::new()).unwrap().is_none());
}

#[test]
fn unreachable_engine_is_a_miss_and_is_retried() {
    let port = {
        let listener = TcpListener::bind((LOCAL, 0)).unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let path = write_port_file(&dir, port);

    let mut connector = SocketConnector::new(path, LOCAL, TIMEOUT, TIMEOUT);
    let mut state = DiscoveryState::new();
    assert!(connector.discover(&mut state).unwrap().is_none());

    // the stamp is only committed on success
    assert!(state.last_stamp().is_none());
}
