//! TCP scripting-port transport.
//!
//! The engine writes its scripting port, as decimal text, to a discovery file
//! in the user's home directory. Each unit is sent over a fresh connection
//! followed by the flush marker; the reply ends at the first read shorter
//! than the receive buffer.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use bridge_core::{
    DiscoveryDecision, DiscoveryError, DiscoveryState, EngineFamily, FaultClass, TransportError,
};
use bridge_protocol::wire_types::{FLUSH_MARKER, SOCKET_RECEIVE_BUFFER, SOCKET_UNIT_LIMIT};
use tracing::{debug, info};

use super::{with_retries, EngineConnector, EngineReply, EngineTransport, MAX_TRANSIENT_RETRIES};
use crate::session::EngineSession;

pub struct SocketTransport {
    addr: SocketAddr,
    connect_timeout: Duration,
    io_timeout: Duration,
    working_directory: Option<PathBuf>,
    closed: bool,
}

impl SocketTransport {
    pub fn new(addr: SocketAddr, connect_timeout: Duration, io_timeout: Duration) -> Self {
        SocketTransport {
            addr,
            connect_timeout,
            io_timeout,
            working_directory: None,
            closed: false,
        }
    }

    pub fn with_working_directory(mut self, dir: Option<PathBuf>) -> Self {
        self.working_directory = dir;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn exchange(&self, unit: &[u8], reply: &mut Vec<u8>) -> Result<(), TransportError> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.io_timeout))?;
        stream.set_write_timeout(Some(self.io_timeout))?;
        stream.set_nodelay(true)?;

        let mut framed = Vec::with_capacity(unit.len() + FLUSH_MARKER.len());
        framed.extend_from_slice(unit);
        framed.extend_from_slice(FLUSH_MARKER);
        write_unit(&mut stream, &framed)?;

        let mut buf = [0u8; SOCKET_RECEIVE_BUFFER];
        loop {
            let n = with_retries(|| stream.read(&mut buf).map_err(read_error))?;
            reply.extend_from_slice(&buf[..n]);
            if n < SOCKET_RECEIVE_BUFFER {
                return Ok(());
            }
        }
    }
}

impl EngineTransport for SocketTransport {
    fn family(&self) -> EngineFamily {
        EngineFamily::Socket
    }

    fn unit_limit(&self) -> Option<usize> {
        Some(SOCKET_UNIT_LIMIT)
    }

    fn send_units(&mut self, units: &[&[u8]]) -> Result<EngineReply, TransportError> {
        if self.closed {
            return Err(TransportError::NotOpen);
        }

        let mut reply = Vec::new();
        for unit in units {
            if let Err(err) = self.exchange(unit, &mut reply) {
                if err.is_fatal() {
                    self.closed = true;
                }
                return Err(err);
            }
        }

        Ok(EngineReply::Text(reply))
    }

    fn is_closed(&mut self) -> bool {
        self.closed
    }

    fn working_directory(&self) -> Option<PathBuf> {
        self.working_directory.clone()
    }
}

/// A receive timeout surfaces as would-block on some platforms.
fn read_error(err: io::Error) -> TransportError {
    match TransportError::from(err) {
        TransportError::WouldBlock => TransportError::Timeout,
        other => other,
    }
}

fn write_unit(stream: &mut TcpStream, framed: &[u8]) -> Result<(), TransportError> {
    let mut written = 0;
    let mut stalls = 0;

    while written < framed.len() {
        match stream.write(&framed[written..]) {
            Ok(0) => return Err(TransportError::BrokenPipe),
            Ok(n) => written += n,
            Err(err) => {
                let err = TransportError::from(err);
                if err.class() != FaultClass::Transient || stalls >= MAX_TRANSIENT_RETRIES {
                    return Err(err);
                }
                stalls += 1;
                thread::sleep(Duration::from_millis(10));
            }
        }
    }

    stream.flush()?;
    Ok(())
}

/// Watches the discovery file and connects to the port it names.
pub struct SocketConnector {
    discovery_file: PathBuf,
    host: IpAddr,
    connect_timeout: Duration,
    io_timeout: Duration,
    cached_port: Option<u16>,
}

impl SocketConnector {
    pub fn new(discovery_file: PathBuf, host: IpAddr, connect_timeout: Duration, io_timeout: Duration) -> Self {
        SocketConnector {
            discovery_file,
            host,
            connect_timeout,
            io_timeout,
            cached_port: None,
        }
    }

    fn stamp(&self) -> Result<Option<SystemTime>, DiscoveryError> {
        match fs::metadata(&self.discovery_file).and_then(|meta| meta.modified()) {
            Ok(stamp) => Ok(Some(stamp)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(DiscoveryError::DiscoveryFile {
                path: self.discovery_file.clone(),
                reason: err.to_string(),
            }),
        }
    }
}

impl EngineConnector for SocketConnector {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn discover(&mut self, state: &mut DiscoveryState) -> Result<Option<EngineSession>, DiscoveryError> {
        let Some(stamp) = self.stamp()? else {
            return Ok(None);
        };

        let port = match (state.decide(stamp), self.cached_port) {
            (DiscoveryDecision::Skip, _) => return Ok(None),
            (DiscoveryDecision::ForcedReconnect, Some(port)) => {
                info!(port, "trying to reconnect");
                port
            }
            _ => {
                let port = read_port_file(&self.discovery_file)?;
                self.cached_port = Some(port);
                port
            }
        };

        let addr = SocketAddr::new(self.host, port);
        let transport = SocketTransport::new(addr, self.connect_timeout, self.io_timeout)
            .with_working_directory(engine_working_directory(port));

        match EngineSession::attach(Box::new(transport)) {
            Ok(session) => {
                state.record_success(stamp);
                Ok(Some(session))
            }
            Err(DiscoveryError::Transport(err))
                if matches!(err, TransportError::Refused | TransportError::Timeout) =>
            {
                debug!(%addr, "engine not reachable: {err}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Parse the port number out of the discovery file.
pub fn read_port_file(path: &Path) -> Result<u16, DiscoveryError> {
    let text = fs::read_to_string(path).map_err(|err| DiscoveryError::DiscoveryFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    text.split_whitespace()
        .next()
        .and_then(|word| word.parse::<u16>().ok())
        .filter(|&port| port != 0)
        .ok_or_else(|| DiscoveryError::DiscoveryFile {
            path: path.to_path_buf(),
            reason: format!("no port number in {text:?}"),
        })
}

/// Best effort: the pid listening on `port`, then its working directory.
#[cfg(unix)]
fn engine_working_directory(port: u16) -> Option<PathBuf> {
    let output = std::process::Command::new("lsof")
        .args(["-t", "-sTCP:LISTEN", &format!("-iTCP:{port}")])
        .output()
        .ok()?;

    let pid: u32 = String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;

    fs::canonicalize(format!("/proc/{pid}/cwd")).ok()
}

#[cfg(not(unix))]
fn engine_working_directory(_port: u16) -> Option<PathBuf> {
    None
}
