// crates/bridge-server/tests/common/mod.rs
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bridge_core::{EngineFamily, TransportError, VERSION_QUERY};
use bridge_server::session::EngineSession;
use bridge_server::transport::{EngineReply, EngineTransport};

#[derive(Debug, Default)]
pub struct EngineState {
    pub received: Vec<Vec<u8>>,
    pub scripted: VecDeque<Result<EngineReply, TransportError>>,
    pub closed: bool,
    pub in_flight: bool,
    pub overlapped: bool,
}

/// In-process engine. Echoes every unit unless a reply was scripted.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    pub state: Arc<Mutex<EngineState>>,
    family: EngineFamily,
    limit: Option<usize>,
    delay: Duration,
}

impl FakeEngine {
    pub fn new(family: EngineFamily) -> Self {
        FakeEngine {
            state: Arc::default(),
            family,
            limit: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn session(&self) -> EngineSession {
        EngineSession::attach(Box::new(self.clone())).unwrap()
    }

    pub fn reply(&self, reply: Result<EngineReply, TransportError>) {
        self.state.lock().unwrap().scripted.push_back(reply);
    }

    pub fn reply_text(&self, text: &str) {
        self.reply(Ok(EngineReply::Text(text.as_bytes().to_vec())));
    }

    pub fn kill(&self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Units received after the handshake.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn overlapped(&self) -> bool {
        self.state.lock().unwrap().overlapped
    }
}

impl EngineTransport for FakeEngine {
    fn family(&self) -> EngineFamily {
        self.family
    }

    fn unit_limit(&self) -> Option<usize> {
        self.limit
    }

    fn send_units(&mut self, units: &[&[u8]]) -> Result<EngineReply, TransportError> {
        if units == [VERSION_QUERY.as_bytes()] {
            return Ok(EngineReply::Text(b"2 286 \"Test Engine\"".to_vec()));
        }

        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return Err(TransportError::EngineExited);
            }
            if state.in_flight {
                state.overlapped = true;
            }
            state.in_flight = true;
        }

        thread::sleep(self.delay);

        let mut state = self.state.lock().unwrap();
        state.in_flight = false;
        state.received.extend(units.iter().map(|u| u.to_vec()));
        match state.scripted.pop_front() {
            Some(reply) => reply,
            None => Ok(EngineReply::Text(units.concat())),
        }
    }

    fn is_closed(&mut self) -> bool {
        self.state.lock().unwrap().closed
    }
}
