// ABOUTME: In-memory relay transport shared by the integration tests
// Records every connect, send and close in call order so tests can assert on wire traffic

#![allow(dead_code)]

use indirex_term::terminal::{ClientFrame, ConnectionId, Connector, Transport, TransportError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(ConnectionId),
    Send(ConnectionId, String),
    Close(ConnectionId),
}

#[derive(Debug, Default)]
pub struct RelayLog {
    pub calls: Vec<Call>,
    pub open: HashSet<ConnectionId>,
    pub refuse_connections: bool,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    log: Arc<Mutex<RelayLog>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following connect attempt fail
    pub fn refuse_connections(&self) {
        self.log.lock().unwrap().refuse_connections = true;
    }

    /// Simulate the socket finishing its handshake
    pub fn mark_open(&self, id: ConnectionId) {
        self.log.lock().unwrap().open.insert(id);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().calls.clone()
    }

    pub fn connections(&self) -> Vec<ConnectionId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Connect(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Frames sent on one connection, decoded
    pub fn frames(&self, id: ConnectionId) -> Vec<ClientFrame> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(conn, text) if conn == id => {
                    Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
                }
                _ => None,
            })
            .collect()
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    fn connect(&mut self, _url: &str) -> Result<FakeTransport, TransportError> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_connections {
            return Err(TransportError::ConnectFailed("connection refused".to_string()));
        }
        let id = ConnectionId::next();
        log.calls.push(Call::Connect(id));
        Ok(FakeTransport {
            id,
            log: self.log.clone(),
        })
    }
}

pub struct FakeTransport {
    id: ConnectionId,
    log: Arc<Mutex<RelayLog>>,
}

impl Transport for FakeTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.log.lock().unwrap().open.contains(&self.id)
    }

    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut log = self.log.lock().unwrap();
        if !log.open.contains(&self.id) {
            return Err(TransportError::NotOpen);
        }
        log.calls.push(Call::Send(self.id, text));
        Ok(())
    }

    fn close(&mut self) {
        let mut log = self.log.lock().unwrap();
        log.open.remove(&self.id);
        log.calls.push(Call::Close(self.id));
    }
}
