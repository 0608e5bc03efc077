use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    Connector, EventSender, Transport, TransportError, TransportEvent, TransportEventKind,
    TransportId,
};
use crate::codec::{ControlFrame, OutputChunk};
use crate::identity::ConnectTarget;

struct MockLink {
    id: TransportId,
    target: ConnectTarget,
    events: EventSender,
    open: bool,
    closed_by_client: bool,
    closed_by_backend: bool,
    sent: Vec<String>,
}

impl MockLink {
    fn is_live(&self) -> bool {
        !self.closed_by_client && !self.closed_by_backend
    }
}

#[derive(Default)]
struct MockState {
    links: Vec<MockLink>,
}

impl MockState {
    fn link(&self, id: TransportId) -> Option<&MockLink> {
        self.links.iter().find(|link| link.id == id)
    }

    fn link_mut(&mut self, id: TransportId) -> Option<&mut MockLink> {
        self.links.iter_mut().find(|link| link.id == id)
    }
}

/// In-memory connector. Nothing happens on its own: the paired
/// [`MockHandle`] plays the backend, deciding when each connection opens,
/// what it outputs and how it ends.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> (Self, MockHandle) {
        let connector = Self::default();
        let handle = MockHandle {
            state: connector.state.clone(),
        };
        (connector, handle)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(
        &mut self,
        target: &ConnectTarget,
        id: TransportId,
        events: EventSender,
    ) -> MockTransport {
        self.state.lock().links.push(MockLink {
            id,
            target: target.clone(),
            events,
            open: false,
            closed_by_client: false,
            closed_by_backend: false,
            sent: Vec::new(),
        });
        MockTransport {
            id,
            state: self.state.clone(),
        }
    }
}

pub struct MockTransport {
    id: TransportId,
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        let link = state.link_mut(self.id).ok_or(TransportError::Closed)?;
        if !link.is_live() {
            return Err(TransportError::Closed);
        }
        if !link.open {
            return Err(TransportError::NotOpen);
        }
        link.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(link) = self.state.lock().link_mut(self.id) {
            link.closed_by_client = true;
        }
    }
}

/// Backend side of a [`MockConnector`].
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Every connection attempted so far, oldest first.
    pub fn connections(&self) -> Vec<TransportId> {
        self.state.lock().links.iter().map(|link| link.id).collect()
    }

    pub fn last(&self) -> Option<TransportId> {
        self.state.lock().links.last().map(|link| link.id)
    }

    pub fn target(&self, id: TransportId) -> Option<ConnectTarget> {
        self.state.lock().link(id).map(|link| link.target.clone())
    }

    /// Connections neither side has closed.
    pub fn live_count(&self) -> usize {
        self.state
            .lock()
            .links
            .iter()
            .filter(|link| link.is_live())
            .count()
    }

    pub fn closed_by_client(&self, id: TransportId) -> bool {
        self.state
            .lock()
            .link(id)
            .map(|link| link.closed_by_client)
            .unwrap_or(false)
    }

    pub fn raw_sent(&self, id: TransportId) -> Vec<String> {
        self.state
            .lock()
            .link(id)
            .map(|link| link.sent.clone())
            .unwrap_or_default()
    }

    /// Decoded control frames the client sent on `id`, in order.
    pub fn frames(&self, id: TransportId) -> Vec<ControlFrame> {
        self.raw_sent(id)
            .iter()
            .filter_map(|text| ControlFrame::decode(text).ok())
            .collect()
    }

    /// Complete the handshake. Emits even for a connection the client has
    /// already closed, which is how late callbacks are simulated.
    pub fn open(&self, id: TransportId) {
        let mut state = self.state.lock();
        if let Some(link) = state.link_mut(id) {
            link.open = true;
            let _ = link
                .events
                .send(TransportEvent::new(id, TransportEventKind::Opened));
        }
    }

    pub fn output(&self, id: TransportId, chunk: impl Into<OutputChunk>) {
        self.emit(id, TransportEventKind::Output(chunk.into()));
    }

    pub fn close_remote(&self, id: TransportId) {
        let mut state = self.state.lock();
        if let Some(link) = state.link_mut(id) {
            link.closed_by_backend = true;
            let _ = link
                .events
                .send(TransportEvent::new(id, TransportEventKind::Closed));
        }
    }

    pub fn fail(&self, id: TransportId, reason: &str) {
        let mut state = self.state.lock();
        if let Some(link) = state.link_mut(id) {
            link.closed_by_backend = true;
            let _ = link.events.send(TransportEvent::new(
                id,
                TransportEventKind::Failed(TransportError::Connection(reason.to_string())),
            ));
        }
    }

    fn emit(&self, id: TransportId, kind: TransportEventKind) {
        if let Some(link) = self.state.lock().link(id) {
            let _ = link.events.send(TransportEvent::new(id, kind));
        }
    }
}
