//! The physical connection seam.
//!
//! A [`Connector`] starts a handshake and hands back a [`Transport`] handle
//! immediately; everything that happens afterwards (open, output, close,
//! failure) arrives later as a [`TransportEvent`] on the channel the
//! controller owns. Events carry the [`TransportId`] of the connection that
//! produced them so a late event from a replaced connection can be dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::codec::OutputChunk;
use crate::identity::ConnectTarget;

pub mod mock;
pub mod websocket;

pub use mock::{MockConnector, MockHandle};
pub use websocket::{WebSocketConnector, WebSocketTransport};

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(u64);

impl TransportId {
    pub fn next() -> Self {
        Self(NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,
    #[error("transport closed")]
    Closed,
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Output(OutputChunk),
    /// The stream ended without a transport error.
    Closed,
    Failed(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub transport: TransportId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(transport: TransportId, kind: TransportEventKind) -> Self {
        Self { transport, kind }
    }
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Handle to one physical connection.
pub trait Transport: Send {
    fn id(&self) -> TransportId;

    /// Queue a text message on an open connection. Never blocks.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Close the connection. Idempotent; no event is guaranteed afterwards.
    fn close(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn id(&self) -> TransportId {
        (**self).id()
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        (**self).send_text(text)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Starts connections. The handshake runs in the background; its outcome
/// is reported through `events`.
pub trait Connector {
    type Transport: Transport;

    fn connect(
        &mut self,
        target: &ConnectTarget,
        id: TransportId,
        events: EventSender,
    ) -> Self::Transport;
}
