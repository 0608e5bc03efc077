use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::{
    Connector, EventSender, Transport, TransportError, TransportEvent, TransportEventKind,
    TransportId,
};
use crate::codec::OutputChunk;
use crate::identity::ConnectTarget;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Text(String),
    Close,
}

/// Opens WebSocket connections on the ambient tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    fn connect(
        &mut self,
        target: &ConnectTarget,
        id: TransportId,
        events: EventSender,
    ) -> WebSocketTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));
        let url = target.url().to_string();
        debug!(target: "panel::transport", transport_id = %id, url = %target, "opening websocket");
        let task = tokio::spawn(run_socket(url, id, open.clone(), rx, events));
        WebSocketTransport {
            id,
            tx,
            open,
            task: Some(task),
        }
    }
}

pub struct WebSocketTransport {
    id: TransportId,
    tx: mpsc::UnboundedSender<Outgoing>,
    /// Set by the socket task just before it reports `Opened`.
    open: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl Transport for WebSocketTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.task.is_none() {
            return Err(TransportError::Closed);
        }
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::NotOpen);
        }
        self.tx
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        // The socket task sends the close frame and exits on its own.
        if self.task.take().is_some() {
            let _ = self.tx.send(Outgoing::Close);
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn emit(events: &EventSender, id: TransportId, kind: TransportEventKind) {
    // The receiver is gone once the view unmounts; nothing left to notify.
    let _ = events.send(TransportEvent::new(id, kind));
}

async fn run_socket(
    url: String,
    id: TransportId,
    open: Arc<AtomicBool>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSender,
) {
    let connect = connect_async(url.as_str());
    tokio::pin!(connect);
    let socket = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((socket, _response)) => break socket,
                Err(err) => {
                    warn!(target: "panel::transport", transport_id = %id, error = %err, "websocket handshake failed");
                    emit(&events, id, TransportEventKind::Failed(TransportError::Handshake(err.to_string())));
                    return;
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(_)) => {
                    trace!(target: "panel::transport", transport_id = %id, "dropping send before open");
                }
                Some(Outgoing::Close) | None => {
                    debug!(target: "panel::transport", transport_id = %id, "closed before handshake completed");
                    return;
                }
            },
        }
    };

    open.store(true, Ordering::Release);
    emit(&events, id, TransportEventKind::Opened);
    pump(socket, id, outgoing, events).await;
    open.store(false, Ordering::Release);
}

async fn pump(
    socket: Socket,
    id: TransportId,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSender,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    trace!(target: "panel::transport", transport_id = %id, bytes = text.len(), "send");
                    if let Err(err) = ws_sender.send(Message::Text(text)).await {
                        emit(&events, id, TransportEventKind::Failed(TransportError::Connection(err.to_string())));
                        return;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    let _ = ws_sender.close().await;
                    debug!(target: "panel::transport", transport_id = %id, "closed by client");
                    return;
                }
            },
            message = ws_receiver.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, id, TransportEventKind::Output(OutputChunk::from(text)));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    emit(&events, id, TransportEventKind::Output(OutputChunk::from(bytes)));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target: "panel::transport", transport_id = %id, ?frame, "closed by backend");
                    emit(&events, id, TransportEventKind::Closed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(target: "panel::transport", transport_id = %id, error = %err, "websocket error");
                    emit(&events, id, TransportEventKind::Failed(TransportError::Connection(err.to_string())));
                    return;
                }
                None => {
                    emit(&events, id, TransportEventKind::Closed);
                    return;
                }
            },
        }
    }
}
