//! Session lifecycle.
//!
//! ```text
//! Idle ──start──▶ Connecting ──opened──▶ Open ──closed──▶ Closed
//!                     │                    │
//!                     └──failed──▶ Errored ◀┘
//! ```
//!
//! Every transition is driven by a caller action or a transport event; there
//! are no timers, keep-alives or reconnects. A new session only starts from
//! an explicit `start`. The controller owns at most one transport at a time
//! and ignores events from any transport but the current one.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::codec::{ControlFrame, OutputChunk};
use crate::error::SessionError;
use crate::identity::{
    CredentialSource, IdentityResolver, Intent, LogCategory, MountContext, ResolveError,
    SessionIdentity,
};
use crate::negotiator::DimensionNegotiator;
use crate::sink::{Dimensions, OutputSink};
use crate::transport::{
    Connector, EventReceiver, EventSender, Transport, TransportError, TransportEvent,
    TransportEventKind, TransportId,
};

/// Keystrokes held between `Open` and the first resize report.
const HELD_INPUT_LIMIT: usize = 1024;

const STOPPED_BANNER: &str = "\r\n\x1b[31m[STREAM STOPPED]\x1b[0m\r\n";
const CLOSED_BANNER: &str = "\r\n\x1b[31m[CONNECTION CLOSED]\x1b[0m\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// The user stopped the stream.
    Stopped,
    /// The backend ended the stream.
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed(CloseCause),
    Errored,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Open)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closed(CloseCause::Stopped) => "stopped",
            SessionState::Closed(CloseCause::Remote) => "closed",
            SessionState::Errored => "errored",
        };
        f.write_str(label)
    }
}

struct ActiveSession<T> {
    transport: T,
    identity: SessionIdentity,
}

pub struct SessionController<S: OutputSink, C: Connector> {
    context: MountContext,
    resolver: IdentityResolver,
    credentials: Arc<dyn CredentialSource>,
    connector: C,
    sink: S,
    negotiator: DimensionNegotiator,
    state: SessionState,
    active: Option<ActiveSession<C::Transport>>,
    held_input: Vec<String>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    torn_down: bool,
}

impl<S: OutputSink, C: Connector> SessionController<S, C> {
    pub fn new(
        context: MountContext,
        resolver: IdentityResolver,
        credentials: Arc<dyn CredentialSource>,
        connector: C,
        sink: S,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            context,
            resolver,
            credentials,
            connector,
            sink,
            negotiator: DimensionNegotiator::new(),
            state: SessionState::Idle,
            active: None,
            held_input: Vec::new(),
            events_tx,
            events_rx,
            torn_down: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn context(&self) -> &MountContext {
        &self.context
    }

    /// Identity of the live session, if any.
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.active.as_ref().map(|active| &active.identity)
    }

    pub fn active_transport(&self) -> Option<TransportId> {
        self.active.as_ref().map(|active| active.transport.id())
    }

    /// Size last reported to the backend on the current connection.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.negotiator.reported()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn held_input(&self) -> usize {
        self.held_input.len()
    }

    /// View mounted: shells connect right away, log tails wait for `start`.
    pub fn mount(&mut self) -> Result<(), SessionError> {
        debug!(target: "panel::session", intent = ?self.context.intent, "view mounted");
        self.negotiator.recompute(&mut self.sink, false);
        if self.context.intent.auto_connects() {
            self.start()?;
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<TransportId, SessionError> {
        if self.torn_down {
            return Err(SessionError::Unmounted);
        }
        if self.state.is_live() {
            let identity = self
                .identity()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(SessionError::AlreadyActive {
                identity,
                state: self.state.to_string(),
            });
        }

        let identity = SessionIdentity::from_mount(&self.context)?;
        let credential = self
            .credentials
            .current()
            .ok_or(ResolveError::MissingCredential)?;
        let target = self.resolver.resolve(&identity, &credential)?;

        let id = TransportId::next();
        info!(target: "panel::session", transport_id = %id, identity = %identity, url = %target, "starting session");
        self.negotiator.reset();
        self.held_input.clear();
        let transport = self.connector.connect(&target, id, self.events_tx.clone());
        self.active = Some(ActiveSession {
            transport,
            identity,
        });
        self.transition(SessionState::Connecting);
        Ok(id)
    }

    /// Close the live session. Returns false when there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.release() else {
            return false;
        };
        self.transition(SessionState::Closed(CloseCause::Stopped));
        if active.identity.is_log_tail() {
            self.sink.write(STOPPED_BANNER.as_bytes());
        }
        true
    }

    pub fn set_category(&mut self, category: LogCategory) -> Result<(), SessionError> {
        if self.context.intent != Intent::Logs {
            return Err(SessionError::NotLogView);
        }
        if self.state.is_live() {
            return Err(SessionError::CategoryLocked);
        }
        if self.context.category != category {
            debug!(target: "panel::session", %category, "log category selected");
            self.context.category = category;
        }
        Ok(())
    }

    pub fn select_resource(&mut self, resource: Option<String>) -> Result<(), SessionError> {
        if self.state.is_live() {
            return Err(SessionError::ResourceLocked);
        }
        debug!(target: "panel::session", resource = ?resource, "resource selected");
        self.context.resource = resource;
        Ok(())
    }

    /// Forward keystrokes. Dropped unless the session is open.
    pub fn send_input(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        if self.state != SessionState::Open {
            trace!(target: "panel::session", state = %self.state, bytes = data.len(), "input dropped");
            return;
        }
        if !self.negotiator.initial_reported() {
            if self.held_input.len() >= HELD_INPUT_LIMIT {
                warn!(target: "panel::session", "input held too long waiting for layout; dropping");
                return;
            }
            self.held_input.push(data.to_string());
            return;
        }
        self.send_frame(ControlFrame::input(data));
    }

    /// Window resize or sink layout change.
    pub fn on_resize_signal(&mut self) {
        let open = self.state == SessionState::Open;
        let first = !self.negotiator.initial_reported();
        if let Some(frame) = self.negotiator.recompute(&mut self.sink, open) {
            self.send_frame(frame);
            if first {
                self.flush_held_input();
            }
        }
    }

    /// Write a local message into the sink without touching session state.
    pub fn notice(&mut self, text: &str) {
        self.sink
            .write(format!("\r\n\x1b[33m{text}\x1b[0m\r\n").as_bytes());
    }

    /// Next event from any transport this controller started.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    /// Handle every event already queued. Returns how many were taken.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        if self.active_transport() != Some(event.transport) {
            trace!(target: "panel::session", transport_id = %event.transport, "ignoring event from stale transport");
            return;
        }
        match event.kind {
            TransportEventKind::Opened => self.on_opened(),
            TransportEventKind::Output(chunk) => self.on_output(chunk),
            TransportEventKind::Closed => self.on_remote_closed(),
            TransportEventKind::Failed(err) => self.on_failed(err),
        }
    }

    /// Release the transport and stop listening. Runs on drop as well.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if self.release().is_some() {
            self.transition(SessionState::Closed(CloseCause::Stopped));
        }
        self.events_rx.close();
        debug!(target: "panel::session", "view unmounted");
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.transition(SessionState::Open);

        if let Some(frame) = self.negotiator.on_open(&mut self.sink) {
            self.send_frame(frame);
        }

        let banner = match self.identity() {
            Some(SessionIdentity::LogTailFor(resource, category)) => Some(format!(
                "\x1b[34m[STREAMING] {category} logs for {resource}\x1b[0m\r\n"
            )),
            _ => None,
        };
        self.sink.clear();
        if let Some(banner) = banner {
            self.sink.write(banner.as_bytes());
        }

        if self.negotiator.initial_reported() {
            self.flush_held_input();
        }
    }

    fn on_output(&mut self, chunk: OutputChunk) {
        if self.state != SessionState::Open {
            trace!(target: "panel::session", state = %self.state, "output before open dropped");
            return;
        }
        self.sink.write(chunk.as_bytes());
    }

    fn on_remote_closed(&mut self) {
        let Some(active) = self.release() else {
            return;
        };
        self.transition(SessionState::Closed(CloseCause::Remote));
        if active.identity.is_log_tail() {
            self.sink.write(CLOSED_BANNER.as_bytes());
        }
    }

    fn on_failed(&mut self, err: TransportError) {
        if self.release().is_none() {
            return;
        }
        warn!(target: "panel::session", error = %err, "session errored");
        self.transition(SessionState::Errored);
        self.sink.write(
            format!("\r\n\x1b[31m[CONNECTION ERROR] {err}\x1b[0m\r\n").as_bytes(),
        );
    }

    fn release(&mut self) -> Option<ActiveSession<C::Transport>> {
        let mut active = self.active.take()?;
        active.transport.close();
        self.negotiator.reset();
        self.held_input.clear();
        Some(active)
    }

    fn flush_held_input(&mut self) {
        for data in std::mem::take(&mut self.held_input) {
            self.send_frame(ControlFrame::input(data));
        }
    }

    fn send_frame(&mut self, frame: ControlFrame) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let text = match frame.encode() {
            Ok(text) => text,
            Err(err) => {
                warn!(target: "panel::session", error = %err, "dropping unencodable frame");
                return;
            }
        };
        if let Err(err) = active.transport.send_text(text) {
            debug!(target: "panel::session", error = %err, "frame dropped");
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(target: "panel::session", from = %self.state, to = %next, "state change");
            self.state = next;
        }
    }
}

impl<S: OutputSink, C: Connector> Drop for SessionController<S, C> {
    fn drop(&mut self) {
        self.teardown();
    }
}
