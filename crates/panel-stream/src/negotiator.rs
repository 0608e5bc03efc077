//! Viewport size reporting.
//!
//! The backend holds the remote process until it has seen one `resize`
//! frame, so the first report goes out synchronously inside the open
//! handler. Later reports are sent only when the size actually changes.

use tracing::{debug, trace};

use crate::codec::ControlFrame;
use crate::sink::{Dimensions, OutputSink};

#[derive(Debug, Default)]
pub struct DimensionNegotiator {
    /// Last size reported over the current connection.
    reported: Option<Dimensions>,
    /// Last usable size the sink proposed, connected or not.
    latest: Option<Dimensions>,
    /// Connection is open but the sink could not be measured yet.
    awaiting_initial: bool,
}

impl DimensionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size last communicated to the backend on the current connection.
    pub fn reported(&self) -> Option<Dimensions> {
        self.reported
    }

    pub fn latest(&self) -> Option<Dimensions> {
        self.latest
    }

    /// True once the current connection has received its first report.
    pub fn initial_reported(&self) -> bool {
        self.reported.is_some()
    }

    pub fn awaiting_initial(&self) -> bool {
        self.awaiting_initial
    }

    /// Connection just opened: measure and report unconditionally.
    pub fn on_open<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> Option<ControlFrame> {
        self.reported = None;
        self.awaiting_initial = true;
        let frame = self.recompute(sink, true);
        if frame.is_none() {
            debug!(target: "panel::negotiator", "sink not laid out at open; initial resize deferred");
        }
        frame
    }

    /// A resize signal or layout pass. Returns the frame to send, if any.
    pub fn recompute<S: OutputSink + ?Sized>(
        &mut self,
        sink: &mut S,
        link_open: bool,
    ) -> Option<ControlFrame> {
        let dims = match sink.propose_dimensions() {
            Some(dims) if dims.is_usable() => dims,
            proposal => {
                trace!(target: "panel::negotiator", ?proposal, "no usable proposal");
                return None;
            }
        };

        if self.latest != Some(dims) {
            sink.reflow(dims);
            self.latest = Some(dims);
        }

        if !link_open || self.reported == Some(dims) {
            return None;
        }

        debug!(target: "panel::negotiator", cols = dims.cols, rows = dims.rows, initial = self.awaiting_initial, "report resize");
        self.reported = Some(dims);
        self.awaiting_initial = false;
        Some(ControlFrame::resize(dims))
    }

    /// Connection gone; the next one starts from scratch.
    pub fn reset(&mut self) {
        self.reported = None;
        self.awaiting_initial = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn nothing_is_reported_while_offline() {
        let mut sink = MemorySink::with_dimensions(100, 30);
        let mut negotiator = DimensionNegotiator::new();
        assert_eq!(negotiator.recompute(&mut sink, false), None);
        assert_eq!(negotiator.latest(), Some(Dimensions::new(100, 30)));
        assert_eq!(sink.reflows(), vec![Dimensions::new(100, 30)]);
        assert_eq!(negotiator.reported(), None);
    }

    #[test]
    fn open_reports_current_size() {
        let mut sink = MemorySink::with_dimensions(80, 24);
        let mut negotiator = DimensionNegotiator::new();
        let frame = negotiator.on_open(&mut sink);
        assert_eq!(frame, Some(ControlFrame::Resize { cols: 80, rows: 24 }));
        assert!(negotiator.initial_reported());
        assert!(!negotiator.awaiting_initial());
    }

    #[test]
    fn unchanged_viewport_reports_once() {
        let mut sink = MemorySink::with_dimensions(80, 24);
        let mut negotiator = DimensionNegotiator::new();
        negotiator.on_open(&mut sink);
        assert_eq!(negotiator.recompute(&mut sink, true), None);
        assert_eq!(negotiator.recompute(&mut sink, true), None);
        assert_eq!(sink.reflows().len(), 1);
    }

    #[test]
    fn changed_viewport_is_reported() {
        let mut sink = MemorySink::with_dimensions(80, 24);
        let mut negotiator = DimensionNegotiator::new();
        negotiator.on_open(&mut sink);
        sink.set_proposal(Some(Dimensions::new(120, 40)));
        assert_eq!(
            negotiator.recompute(&mut sink, true),
            Some(ControlFrame::Resize { cols: 120, rows: 40 })
        );
    }

    #[test]
    fn unlaid_sink_defers_until_next_layout() {
        let mut sink = MemorySink::new();
        let mut negotiator = DimensionNegotiator::new();
        assert_eq!(negotiator.on_open(&mut sink), None);
        assert!(negotiator.awaiting_initial());

        sink.set_proposal(Some(Dimensions::new(0, 0)));
        assert_eq!(negotiator.recompute(&mut sink, true), None);
        assert!(negotiator.awaiting_initial());

        sink.set_proposal(Some(Dimensions::new(90, 20)));
        assert_eq!(
            negotiator.recompute(&mut sink, true),
            Some(ControlFrame::Resize { cols: 90, rows: 20 })
        );
        assert!(!negotiator.awaiting_initial());
    }

    #[test]
    fn reopen_reports_again_with_same_size() {
        let mut sink = MemorySink::with_dimensions(80, 24);
        let mut negotiator = DimensionNegotiator::new();
        negotiator.on_open(&mut sink);
        negotiator.reset();
        assert!(!negotiator.initial_reported());
        assert_eq!(
            negotiator.on_open(&mut sink),
            Some(ControlFrame::Resize { cols: 80, rows: 24 })
        );
    }
}
