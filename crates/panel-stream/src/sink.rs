use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Viewport size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// A zero-sized viewport means the sink has not been laid out yet.
    pub fn is_usable(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// The terminal-emulation surface that renders backend output.
///
/// Implementations must not block in `write`; it is called once per received
/// chunk, at whatever rate the backend produces them. `propose_dimensions`
/// returns `None` until the surface has a layout.
pub trait OutputSink {
    fn write(&mut self, chunk: &[u8]);

    fn clear(&mut self);

    fn propose_dimensions(&self) -> Option<Dimensions>;

    /// Reflow the surface to `dims` after a successful size proposal.
    fn reflow(&mut self, _dims: Dimensions) {}
}

impl<S: OutputSink + ?Sized> OutputSink for Box<S> {
    fn write(&mut self, chunk: &[u8]) {
        (**self).write(chunk)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn propose_dimensions(&self) -> Option<Dimensions> {
        (**self).propose_dimensions()
    }

    fn reflow(&mut self, dims: Dimensions) {
        (**self).reflow(dims)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    output: Vec<u8>,
    writes: usize,
    clears: usize,
    proposal: Option<Dimensions>,
    reflows: Vec<Dimensions>,
}

/// Recording sink. Clones share one buffer, so a test can keep a handle
/// while the controller owns another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    /// A sink that has not been laid out yet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(cols: u16, rows: u16) -> Self {
        let sink = Self::new();
        sink.set_proposal(Some(Dimensions::new(cols, rows)));
        sink
    }

    pub fn set_proposal(&self, dims: Option<Dimensions>) {
        self.state.lock().proposal = dims;
    }

    /// Everything written since the last `clear`.
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().output.clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.state.lock().output).into_owned()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().clears
    }

    pub fn reflows(&self) -> Vec<Dimensions> {
        self.state.lock().reflows.clone()
    }
}

impl OutputSink for MemorySink {
    fn write(&mut self, chunk: &[u8]) {
        let mut state = self.state.lock();
        state.output.extend_from_slice(chunk);
        state.writes += 1;
    }

    fn clear(&mut self) {
        let mut state = self.state.lock();
        state.output.clear();
        state.clears += 1;
    }

    fn propose_dimensions(&self) -> Option<Dimensions> {
        self.state.lock().proposal
    }

    fn reflow(&mut self, dims: Dimensions) {
        self.state.lock().reflows.push(dims);
    }
}
