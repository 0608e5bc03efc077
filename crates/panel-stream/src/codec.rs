//! Client to backend control plane.
//!
//! Only this direction is framed. Backend output is forwarded verbatim as an
//! [`OutputChunk`], escape sequences included, so nothing here ever parses it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sink::Dimensions;

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("failed to encode control frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed control frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Messages the client sends over the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Raw keystrokes or pasted text, forwarded to the remote process untouched.
    Input { data: String },

    /// Viewport size in character cells.
    Resize { cols: u16, rows: u16 },
}

impl ControlFrame {
    pub fn input(data: impl Into<String>) -> Self {
        ControlFrame::Input { data: data.into() }
    }

    pub fn resize(dims: Dimensions) -> Self {
        ControlFrame::Resize {
            cols: dims.cols,
            rows: dims.rows,
        }
    }

    pub fn is_resize(&self) -> bool {
        matches!(self, ControlFrame::Resize { .. })
    }

    pub fn encode(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Encode)
    }

    /// Backends and test doubles use this side; the client never decodes its
    /// own frames.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(CodecError::Decode)
    }
}

/// A chunk of backend output. Text and binary messages are treated alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk(Bytes);

impl OutputChunk {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for OutputChunk {
    fn from(text: String) -> Self {
        Self(Bytes::from(text))
    }
}

impl From<&str> for OutputChunk {
    fn from(text: &str) -> Self {
        Self(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<Vec<u8>> for OutputChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for OutputChunk {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}
