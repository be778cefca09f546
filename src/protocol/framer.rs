//! Line reassembly over the notification byte stream.
//!
//! BLE notifications deliver the response stream in arbitrary chunks with no
//! framing beyond the protocol's carriage-return terminator. The framer
//! buffers incoming bytes and yields complete lines independent of how the
//! stream was chunked at the transport boundary.

use bytes::BytesMut;

/// The wire protocol's line terminator.
pub const LINE_TERMINATOR: u8 = b'\r';

/// Reassembles terminator-delimited lines from raw notification bytes.
///
/// One framer instance lives per session; the buffer restarts with the
/// session. No assumption is made about the largest single notification
/// payload.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: BytesMut,
}

impl LineFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feed raw bytes and collect any lines completed by them.
    ///
    /// Returned lines have the terminator stripped. Bytes after the last
    /// terminator stay buffered until a later `push` completes them.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == LINE_TERMINATOR) {
            let line = self.buffer.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Number of buffered bytes still awaiting a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the framer, returning any unterminated trailing bytes.
    ///
    /// Called at session end; the caller logs the leftovers as a protocol
    /// anomaly. They are never surfaced as a line.
    pub fn finish(self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.to_vec())
        }
    }
}
