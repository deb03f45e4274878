//! Line framing for the inbound control stream.
//!
//! The remote terminates lines with `\n`, `\r\n`, or `\n\r`; either order of
//! the pair is consumed whole. Incomplete trailing bytes stay buffered until
//! the next read.

use bytes::{Buf, Bytes, BytesMut};

/// Accumulates raw transport bytes and drains complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the transport.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drain the next complete line, without its terminator.
    ///
    /// A `\r` directly before or after the `\n` is consumed as part of the
    /// terminator; a lone `\r` elsewhere stays in the payload.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let nl = self.buf.iter().position(|&b| b == b'\n')?;

        let line_end = if nl > 0 && self.buf[nl - 1] == b'\r' {
            nl - 1
        } else {
            nl
        };

        let line = self.buf.split_to(line_end).freeze();
        // Drop the terminator: the `\n` itself, any `\r` just before it, and
        // (when the pair arrived reversed) the `\r` just after it.
        let mut consumed = nl - line_end + 1;
        if line_end == nl && self.buf.get(consumed) == Some(&b'\r') {
            consumed += 1;
        }
        self.buf.advance(consumed);

        Some(line)
    }

    /// Bytes held back waiting for a terminator.
    #[cfg(test)]
    fn pending(&self) -> &[u8] {
        &self.buf
    }
}
