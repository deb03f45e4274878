//! Input bridge: locally-typed bytes become `send-keys` commands.
//!
//! Every pane created during bootstrap holds the write end of one shared
//! channel; the client loop drains it and calls [`Remote::forward_input`],
//! which hex-encodes the bytes and submits a literal-hex `send-keys` for
//! the originating pane.

use super::queue::{Query, QueryHandler};
use super::Remote;

/// Encode bytes as space-separated uppercase hex pairs, with a trailing
/// space after the last pair (`A B` → `"41 42 "`).
pub fn hex_encode_keys(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for b in bytes {
        out.push_str(&format!("{b:02X} "));
    }
    out
}

impl Remote {
    /// Forward typed bytes from a local pane to the remote.
    ///
    /// The request has no success action; a failure surfaces through the
    /// error path of the reply dispatcher.
    pub fn forward_input(&mut self, pane_id: u32, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let hex = hex_encode_keys(bytes);
        self.submit(
            Query::new("send-keys", 1, QueryHandler::Discard),
            &format!("send-keys -t %{pane_id} -lH {hex}\n"),
        );
    }
}
