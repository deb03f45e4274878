//! Control-protocol engine.
//!
//! The [`Remote`] handle owns everything needed to speak the multiplexer's
//! line-oriented control protocol and keep a local mirror of its topology.
//!
//! # Architecture
//!
//! ```text
//! transport bytes ──▶ LineFramer ──▶ per-line routing
//!                                      │
//!                         in a reply?  ├─▶ reply assembler ─▶ head of QueryQueue
//!                                      └─▶ event dispatcher ─▶ model / bootstrap
//!
//! pane keystrokes ──▶ input bridge ──▶ QueryQueue ──▶ outbound buffer
//! ```
//!
//! All state is mutated from one task; handlers run to completion between
//! reads and nothing in here blocks or locks across a suspension point.
//! Protocol violations are logged and skipped — the engine recovers on the
//! next clean `%begin`.

pub mod bridge;
pub mod escape;
pub mod events;
pub mod framer;

pub(crate) mod bootstrap;
pub(crate) mod queue;

use std::collections::BTreeMap;
use std::mem;

use bytes::{Bytes, BytesMut};

use crate::mux::{InputSender, Options, PaneHandle, Session, WindowHandle};

use self::events::Notification;
use self::framer::LineFramer;
use self::queue::{Query, QueryHandler, QueryQueue};

/// Window-map entry. A closed window keeps its key with the handle
/// tombstoned so iteration stays safe during cascading close handling.
#[derive(Debug, Default)]
pub(crate) struct WindowRecord {
    pub window: Option<WindowHandle>,
}

/// Pane-map entry. Besides the (tombstonable) pane handle this carries the
/// cursor position reported at attach time, applied once history replay for
/// both screens has finished.
#[derive(Debug)]
pub(crate) struct PaneRecord {
    pub pane: Option<PaneHandle>,
    pub init_cx: u32,
    pub init_cy: u32,
    /// Whether the primary-screen capture has already been replayed; the
    /// next history body for this pane then belongs to the alternate screen.
    pub alt_populated: bool,
}

/// Parsed `%begin`/`%end`/`%error` framing metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReplyHeader {
    time: i64,
    number: u32,
    flags: u32,
}

impl ReplyHeader {
    /// Low flag bit marks a client-originated reply (matches a pending
    /// request); the other bits are reserved.
    fn client_originated(self) -> bool {
        self.flags & 1 != 0
    }
}

/// Reply assembler state.
#[derive(Debug, Default)]
enum ReplyState {
    #[default]
    Idle,
    InReply {
        time: i64,
        number: u32,
        lines: Vec<Bytes>,
    },
}

/// One attached remote multiplexer.
pub struct Remote {
    /// Remote id of the attached session, set when a bootstrap commits.
    attached_session: Option<u32>,
    session: Option<Session>,
    windows: BTreeMap<u32, WindowRecord>,
    panes: BTreeMap<u32, PaneRecord>,

    framer: LineFramer,
    reply: ReplyState,
    queries: QueryQueue,
    outbound: BytesMut,

    options: Options,
    input_tx: InputSender,
    needs_redraw: bool,
    exited: bool,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("attached_session", &self.attached_session)
            .field("windows", &self.windows.len())
            .field("panes", &self.panes.len())
            .field("pending", &self.queries.len())
            .finish_non_exhaustive()
    }
}

impl Remote {
    /// Create a handle over a fresh transport. `input_tx` is the write end
    /// of the input bridge; every pane created during bootstrap gets a
    /// clone.
    pub fn new(options: Options, input_tx: InputSender) -> Self {
        log::info!("** enter control mode **");
        Self {
            attached_session: None,
            session: None,
            windows: BTreeMap::new(),
            panes: BTreeMap::new(),
            framer: LineFramer::new(),
            reply: ReplyState::Idle,
            queries: QueryQueue::new(),
            outbound: BytesMut::new(),
            options,
            input_tx,
            needs_redraw: false,
            exited: false,
        }
    }

    // ─── Inbound path ──────────────────────────────────────────────────

    /// Feed a chunk of transport bytes, processing every complete line.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.framer.extend(bytes);
        while let Some(line) = self.framer.next_line() {
            self.read_line(line);
        }
    }

    fn read_line(&mut self, line: Bytes) {
        log::trace!("line: {}", String::from_utf8_lossy(&line));

        if matches!(self.reply, ReplyState::InReply { .. }) {
            if line.starts_with(b"%end ") {
                self.dispatch_reply(&line, false);
            } else if line.starts_with(b"%error ") {
                self.dispatch_reply(&line, true);
            } else if let ReplyState::InReply { lines, .. } = &mut self.reply {
                lines.push(line);
            }
            return;
        }

        if line.starts_with(b"%begin ") {
            self.begin_reply(&line);
        } else if line.first() == Some(&b'%') {
            self.dispatch_event(&line);
        } else {
            log::warn!("protocol error: {}", String::from_utf8_lossy(&line));
        }
    }

    fn begin_reply(&mut self, line: &[u8]) {
        let Some(header) = parse_reply_header(line) else {
            log::warn!("protocol error: bad %begin arguments");
            return;
        };
        log::debug!("begin reply {} {}", header.number, header.time);
        self.reply = ReplyState::InReply {
            time: header.time,
            number: header.number,
            lines: Vec::new(),
        };
    }

    /// Close out the in-progress reply on `%end`/`%error` and hand the body
    /// to the head request. Any framing failure drops the body and returns
    /// the assembler to idle.
    fn dispatch_reply(&mut self, footer: &[u8], is_error: bool) {
        let ReplyState::InReply { time, number, lines } =
            mem::take(&mut self.reply)
        else {
            return;
        };

        let Some(header) = parse_reply_header(footer) else {
            log::warn!("protocol error: bad reply footer arguments");
            return;
        };
        if header.time != time || header.number != number {
            log::warn!(
                "protocol error: reply metadata mismatch ({} {} != {} {})",
                header.number,
                header.time,
                number,
                time
            );
            return;
        }

        log::debug!("reply {} {} flags {} error {}", number, time, header.flags, is_error);

        if !header.client_originated() {
            return;
        }

        let Some(mut query) = self.queries.take_head() else {
            log::warn!("error: no requests pending");
            return;
        };

        let extra = match query.handler {
            QueryHandler::Discard => {
                if is_error {
                    let msg = lines
                        .first()
                        .map(|l| String::from_utf8_lossy(l).into_owned())
                        .unwrap_or_default();
                    log::warn!("command failed: {}: {}", query.label, msg);
                }
                0
            }
            QueryHandler::Bootstrap(ref mut ctx) => {
                if is_error {
                    ctx.fail(query.label, &lines);
                    0
                } else {
                    self.bootstrap_next(ctx, &lines)
                }
            }
        };
        query.arity += extra;

        // The final reply of the bootstrap sequence promotes the staged
        // session onto this handle.
        if query.arity == 1 {
            if let QueryHandler::Bootstrap(ref mut ctx) = query.handler {
                self.bootstrap_commit(ctx);
            }
        }

        query.arity -= 1;
        if query.arity > 0 {
            self.queries.restore_head(query);
        } else {
            log::debug!("query {} complete", query.label);
        }
    }

    // ─── Event dispatch ────────────────────────────────────────────────

    fn dispatch_event(&mut self, line: &[u8]) {
        let Some(event) = events::parse(line) else {
            log::debug!("unrecognized event: {}", String::from_utf8_lossy(line));
            return;
        };

        match event {
            Notification::Output { pane, data } => self.apply_output(pane, data),
            // Flow control is not negotiated, so the age is irrelevant.
            Notification::ExtendedOutput { pane, data, .. } => self.apply_output(pane, data),
            Notification::SessionChanged { session, name } => {
                self.begin_bootstrap(session, &name);
            }
            Notification::WindowPaneChanged { window, pane } => {
                self.apply_window_pane_changed(window, pane);
            }
            Notification::WindowClose { window } => self.apply_window_close(window),
            Notification::SessionWindowChanged { session, window } => {
                self.apply_session_window_changed(session, window);
            }
            Notification::Exit => self.apply_exit(),

            // Carried by the wire but with no local state in this client:
            // renames and mode changes are cosmetic until the next attach,
            // and windows added remotely are picked up by a full bootstrap.
            Notification::PaneModeChanged { .. }
            | Notification::WindowRenamed { .. }
            | Notification::UnlinkedWindowRenamed { .. }
            | Notification::SessionRenamed { .. }
            | Notification::ClientSessionChanged { .. }
            | Notification::UnlinkedWindowClose { .. }
            | Notification::WindowAdd { .. }
            | Notification::UnlinkedWindowAdd { .. }
            | Notification::SessionsChanged => {}
        }
    }

    /// Decode an output payload and route it to the pane's screen.
    fn apply_output(&mut self, pane_id: u32, mut data: Vec<u8>) {
        let Some(pane) = self.pane(pane_id) else {
            log::warn!("output: no such pane: %{pane_id}");
            return;
        };
        escape::unescape_in_place(&mut data);
        pane.lock().expect("pane lock poisoned").feed(&data);
        self.needs_redraw = true;
    }

    fn apply_window_pane_changed(&mut self, window_id: u32, pane_id: u32) {
        let (Some(pane), Some(window)) = (self.pane(pane_id), self.window(window_id)) else {
            log::warn!("window-pane-changed @{window_id} %{pane_id}: no such pane");
            return;
        };

        let pane_window = pane.lock().expect("pane lock poisoned").window_id;
        if pane_window == window_id {
            window.lock().expect("window lock poisoned").set_active(pane_id);
            self.needs_redraw = true;
        } else {
            log::warn!("window-pane-changed @{window_id} %{pane_id}: pane and window out of sync");
        }
    }

    /// Tombstone the window and kill every pane that belonged to it.
    fn apply_window_close(&mut self, window_id: u32) {
        let closed = self.windows.get_mut(&window_id).and_then(|rec| rec.window.take());
        if closed.is_none() {
            log::warn!("window-close: window @{window_id} not found");
            return;
        }

        for record in self.panes.values_mut() {
            let belongs = record
                .pane
                .as_ref()
                .is_some_and(|p| p.lock().expect("pane lock poisoned").window_id == window_id);
            if belongs {
                if let Some(pane) = record.pane.take() {
                    pane.lock().expect("pane lock poisoned").kill();
                }
            }
        }
        self.needs_redraw = true;
    }

    fn apply_session_window_changed(&mut self, session_id: u32, window_id: u32) {
        if Some(session_id) != self.attached_session {
            return;
        }
        // A window this client has never seen is most likely newly created;
        // it will appear on the next full bootstrap.
        if self.window(window_id).is_none() {
            return;
        }
        let Some(session) = &mut self.session else {
            return;
        };
        if let Some(index) = session.winlink_of_window(window_id) {
            session.switch_current(index);
            self.needs_redraw = true;
        }
    }

    fn apply_exit(&mut self) {
        log::info!("remote exited");
        if let Some(mut session) = self.session.take() {
            session.destroy();
        }
        self.attached_session = None;
        self.exited = true;
        self.needs_redraw = true;
    }

    // ─── Outbound path ─────────────────────────────────────────────────

    /// Enqueue a query and atomically stage its command bytes for the
    /// transport.
    pub(crate) fn submit(&mut self, query: Query, wire: &str) {
        log::debug!("run {}: {}", query.label, wire.trim_end());
        self.queries.push(query);
        self.outbound.extend_from_slice(wire.as_bytes());
    }

    /// Stage additional command bytes for a query that is being extended in
    /// place (the bootstrap's history captures).
    pub(crate) fn write_wire(&mut self, wire: &str) {
        self.outbound.extend_from_slice(wire.as_bytes());
    }

    /// Drain staged outbound bytes for the transport to write and flush.
    pub fn take_outbound(&mut self) -> Bytes {
        self.outbound.split().freeze()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    // ─── Outbound notifications (local user actions) ───────────────────

    /// The user changed the active pane of `window_id` locally; tell the
    /// remote so it follows.
    pub fn notify_window_pane_changed(&mut self, window_id: u32) {
        let Some(window) = self.window(window_id) else {
            log::warn!("select-pane: window @{window_id} not tracked");
            return;
        };
        let Some(active) = window.lock().expect("window lock poisoned").active_id() else {
            return;
        };
        log::debug!("select-pane -t %{active}");
        self.submit(
            Query::new("select-pane", 1, QueryHandler::Discard),
            &format!("select-pane -t %{active}\n"),
        );
    }

    /// The user switched the session's current window locally.
    pub fn notify_session_window_changed(&mut self) {
        let Some(window) = self.session.as_ref().and_then(Session::current) else {
            return;
        };
        let id = window.lock().expect("window lock poisoned").id;
        log::debug!("select-window -t @{id}");
        self.submit(
            Query::new("select-window", 1, QueryHandler::Discard),
            &format!("select-window -t @{id}\n"),
        );
    }

    // ─── Accessors ─────────────────────────────────────────────────────

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn attached_session(&self) -> Option<u32> {
        self.attached_session
    }

    /// Live (non-tombstoned) pane by remote id.
    pub fn pane(&self, pane_id: u32) -> Option<PaneHandle> {
        self.panes.get(&pane_id).and_then(|r| r.pane.clone())
    }

    /// Live (non-tombstoned) window by remote id.
    pub fn window(&self, window_id: u32) -> Option<WindowHandle> {
        self.windows.get(&window_id).and_then(|r| r.window.clone())
    }

    /// Remote ids of all live panes, in id order.
    pub fn pane_ids(&self) -> Vec<u32> {
        self.panes
            .iter()
            .filter(|(_, r)| r.pane.is_some())
            .map(|(&id, _)| id)
            .collect()
    }

    pub fn pending_requests(&self) -> usize {
        self.queries.len()
    }

    /// Whether the remote announced `%exit`.
    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Consume the pending-redraw flag.
    pub fn take_redraw(&mut self) -> bool {
        mem::take(&mut self.needs_redraw)
    }

    pub(crate) fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }
}

/// Parse `<verb> <time> <number> <flags>` with single-space separators.
fn parse_reply_header(line: &[u8]) -> Option<ReplyHeader> {
    let text = std::str::from_utf8(line).ok()?;
    let mut parts = text.splitn(4, ' ');
    let _verb = parts.next()?;
    let time = parts.next()?.parse().ok()?;
    let number = parts.next()?.parse().ok()?;
    // Tolerate trailing text after the flags word.
    let flags = parts.next()?.split(' ').next()?.parse().ok()?;
    Some(ReplyHeader { time, number, flags })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn remote() -> Remote {
        let (tx, rx) = unbounded_channel();
        // The bridge receiver is unused in these tests; keep the channel
        // open so pane sends do not error.
        std::mem::forget(rx);
        Remote::new(Options::global(), tx)
    }

    #[test]
    fn parse_header_strict_spacing() {
        assert_eq!(
            parse_reply_header(b"%begin 100 1 1"),
            Some(ReplyHeader { time: 100, number: 1, flags: 1 })
        );
        assert_eq!(parse_reply_header(b"%begin  100 1 1"), None);
        assert_eq!(parse_reply_header(b"%begin 100 1"), None);
        assert_eq!(parse_reply_header(b"%begin x 1 1"), None);
    }

    #[test]
    fn parse_header_negative_time() {
        assert_eq!(
            parse_reply_header(b"%end -5 2 0"),
            Some(ReplyHeader { time: -5, number: 2, flags: 0 })
        );
    }

    #[test]
    fn framed_reply_pops_pending_request() {
        let mut r = remote();
        r.forward_input(1, b"x");
        let _ = r.take_outbound();
        assert_eq!(r.pending_requests(), 1);

        r.receive(b"%begin 100 1 1\nhello\n%end 100 1 1\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn mismatched_footer_drops_body_and_keeps_request() {
        let mut r = remote();
        r.forward_input(1, b"x");

        r.receive(b"%begin 100 1 1\nx\n%end 100 2 1\n");
        assert_eq!(r.pending_requests(), 1);

        // Assembler is back to idle: the next clean reply completes.
        r.receive(b"%begin 101 2 1\n%end 101 2 1\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn server_originated_reply_leaves_queue_alone() {
        let mut r = remote();
        r.forward_input(1, b"x");

        r.receive(b"%begin 100 1 0\nunsolicited\n%end 100 1 0\n");
        assert_eq!(r.pending_requests(), 1);
    }

    #[test]
    fn reply_with_no_pending_request_is_dropped() {
        let mut r = remote();
        r.receive(b"%begin 100 1 1\nbody\n%end 100 1 1\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn error_reply_pops_request() {
        let mut r = remote();
        r.forward_input(1, b"x");
        r.receive(b"%begin 100 1 1\nno such pane\n%error 100 1 1\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn begin_inside_reply_is_body_text() {
        // Captured pane content may itself contain %begin lines; they are
        // reply body, not framing.
        let mut r = remote();
        r.forward_input(1, b"x");
        r.receive(b"%begin 100 1 1\n%begin 999 9 9\n%end 100 1 1\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn plain_line_outside_reply_is_protocol_error() {
        let mut r = remote();
        // Must not panic or change state.
        r.receive(b"stray text\n");
        assert_eq!(r.pending_requests(), 0);
    }

    #[test]
    fn output_for_unknown_pane_ignored() {
        let mut r = remote();
        r.receive(b"%output %42 data\n");
        assert!(r.pane(42).is_none());
    }

    #[test]
    fn multi_body_query_stays_at_head() {
        let mut r = remote();
        r.submit(
            Query::new("multi", 2, QueryHandler::Discard),
            "show-environment -t $1;show-environment -ht $1\n",
        );
        r.forward_input(1, b"x");
        assert_eq!(r.pending_requests(), 2);

        r.receive(b"%begin 100 1 1\n%end 100 1 1\n");
        assert_eq!(r.pending_requests(), 2);

        r.receive(b"%begin 100 2 1\n%end 100 2 1\n");
        assert_eq!(r.pending_requests(), 1);

        r.receive(b"%begin 100 3 1\n%end 100 3 1\n");
        assert_eq!(r.pending_requests(), 0);
    }
}
