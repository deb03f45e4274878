//! Attach bootstrap: rebuild the local session from a scripted query
//! sequence.
//!
//! `%session-changed` kicks off one multi-body request — environment
//! (plain, then hidden), the pane listing, the window listing — and the
//! pane listing extends the same request with two `capture-pane` bodies per
//! pane (primary and alternate screen). A state counter advances per reply;
//! the staged session, window map, and pane map are promoted onto the
//! [`Remote`](super::Remote) only when the final body has been folded in.
//! An `%error` anywhere aborts the attach: the context is drained and
//! discarded, nothing is committed.

use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::sync::Arc;

use bytes::Bytes;

use crate::mux::{Environ, Layout, Pane, Session, Window};

use super::escape;
use super::queue::{Query, QueryHandler};
use super::{PaneRecord, Remote, WindowRecord};

/// Pane listing format: tab-separated, window fields first so panes of the
/// same window arrive under a known window record.
const PANE_FORMAT: &str = "#{window_id}\t#{window_index}\t#{window_width}\t#{window_height}\t\
                           #{pane_id}\t#{pane_index}\t#{pane_active}\t\
                           #{cursor_x}\t#{cursor_y}\t#{history_limit}";

/// Window listing format.
const WINDOW_FORMAT: &str =
    "#{window_id}\t#{window_name}\t#{window_layout}\t#{window_flags}\t#{?window_active,1,0}";

/// Disposable attach context; lives inside the bootstrap query until commit
/// or abort.
pub(crate) struct BootstrapCtx {
    /// Reply counter: 0/1 environment, 2 panes, 3 windows, ≥4 history.
    state: u32,
    session_id: u32,
    session_name: String,
    env: Environ,
    session: Option<Session>,
    windows: BTreeMap<u32, WindowRecord>,
    panes: BTreeMap<u32, PaneRecord>,
    /// Pane ids whose history bodies are still owed, in request order. The
    /// front pane's `alt_populated` flag distinguishes its two bodies.
    replay: VecDeque<u32>,
    failed: bool,
}

impl BootstrapCtx {
    fn new(session_id: u32, session_name: &str) -> Self {
        Self {
            state: 0,
            session_id,
            session_name: session_name.to_string(),
            env: Environ::new(),
            session: None,
            windows: BTreeMap::new(),
            panes: BTreeMap::new(),
            replay: VecDeque::new(),
            failed: false,
        }
    }

    /// Record a failed attach. Remaining reply bodies drain through the
    /// queue without effect and nothing is committed.
    pub(crate) fn fail(&mut self, label: &str, body: &[Bytes]) {
        let msg = body
            .first()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default();
        log::warn!("bootstrap failed: {label}: {msg}");
        self.failed = true;
    }
}

/// One row of the pane listing.
#[derive(Debug, PartialEq, Eq)]
struct PaneRow {
    window_id: u32,
    window_index: u32,
    sx: u16,
    sy: u16,
    pane_id: u32,
    pane_index: u32,
    active: bool,
    cx: u32,
    cy: u32,
    hlimit: usize,
}

impl PaneRow {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let mut num = |sigil: Option<char>| -> Option<u64> {
            let field = fields.next()?;
            let digits = match sigil {
                Some(s) => field.strip_prefix(s)?,
                None => field,
            };
            digits.parse().ok()
        };

        Some(Self {
            window_id: num(Some('@'))?.try_into().ok()?,
            window_index: num(None)?.try_into().ok()?,
            sx: num(None)?.try_into().ok()?,
            sy: num(None)?.try_into().ok()?,
            pane_id: num(Some('%'))?.try_into().ok()?,
            pane_index: num(None)?.try_into().ok()?,
            active: num(None)? != 0,
            cx: num(None)?.try_into().ok()?,
            cy: num(None)?.try_into().ok()?,
            hlimit: num(None)?.try_into().ok()?,
        })
    }
}

impl Remote {
    /// Handle `%session-changed`: tear down any existing session and issue
    /// the bootstrap query sequence.
    pub(crate) fn begin_bootstrap(&mut self, session_id: u32, name: &str) {
        log::info!("session changed: ${session_id} ({name})");

        if let Some(mut old) = self.session.take() {
            old.destroy();
        }

        let ctx = Box::new(BootstrapCtx::new(session_id, name));
        let sid = session_id;
        let wire = format!(
            "show-environment -t ${sid};\
             show-environment -ht ${sid};\
             list-panes -st ${sid} -F \"{PANE_FORMAT}\";\
             list-windows -t ${sid} -F \"{WINDOW_FORMAT}\"\n"
        );
        self.submit(Query::new("bootstrap", 4, QueryHandler::Bootstrap(ctx)), &wire);
    }

    /// Fold one successful reply body into the attach context. Returns the
    /// number of additional reply bodies the request now expects.
    pub(crate) fn bootstrap_next(&mut self, ctx: &mut BootstrapCtx, body: &[Bytes]) -> u32 {
        if ctx.failed {
            return 0;
        }

        log::debug!("bootstrap state {}", ctx.state);
        let state = ctx.state;
        ctx.state += 1;

        match state {
            0 => {
                parse_environment(&mut ctx.env, body, false);
                0
            }
            1 => {
                parse_environment(&mut ctx.env, body, true);
                let env = mem::take(&mut ctx.env);
                ctx.session =
                    Some(Session::new(&ctx.session_name, env, self.options.clone()));
                0
            }
            2 => {
                self.add_panes(ctx, body);
                self.request_history(ctx)
            }
            3 => {
                self.fix_windows(ctx, body);
                0
            }
            _ => {
                self.populate_history(ctx, body);
                0
            }
        }
    }

    /// Promote the staged model onto the handle once the final body landed.
    pub(crate) fn bootstrap_commit(&mut self, ctx: &mut BootstrapCtx) {
        if ctx.failed {
            return;
        }
        log::info!("bootstrap finished: ${} ({})", ctx.session_id, ctx.session_name);

        self.attached_session = Some(ctx.session_id);
        self.session = ctx.session.take();
        self.windows = mem::take(&mut ctx.windows);
        self.panes = mem::take(&mut ctx.panes);
        self.request_redraw();
    }

    /// Build windows and panes from the `list-panes` reply.
    fn add_panes(&mut self, ctx: &mut BootstrapCtx, body: &[Bytes]) {
        for line in body {
            let text = String::from_utf8_lossy(line);
            log::debug!("pane: {text}");

            let Some(row) = PaneRow::parse(&text) else {
                log::warn!("bootstrap: bad pane listing row: {text:?}");
                continue;
            };
            let Some(session) = ctx.session.as_mut() else {
                log::warn!("bootstrap: pane listing before session");
                return;
            };

            let existing = ctx.windows.get(&row.window_id).and_then(|r| r.window.clone());
            let (window, first_pane) = match existing {
                Some(w) => (w, false),
                None => {
                    let w = Window::new(row.window_id, row.sx, row.sy);
                    session.add_winlink(row.window_index, Arc::clone(&w));
                    ctx.windows.insert(
                        row.window_id,
                        WindowRecord { window: Some(Arc::clone(&w)) },
                    );
                    (w, true)
                }
            };

            // The remote's scrollback may run far deeper than this client
            // will hold; session options cap what each pane stores, and
            // capture depth follows the clamped value.
            let hlimit = row.hlimit.min(session.options().history_limit());

            let pane = Pane::new(
                row.pane_id,
                row.window_id,
                row.sx,
                row.sy,
                hlimit,
                self.input_tx.clone(),
            );

            {
                let mut w = window.lock().expect("window lock poisoned");
                w.add_pane(Arc::clone(&pane));
                if first_pane {
                    w.init_layout();
                }
                if row.active || first_pane {
                    w.set_active(row.pane_id);
                }
            }

            ctx.panes.insert(
                row.pane_id,
                PaneRecord {
                    pane: Some(pane),
                    init_cx: row.cx,
                    init_cy: row.cy,
                    alt_populated: false,
                },
            );
        }
    }

    /// Extend the bootstrap request with a primary and an alternate screen
    /// capture per pane.
    fn request_history(&mut self, ctx: &mut BootstrapCtx) -> u32 {
        let mut wire = String::new();
        let mut extra = 0;

        for (&pane_id, record) in &ctx.panes {
            let Some(pane) = &record.pane else { continue };
            let hlimit = pane.lock().expect("pane lock poisoned").history_limit();
            wire.push_str(&format!(
                "capture-pane -peqCJN -S -{hlimit} -t %{pane_id} ; \
                 capture-pane -apeqCJN -S -{hlimit} -t %{pane_id}\n"
            ));
            ctx.replay.push_back(pane_id);
            extra += 2;
        }

        self.write_wire(&wire);
        extra
    }

    /// Apply names, layouts, and the active window from the `list-windows`
    /// reply.
    fn fix_windows(&mut self, ctx: &mut BootstrapCtx, body: &[Bytes]) {
        for line in body {
            let text = String::from_utf8_lossy(line);
            log::debug!("window: {text}");

            let mut fields = text.split('\t');
            let id: u32 = match fields.next().and_then(|f| f.strip_prefix('@')).and_then(|d| d.parse().ok())
            {
                Some(id) => id,
                None => {
                    log::warn!("bootstrap: bad window listing row: {text:?}");
                    continue;
                }
            };
            let name = fields.next().unwrap_or_default();
            let layout = fields.next().unwrap_or_default();
            let _flags = fields.next().unwrap_or_default();
            let active = fields.next().is_some_and(|f| f == "1");

            let Some(window) = ctx.windows.get(&id).and_then(|r| r.window.clone()) else {
                log::warn!("bootstrap: window @{id} has no panes");
                continue;
            };

            {
                let mut w = window.lock().expect("window lock poisoned");
                match Layout::parse(layout) {
                    Ok(parsed) => w.set_layout(parsed),
                    Err(err) => log::warn!("window @{id}: bad layout: {err}"),
                }
                w.set_name(name);
            }

            if active {
                if let Some(session) = ctx.session.as_mut() {
                    if let Some(index) = session.winlink_of_window(id) {
                        session.switch_current(index);
                    }
                }
            }
        }
    }

    /// Feed one captured screen into the front replay pane: first body is
    /// the primary screen, second the alternate; after the alternate the
    /// attach-time cursor position is restored.
    fn populate_history(&mut self, ctx: &mut BootstrapCtx, body: &[Bytes]) {
        let Some(&pane_id) = ctx.replay.front() else {
            log::warn!("bootstrap: unexpected history body");
            return;
        };
        let Some(record) = ctx.panes.get_mut(&pane_id) else {
            ctx.replay.pop_front();
            return;
        };
        let Some(pane) = record.pane.clone() else {
            ctx.replay.pop_front();
            return;
        };

        log::debug!(
            "populate history %{pane_id} ({})",
            if record.alt_populated { "alternate" } else { "primary" }
        );

        // Each body line is escape-decoded, then the lines are rejoined
        // with CR/LF for the emulator.
        let mut text = Vec::new();
        for (i, line) in body.iter().enumerate() {
            if i > 0 {
                text.extend_from_slice(b"\r\n");
            }
            text.extend(escape::unescape(line));
        }

        let mut p = pane.lock().expect("pane lock poisoned");
        if record.alt_populated {
            p.screen_mut().enter_alternate();
            p.screen_mut().feed(&text);
            p.screen_mut().leave_alternate();
            p.screen_mut().move_cursor(record.init_cx, record.init_cy);
            ctx.replay.pop_front();
        } else {
            p.screen_mut().feed(&text);
            record.alt_populated = true;
        }
    }
}

/// Apply `show-environment` reply lines: `NAME=VALUE` sets, `-NAME` clears
/// (and on the hidden pass, marks the variable hidden and empty first).
fn parse_environment(env: &mut Environ, body: &[Bytes], hidden: bool) {
    for line in body {
        let text = String::from_utf8_lossy(line);
        if let Some(name) = text.strip_prefix('-') {
            if hidden {
                env.set(name, "", true);
            }
            env.clear(name);
        } else {
            env.put(&text, hidden);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_row_parses_sigils_and_fields() {
        let row = PaneRow::parse("@1\t0\t80\t24\t%3\t0\t1\t12\t5\t2000").expect("valid row");
        assert_eq!(
            row,
            PaneRow {
                window_id: 1,
                window_index: 0,
                sx: 80,
                sy: 24,
                pane_id: 3,
                pane_index: 0,
                active: true,
                cx: 12,
                cy: 5,
                hlimit: 2000,
            }
        );
    }

    #[test]
    fn pane_row_rejects_missing_sigil() {
        assert!(PaneRow::parse("1\t0\t80\t24\t%3\t0\t1\t12\t5\t2000").is_none());
        assert!(PaneRow::parse("@1\t0\t80\t24\t3\t0\t1\t12\t5\t2000").is_none());
    }

    #[test]
    fn pane_row_rejects_short_rows() {
        assert!(PaneRow::parse("@1\t0\t80\t24").is_none());
    }

    #[test]
    fn environment_set_and_clear() {
        let mut env = Environ::new();
        let body = vec![
            Bytes::from_static(b"PATH=/usr/bin"),
            Bytes::from_static(b"-GONE"),
        ];
        parse_environment(&mut env, &body, false);

        assert_eq!(env.get("PATH").and_then(|e| e.value.as_deref()), Some("/usr/bin"));
        assert_eq!(env.get("GONE").and_then(|e| e.value.as_deref()), None);
    }

    #[test]
    fn hidden_pass_marks_cleared_vars_hidden() {
        let mut env = Environ::new();
        parse_environment(&mut env, &[Bytes::from_static(b"-TOKEN")], true);

        let entry = env.get("TOKEN").expect("entry");
        assert!(entry.hidden);
        assert_eq!(entry.value, None);
    }
}
