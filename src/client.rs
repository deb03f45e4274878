//! The attached client: one task wiring transport, engine, bridge, and
//! view together.
//!
//! Everything runs on a single `select!` loop — transport chunks, bridged
//! pane input, and terminal events are handled to completion one at a
//! time, so the engine needs no internal locking. Outbound command bytes
//! staged by the engine are flushed at the top of every iteration.

use std::io::Stdout;

use anyhow::{Context, Result};
use bytes::BytesMut;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::control::Remote;
use crate::mux::{Options, PaneInput};
use crate::transport::Transport;
use crate::view;

/// One `select!` outcome, applied after the futures are dropped.
enum LoopEvent {
    Transport(std::io::Result<usize>),
    Input(PaneInput),
    Key(KeyEvent),
    Redraw,
    Closed,
    Skip,
}

/// The running client.
pub struct Client {
    remote: Remote,
    transport: Transport,
    input_rx: UnboundedReceiver<PaneInput>,
    /// A prefix key was pressed; the next key is a local command.
    prefix_pending: bool,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("remote", &self.remote).finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(options: Options, transport: Transport) -> Self {
        let (input_tx, input_rx) = unbounded_channel();
        Self {
            remote: Remote::new(options, input_tx),
            transport,
            input_rx,
            prefix_pending: false,
        }
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    /// Run with the interactive TUI until the remote exits or the user
    /// detaches.
    pub async fn run(mut self) -> Result<()> {
        enable_raw_mode().context("could not enable raw mode")?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen).context("could not enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("could not create terminal")?;

        let result = self.run_tui(&mut terminal).await;

        // Always restore the outer terminal, even on error.
        let _ = disable_raw_mode();
        let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
        result
    }

    async fn run_tui(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut events = EventStream::new();
        let mut read_buf = BytesMut::with_capacity(16 * 1024);

        loop {
            self.flush_outbound().await?;
            terminal
                .draw(|frame| view::draw(frame, &self.remote))
                .context("could not draw frame")?;

            let event = tokio::select! {
                read = self.transport.read_chunk(&mut read_buf) => LoopEvent::Transport(read),
                input = self.input_rx.recv() => match input {
                    Some(input) => LoopEvent::Input(input),
                    None => LoopEvent::Skip,
                },
                term = events.next() => match term {
                    Some(Ok(Event::Key(key))) => LoopEvent::Key(key),
                    Some(Ok(Event::Resize(..))) => LoopEvent::Redraw,
                    Some(Ok(_)) => LoopEvent::Skip,
                    Some(Err(err)) => {
                        log::warn!("terminal event error: {err}");
                        LoopEvent::Skip
                    }
                    None => LoopEvent::Closed,
                },
            };

            match event {
                LoopEvent::Transport(read) => {
                    let n = read.context("transport read failed")?;
                    if n == 0 {
                        log::info!("transport closed");
                        return Ok(());
                    }
                    let chunk = read_buf.split().freeze();
                    self.remote.receive(&chunk);
                    if self.remote.is_exited() {
                        return Ok(());
                    }
                }
                LoopEvent::Input(input) => {
                    self.remote.forward_input(input.pane, &input.bytes);
                }
                LoopEvent::Key(key) => {
                    if key.kind != KeyEventKind::Release && self.handle_key(key) {
                        return Ok(());
                    }
                }
                LoopEvent::Redraw | LoopEvent::Skip => {}
                LoopEvent::Closed => return Ok(()),
            }
        }
    }

    /// Run without a TUI; mirrors state and bridges nothing but the wire.
    pub async fn run_headless(mut self) -> Result<()> {
        let mut read_buf = BytesMut::with_capacity(16 * 1024);

        loop {
            self.flush_outbound().await?;

            let event = tokio::select! {
                read = self.transport.read_chunk(&mut read_buf) => LoopEvent::Transport(read),
                input = self.input_rx.recv() => match input {
                    Some(input) => LoopEvent::Input(input),
                    None => LoopEvent::Skip,
                },
            };

            match event {
                LoopEvent::Transport(read) => {
                    let n = read.context("transport read failed")?;
                    if n == 0 {
                        log::info!("transport closed");
                        return Ok(());
                    }
                    let chunk = read_buf.split().freeze();
                    self.remote.receive(&chunk);
                    if self.remote.is_exited() {
                        return Ok(());
                    }
                }
                LoopEvent::Input(input) => {
                    self.remote.forward_input(input.pane, &input.bytes);
                }
                _ => {}
            }
        }
    }

    async fn flush_outbound(&mut self) -> Result<()> {
        if self.remote.has_outbound() {
            let bytes = self.remote.take_outbound();
            self.transport.send(&bytes).await.context("transport write failed")?;
        }
        Ok(())
    }

    /// Handle one key press. Returns `true` when the user detached.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        const PREFIX: KeyCode = KeyCode::Char('b');

        if self.prefix_pending {
            self.prefix_pending = false;
            match key.code {
                KeyCode::Char('n') => self.switch_window(true),
                KeyCode::Char('p') => self.switch_window(false),
                KeyCode::Char('o') => self.cycle_pane(),
                KeyCode::Char('d') | KeyCode::Char('q') => return true,
                // Prefix twice sends the prefix byte itself.
                PREFIX if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    self.forward_key_bytes(&[0x02]);
                }
                _ => {}
            }
            return false;
        }

        if key.code == PREFIX && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.prefix_pending = true;
            return false;
        }

        let Some((pane, _)) = view::active_screen(&self.remote) else {
            return false;
        };
        let app_cursor = {
            let p = pane.lock().expect("pane lock poisoned");
            p.screen().application_cursor()
        };
        if let Some(bytes) = view::key_to_bytes(key.code, key.modifiers, app_cursor) {
            pane.lock().expect("pane lock poisoned").write_input(&bytes);
        }
        false
    }

    fn forward_key_bytes(&mut self, bytes: &[u8]) {
        if let Some((pane, _)) = view::active_screen(&self.remote) {
            pane.lock().expect("pane lock poisoned").write_input(bytes);
        }
    }

    /// Switch the local current window and let the remote follow.
    fn switch_window(&mut self, forward: bool) {
        let Some(session) = self.remote.session_mut() else { return };
        let next = if forward { session.next_index() } else { session.prev_index() };
        let Some(index) = next else { return };
        session.switch_current(index);
        self.remote.notify_session_window_changed();
        self.remote.request_redraw();
    }

    /// Cycle the active pane of the current window and notify the remote.
    fn cycle_pane(&mut self) {
        let Some((_, window_id)) = view::active_screen(&self.remote) else { return };
        let Some(window) = self.remote.window(window_id) else { return };
        let next = window.lock().expect("window lock poisoned").next_pane_id();
        if let Some(next) = next {
            window.lock().expect("window lock poisoned").set_active(next);
            self.remote.notify_window_pane_changed(window_id);
            self.remote.request_redraw();
        }
    }
}
