//! Local panes mirroring remote ones.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

use super::screen::PaneScreen;

/// Shared handle to a pane; the owning window and the client's pane map both
/// hold one.
pub type PaneHandle = Arc<Mutex<Pane>>;

/// Locally-typed bytes on their way to the remote, tagged with the pane
/// they were typed into.
#[derive(Debug, Clone)]
pub struct PaneInput {
    pub pane: u32,
    pub bytes: Bytes,
}

/// Channel end handed to each pane for forwarding typed bytes.
pub type InputSender = UnboundedSender<PaneInput>;

/// A mirrored pane: remote ids, an emulator screen, and the input channel
/// that bridges local keystrokes back to the remote.
pub struct Pane {
    /// Remote pane id (the `%P` number).
    pub id: u32,
    /// Remote id of the owning window. Panes only back-reference their
    /// window by id; windows own the pane list.
    pub window_id: u32,
    screen: PaneScreen,
    input_tx: InputSender,
    hlimit: usize,
    dead: bool,
}

impl std::fmt::Debug for Pane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pane")
            .field("id", &self.id)
            .field("window_id", &self.window_id)
            .field("dead", &self.dead)
            .finish_non_exhaustive()
    }
}

impl Pane {
    pub fn new(
        id: u32,
        window_id: u32,
        sx: u16,
        sy: u16,
        hlimit: usize,
        input_tx: InputSender,
    ) -> PaneHandle {
        Arc::new(Mutex::new(Self {
            id,
            window_id,
            screen: PaneScreen::new(sx, sy, hlimit),
            input_tx,
            hlimit,
            dead: false,
        }))
    }

    /// Scrollback limit the pane was created with.
    pub fn history_limit(&self) -> usize {
        self.hlimit
    }

    /// Render remote output bytes. Dead panes drop output silently.
    pub fn feed(&mut self, data: &[u8]) {
        if !self.dead {
            self.screen.feed(data);
        }
    }

    /// Send locally-typed bytes into the input bridge.
    pub fn write_input(&self, bytes: &[u8]) {
        if self.dead {
            return;
        }
        let input = PaneInput { pane: self.id, bytes: Bytes::copy_from_slice(bytes) };
        if self.input_tx.send(input).is_err() {
            log::debug!("pane %{}: input bridge closed", self.id);
        }
    }

    /// Mark the pane dead; its screen stops accepting output.
    pub fn kill(&mut self) {
        self.dead = true;
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn screen(&self) -> &PaneScreen {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut PaneScreen {
        &mut self.screen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn write_input_tags_pane_id() {
        let (tx, mut rx) = unbounded_channel();
        let pane = Pane::new(9, 1, 80, 24, 100, tx);

        pane.lock().expect("pane lock").write_input(b"\x1b[A");

        let input = rx.try_recv().expect("queued input");
        assert_eq!(input.pane, 9);
        assert_eq!(&input.bytes[..], b"\x1b[A");
    }

    #[test]
    fn dead_pane_drops_output_and_input() {
        let (tx, mut rx) = unbounded_channel();
        let pane = Pane::new(9, 1, 80, 24, 100, tx);

        let mut guard = pane.lock().expect("pane lock");
        guard.kill();
        guard.feed(b"ignored");
        guard.write_input(b"x");

        assert_eq!(guard.screen().row_text(0), "");
        drop(guard);
        assert!(rx.try_recv().is_err());
    }
}
