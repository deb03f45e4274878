//! Terminal-emulator screen behind each mirrored pane.
//!
//! Wraps [`alacritty_terminal`]'s `Term` + vte `Processor` behind a byte-feed
//! interface, so remote-originated output is rendered exactly as a local
//! process's output would be. History replay drives both grids through the
//! emulator itself: the primary capture is fed directly, then the screen is
//! switched to the alternate grid (DECSET 1049), the alternate capture is
//! fed, and the switch is undone — both screens end up populated without the
//! pane ever appearing to change mode.

use alacritty_terminal::event::EventListener;
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point};
use alacritty_terminal::term::{Config, Term, TermMode};
use alacritty_terminal::vte::ansi::Processor;

/// Floor for screen dimensions; zero-sized grids are not constructible.
const MIN_DIM: u16 = 1;

/// Minimal [`Dimensions`] implementor for constructing and resizing a `Term`.
#[derive(Debug, Clone, Copy)]
struct GridSize {
    columns: usize,
    screen_lines: usize,
}

impl Dimensions for GridSize {
    fn columns(&self) -> usize {
        self.columns
    }

    fn screen_lines(&self) -> usize {
        self.screen_lines
    }

    fn total_lines(&self) -> usize {
        // Scrollback grows dynamically via Config::scrolling_history.
        self.screen_lines
    }
}

/// Event listener that discards terminal events.
///
/// Title changes, bell, and clipboard requests from a mirrored pane have no
/// local consumer; the remote is authoritative for all of them.
#[derive(Debug, Clone, Copy)]
pub struct VoidListener;

impl EventListener for VoidListener {
    fn send_event(&self, _event: alacritty_terminal::event::Event) {}
}

/// A pane's terminal screen: emulator state machine plus grid.
pub struct PaneScreen {
    term: Term<VoidListener>,
    processor: Processor,
}

impl std::fmt::Debug for PaneScreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaneScreen")
            .field("cols", &self.term.grid().columns())
            .field("rows", &self.term.grid().screen_lines())
            .field("history", &self.history_size())
            .finish_non_exhaustive()
    }
}

impl PaneScreen {
    /// Create a screen of `sx` columns by `sy` rows with `hlimit` lines of
    /// scrollback.
    pub fn new(sx: u16, sy: u16, hlimit: usize) -> Self {
        let size = GridSize {
            columns: sx.max(MIN_DIM) as usize,
            screen_lines: sy.max(MIN_DIM) as usize,
        };
        let config = Config { scrolling_history: hlimit, ..Config::default() };
        Self {
            term: Term::new(config, &size, VoidListener),
            processor: Processor::new(),
        }
    }

    /// Feed raw output bytes through the emulator.
    pub fn feed(&mut self, data: &[u8]) {
        self.processor.advance(&mut self.term, data);
    }

    pub fn resize(&mut self, sx: u16, sy: u16) {
        let size = GridSize {
            columns: sx.max(MIN_DIM) as usize,
            screen_lines: sy.max(MIN_DIM) as usize,
        };
        self.term.resize(size);
    }

    /// `(columns, rows)` of the viewport.
    pub fn size(&self) -> (u16, u16) {
        let grid = self.term.grid();
        (grid.columns() as u16, grid.screen_lines() as u16)
    }

    /// Viewport cursor position as `(x, y)` from the top-left.
    pub fn cursor(&self) -> (u16, u16) {
        let point = self.term.grid().cursor.point;
        (point.column.0 as u16, point.line.0.max(0) as u16)
    }

    /// Lines currently stored in scrollback.
    pub fn history_size(&self) -> usize {
        self.term.grid().history_size()
    }

    /// Whether DECCKM application-cursor mode is active; the key encoder
    /// must mirror it when encoding arrow keys.
    pub fn application_cursor(&self) -> bool {
        self.term.mode().contains(TermMode::APP_CURSOR)
    }

    /// Switch rendering to the alternate grid.
    pub fn enter_alternate(&mut self) {
        self.feed(b"\x1b[?1049h");
    }

    /// Switch back to the primary grid, leaving the alternate contents in
    /// place for the next switch.
    pub fn leave_alternate(&mut self) {
        self.feed(b"\x1b[?1049l");
    }

    /// Place the cursor at `(x, y)` (0-based viewport coordinates).
    pub fn move_cursor(&mut self, x: u32, y: u32) {
        self.feed(format!("\x1b[{};{}H", y + 1, x + 1).as_bytes());
    }

    /// Borrow the underlying `Term` for rendering.
    pub fn term(&self) -> &Term<VoidListener> {
        &self.term
    }

    /// Plain-text contents of the viewport, rows joined with `\n`.
    ///
    /// Test and diagnostics helper; rendering goes through [`Self::term`].
    pub fn contents(&self) -> String {
        let grid = self.term.grid();
        let mut out = String::new();
        for row in 0..grid.screen_lines() {
            if row > 0 {
                out.push('\n');
            }
            for col in 0..grid.columns() {
                out.push(grid[Point::new(Line(row as i32), Column(col))].c);
            }
        }
        out
    }

    /// One trimmed viewport row.
    pub fn row_text(&self, row: u16) -> String {
        let grid = self.term.grid();
        let mut out = String::new();
        if (row as usize) < grid.screen_lines() {
            for col in 0..grid.columns() {
                out.push(grid[Point::new(Line(row as i32), Column(col))].c);
            }
        }
        out.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_clamps_zero_dims() {
        let s = PaneScreen::new(0, 0, 100);
        assert_eq!(s.size(), (MIN_DIM, MIN_DIM));
    }

    #[test]
    fn feed_renders_text() {
        let mut s = PaneScreen::new(80, 24, 100);
        s.feed(b"hello");
        assert_eq!(s.row_text(0), "hello");
        assert_eq!(s.cursor(), (5, 0));
    }

    #[test]
    fn resize_updates_dims() {
        let mut s = PaneScreen::new(80, 24, 100);
        s.resize(120, 40);
        assert_eq!(s.size(), (120, 40));
    }

    #[test]
    fn move_cursor_is_zero_based() {
        let mut s = PaneScreen::new(80, 24, 100);
        s.move_cursor(3, 7);
        assert_eq!(s.cursor(), (3, 7));
    }

    #[test]
    fn alternate_round_trip_preserves_primary() {
        let mut s = PaneScreen::new(80, 24, 100);
        s.feed(b"primary line");

        s.enter_alternate();
        s.feed(b"ALT CONTENT");
        s.leave_alternate();

        assert_eq!(s.row_text(0), "primary line");
    }

    #[test]
    fn application_cursor_tracks_decckm() {
        let mut s = PaneScreen::new(80, 24, 100);
        assert!(!s.application_cursor());
        s.feed(b"\x1b[?1h");
        assert!(s.application_cursor());
        s.feed(b"\x1b[?1l");
        assert!(!s.application_cursor());
    }

    #[test]
    fn scrollback_accumulates() {
        let mut s = PaneScreen::new(80, 4, 100);
        for i in 0..10 {
            s.feed(format!("line {i}\r\n").as_bytes());
        }
        assert!(s.history_size() > 0);
    }
}
