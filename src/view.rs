//! Rendering mirrored panes and encoding keystrokes.
//!
//! [`PaneWidget`] draws a [`PaneScreen`] grid into a ratatui buffer; cell
//! colors and flags are mapped straight from the alacritty cell. The key
//! encoder turns crossterm events into the byte sequences a terminal would
//! produce, honoring the pane's application-cursor mode so full-screen
//! programs see the arrow sequences they asked for.

use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point};
use alacritty_terminal::term::cell::Flags;
use alacritty_terminal::vte::ansi::{Color, NamedColor};

use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::Line as TextLine,
    widgets::{Paragraph, Widget},
    Frame,
};

use crate::control::Remote;
use crate::mux::PaneScreen;

/// Widget rendering the viewport of one pane screen.
#[derive(Debug)]
pub struct PaneWidget<'a> {
    screen: &'a PaneScreen,
    show_cursor: bool,
}

impl<'a> PaneWidget<'a> {
    pub fn new(screen: &'a PaneScreen) -> Self {
        Self { screen, show_cursor: true }
    }

    pub fn hide_cursor(mut self) -> Self {
        self.show_cursor = false;
        self
    }
}

impl Widget for PaneWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let grid = self.screen.term().grid();
        let rows = (area.height as usize).min(grid.screen_lines());
        let cols = (area.width as usize).min(grid.columns());

        for row in 0..rows {
            for col in 0..cols {
                let cell = &grid[Point::new(Line(row as i32), Column(col))];

                // Wide-char continuation cells render as part of the base
                // character in the preceding cell.
                if cell.flags.contains(Flags::WIDE_CHAR_SPACER) {
                    continue;
                }

                let buf_cell = &mut buf[(area.x + col as u16, area.y + row as u16)];
                apply_cell(cell, buf_cell);
            }
        }

        if self.show_cursor {
            let (cx, cy) = self.screen.cursor();
            if (cx as usize) < cols && (cy as usize) < rows {
                buf[(area.x + cx, area.y + cy)]
                    .set_style(Style::default().add_modifier(Modifier::REVERSED));
            }
        }
    }
}

/// Copy one alacritty cell into a ratatui buffer cell.
fn apply_cell(cell: &alacritty_terminal::term::cell::Cell, buf_cell: &mut ratatui::buffer::Cell) {
    if cell.c != ' ' && cell.c != '\0' {
        let mut symbol = String::with_capacity(4);
        symbol.push(cell.c);
        if let Some(zerowidth) = cell.zerowidth() {
            for &zw in zerowidth {
                symbol.push(zw);
            }
        }
        buf_cell.set_symbol(&symbol);
    }

    let mut style = Style::default()
        .fg(to_ratatui_color(cell.fg))
        .bg(to_ratatui_color(cell.bg));
    if cell.flags.contains(Flags::BOLD) {
        style = style.add_modifier(Modifier::BOLD);
    }
    if cell.flags.contains(Flags::ITALIC) {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if cell.flags.contains(Flags::UNDERLINE) {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    if cell.flags.contains(Flags::INVERSE) {
        style = style.add_modifier(Modifier::REVERSED);
    }
    if cell.flags.contains(Flags::DIM) {
        style = style.add_modifier(Modifier::DIM);
    }
    if cell.flags.contains(Flags::STRIKEOUT) {
        style = style.add_modifier(Modifier::CROSSED_OUT);
    }
    buf_cell.set_style(style);
}

/// Map an alacritty color to a ratatui color.
pub fn to_ratatui_color(color: Color) -> ratatui::style::Color {
    use ratatui::style::Color as C;
    match color {
        Color::Named(name) => match name {
            NamedColor::Black | NamedColor::DimBlack => C::Indexed(0),
            NamedColor::Red | NamedColor::DimRed => C::Indexed(1),
            NamedColor::Green | NamedColor::DimGreen => C::Indexed(2),
            NamedColor::Yellow | NamedColor::DimYellow => C::Indexed(3),
            NamedColor::Blue | NamedColor::DimBlue => C::Indexed(4),
            NamedColor::Magenta | NamedColor::DimMagenta => C::Indexed(5),
            NamedColor::Cyan | NamedColor::DimCyan => C::Indexed(6),
            NamedColor::White | NamedColor::DimWhite => C::Indexed(7),
            NamedColor::BrightBlack => C::Indexed(8),
            NamedColor::BrightRed => C::Indexed(9),
            NamedColor::BrightGreen => C::Indexed(10),
            NamedColor::BrightYellow => C::Indexed(11),
            NamedColor::BrightBlue => C::Indexed(12),
            NamedColor::BrightMagenta => C::Indexed(13),
            NamedColor::BrightCyan => C::Indexed(14),
            NamedColor::BrightWhite => C::Indexed(15),
            _ => C::Reset,
        },
        Color::Indexed(idx) => C::Indexed(idx),
        Color::Spec(rgb) => C::Rgb(rgb.r, rgb.g, rgb.b),
    }
}

/// Encode a key event as the bytes a terminal would send.
///
/// `application_cursor` selects SS3 arrow sequences (`ESC O A`) over CSI
/// ones (`ESC [ A`), mirroring the pane's DECCKM state.
pub fn key_to_bytes(
    code: KeyCode,
    modifiers: KeyModifiers,
    application_cursor: bool,
) -> Option<Vec<u8>> {
    let arrow = |letter: u8| -> Vec<u8> {
        if application_cursor {
            vec![0x1b, b'O', letter]
        } else {
            vec![0x1b, b'[', letter]
        }
    };

    match code {
        KeyCode::Char(c) => {
            if modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() {
                // Ctrl+A = 1, Ctrl+B = 2, …
                Some(vec![(c.to_ascii_uppercase() as u8) - b'@'])
            } else {
                Some(c.to_string().into_bytes())
            }
        }
        KeyCode::Backspace => Some(vec![0x7f]),
        KeyCode::Enter => Some(vec![b'\r']),
        KeyCode::Esc => Some(vec![0x1b]),
        KeyCode::Tab => Some(vec![b'\t']),
        KeyCode::BackTab => Some(b"\x1b[Z".to_vec()),
        KeyCode::Up => Some(arrow(b'A')),
        KeyCode::Down => Some(arrow(b'B')),
        KeyCode::Right => Some(arrow(b'C')),
        KeyCode::Left => Some(arrow(b'D')),
        KeyCode::Home => Some(b"\x1b[H".to_vec()),
        KeyCode::End => Some(b"\x1b[F".to_vec()),
        KeyCode::PageUp => Some(b"\x1b[5~".to_vec()),
        KeyCode::PageDown => Some(b"\x1b[6~".to_vec()),
        KeyCode::Delete => Some(b"\x1b[3~".to_vec()),
        KeyCode::Insert => Some(b"\x1b[2~".to_vec()),
        _ => None,
    }
}

/// Draw the whole client frame: the active pane plus a one-line status bar.
pub fn draw(frame: &mut Frame, remote: &Remote) {
    let [pane_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    match active_screen(remote) {
        Some((pane, _)) => {
            let pane = pane.lock().expect("pane lock poisoned");
            frame.render_widget(PaneWidget::new(pane.screen()), pane_area);
        }
        None => {
            frame.render_widget(
                Paragraph::new("attaching...").style(Style::default().add_modifier(Modifier::DIM)),
                pane_area,
            );
        }
    }

    frame.render_widget(
        Paragraph::new(TextLine::from(status_line(remote)))
            .style(Style::default().add_modifier(Modifier::REVERSED)),
        status_area,
    );
}

/// The active pane of the session's current window, with its remote window
/// id.
pub fn active_screen(remote: &Remote) -> Option<(crate::mux::PaneHandle, u32)> {
    let session = remote.session()?;
    let window = session.current()?;
    let (window_id, active) = {
        let w = window.lock().expect("window lock poisoned");
        (w.id, w.active_id()?)
    };
    let pane = remote.pane(active)?;
    Some((pane, window_id))
}

/// `[name] 0:shell 1:editor*` — winlink list with the current one starred.
fn status_line(remote: &Remote) -> String {
    let Some(session) = remote.session() else {
        return String::from("[muxlink] not attached");
    };
    let mut out = format!("[{}]", session.name());
    for (index, window) in session.winlinks() {
        let w = window.lock().expect("window lock poisoned");
        let marker = if Some(index) == session.current_index() { "*" } else { "" };
        out.push_str(&format!(" {index}:{}{marker}", w.name()));
    }
    out
}
