//! Parsing of asynchronous `%`-prefixed notification lines.
//!
//! Each pattern is tried in order and the first match wins, mirroring the
//! wire grammar: exact verb, single-space separators, sigil-prefixed numeric
//! ids (`$` session, `@` window, `%` pane), and free-form trailing text
//! captured to end of line. Unrecognized or malformed lines yield `None`
//! and are logged and skipped by the dispatcher.

/// A parsed notification from the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `%output %P <data>` — escaped output bytes for a pane.
    Output { pane: u32, data: Vec<u8> },
    /// `%extended-output %P <age> : <data>` — flow-controlled variant; the
    /// age is parsed and ignored.
    ExtendedOutput { pane: u32, age: u64, data: Vec<u8> },
    /// `%session-changed $S <name>` — the attached session changed.
    SessionChanged { session: u32, name: String },
    /// `%pane-mode-changed %P`
    PaneModeChanged { pane: u32 },
    /// `%window-renamed @W <name>`
    WindowRenamed { window: u32, name: String },
    /// `%unlinked-window-renamed @W <name>`
    UnlinkedWindowRenamed { window: u32, name: String },
    /// `%session-renamed $S <name>`
    SessionRenamed { session: u32, name: String },
    /// `%client-session-changed <pty> $S <name>`
    ClientSessionChanged { pty: String, session: u32, name: String },
    /// `%window-pane-changed @W %P`
    WindowPaneChanged { window: u32, pane: u32 },
    /// `%window-close @W`
    WindowClose { window: u32 },
    /// `%unlinked-window-close @W`
    UnlinkedWindowClose { window: u32 },
    /// `%window-add @W`
    WindowAdd { window: u32 },
    /// `%unlinked-window-add @W`
    UnlinkedWindowAdd { window: u32 },
    /// `%session-window-changed $S @W`
    SessionWindowChanged { session: u32, window: u32 },
    /// `%sessions-changed`
    SessionsChanged,
    /// `%exit`
    Exit,
}

/// Left-to-right scanner over one notification line.
struct LineScanner<'a> {
    rest: &'a [u8],
}

impl<'a> LineScanner<'a> {
    fn new(line: &'a [u8]) -> Self {
        Self { rest: line }
    }

    /// Consume an exact literal.
    fn tag(&mut self, tag: &str) -> Option<()> {
        self.rest = self.rest.strip_prefix(tag.as_bytes())?;
        Some(())
    }

    /// Consume exactly one space.
    fn space(&mut self) -> Option<()> {
        self.tag(" ")
    }

    /// Consume an unsigned decimal number.
    fn uint(&mut self) -> Option<u64> {
        let digits = self.rest.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 {
            return None;
        }
        let (head, tail) = self.rest.split_at(digits);
        self.rest = tail;
        std::str::from_utf8(head).ok()?.parse().ok()
    }

    /// Consume a sigil-prefixed id (`$3`, `@1`, `%7`).
    fn id(&mut self, sigil: u8) -> Option<u32> {
        self.rest = self.rest.strip_prefix(&[sigil][..])?;
        self.uint()?.try_into().ok()
    }

    /// Consume a non-empty run of bytes up to the next space.
    fn word(&mut self) -> Option<&'a [u8]> {
        let len = self.rest.iter().take_while(|&&b| b != b' ').count();
        if len == 0 {
            return None;
        }
        let (head, tail) = self.rest.split_at(len);
        self.rest = tail;
        Some(head)
    }

    /// Everything left on the line, possibly empty.
    fn rest(self) -> &'a [u8] {
        self.rest
    }

    fn at_end(&self) -> bool {
        self.rest.is_empty()
    }
}

/// One pattern attempt; each starts a fresh scan of the whole line.
macro_rules! attempt {
    ($line:expr, $body:expr) => {{
        let matcher = $body;
        if let Some(n) = matcher(LineScanner::new($line)) {
            return Some(n);
        }
    }};
}

/// Parse one framed `%`-line into a [`Notification`].
pub fn parse(line: &[u8]) -> Option<Notification> {
    attempt!(line, |mut s: LineScanner| {
        s.tag("%output")?;
        s.space()?;
        let pane = s.id(b'%')?;
        s.space()?;
        Some(Notification::Output { pane, data: s.rest().to_vec() })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%extended-output")?;
        s.space()?;
        let pane = s.id(b'%')?;
        s.space()?;
        let age = s.uint()?;
        s.space()?;
        s.tag(":")?;
        s.space()?;
        Some(Notification::ExtendedOutput { pane, age, data: s.rest().to_vec() })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%session-changed")?;
        s.space()?;
        let session = s.id(b'$')?;
        s.space()?;
        Some(Notification::SessionChanged { session, name: text(s.rest()) })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%pane-mode-changed")?;
        s.space()?;
        let pane = s.id(b'%')?;
        s.at_end().then_some(Notification::PaneModeChanged { pane })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%window-renamed")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.space()?;
        Some(Notification::WindowRenamed { window, name: text(s.rest()) })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%unlinked-window-renamed")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.space()?;
        Some(Notification::UnlinkedWindowRenamed { window, name: text(s.rest()) })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%session-renamed")?;
        s.space()?;
        let session = s.id(b'$')?;
        s.space()?;
        Some(Notification::SessionRenamed { session, name: text(s.rest()) })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%client-session-changed")?;
        s.space()?;
        let pty = text(s.word()?);
        s.space()?;
        let session = s.id(b'$')?;
        s.space()?;
        Some(Notification::ClientSessionChanged { pty, session, name: text(s.rest()) })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%window-pane-changed")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.space()?;
        let pane = s.id(b'%')?;
        s.at_end().then_some(Notification::WindowPaneChanged { window, pane })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%window-close")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.at_end().then_some(Notification::WindowClose { window })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%unlinked-window-close")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.at_end().then_some(Notification::UnlinkedWindowClose { window })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%window-add")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.at_end().then_some(Notification::WindowAdd { window })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%unlinked-window-add")?;
        s.space()?;
        let window = s.id(b'@')?;
        s.at_end().then_some(Notification::UnlinkedWindowAdd { window })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%session-window-changed")?;
        s.space()?;
        let session = s.id(b'$')?;
        s.space()?;
        let window = s.id(b'@')?;
        s.at_end().then_some(Notification::SessionWindowChanged { session, window })
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%sessions-changed")?;
        s.at_end().then_some(Notification::SessionsChanged)
    });

    attempt!(line, |mut s: LineScanner| {
        s.tag("%exit")?;
        Some(Notification::Exit)
    });

    None
}

/// Free-form trailing text; names are decoded lossily, payload bytes are
/// kept raw elsewhere.
fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output() {
        assert_eq!(
            parse(b"%output %7 a\\101b"),
            Some(Notification::Output { pane: 7, data: b"a\\101b".to_vec() })
        );
    }

    #[test]
    fn output_empty_data() {
        assert_eq!(
            parse(b"%output %7 "),
            Some(Notification::Output { pane: 7, data: Vec::new() })
        );
    }

    #[test]
    fn output_requires_data_separator() {
        assert_eq!(parse(b"%output %7"), None);
    }

    #[test]
    fn extended_output() {
        assert_eq!(
            parse(b"%extended-output %3 1507 : bytes here"),
            Some(Notification::ExtendedOutput {
                pane: 3,
                age: 1507,
                data: b"bytes here".to_vec()
            })
        );
    }

    #[test]
    fn session_changed() {
        assert_eq!(
            parse(b"%session-changed $3 main"),
            Some(Notification::SessionChanged { session: 3, name: "main".into() })
        );
    }

    #[test]
    fn session_name_keeps_spaces() {
        assert_eq!(
            parse(b"%session-changed $0 two words"),
            Some(Notification::SessionChanged { session: 0, name: "two words".into() })
        );
    }

    #[test]
    fn client_session_changed() {
        assert_eq!(
            parse(b"%client-session-changed /dev/ttys004 $1 work"),
            Some(Notification::ClientSessionChanged {
                pty: "/dev/ttys004".into(),
                session: 1,
                name: "work".into()
            })
        );
    }

    #[test]
    fn window_pane_changed() {
        assert_eq!(
            parse(b"%window-pane-changed @2 %11"),
            Some(Notification::WindowPaneChanged { window: 2, pane: 11 })
        );
    }

    #[test]
    fn window_close() {
        assert_eq!(parse(b"%window-close @5"), Some(Notification::WindowClose { window: 5 }));
    }

    #[test]
    fn unlinked_variants() {
        assert_eq!(
            parse(b"%unlinked-window-add @9"),
            Some(Notification::UnlinkedWindowAdd { window: 9 })
        );
        assert_eq!(
            parse(b"%unlinked-window-close @9"),
            Some(Notification::UnlinkedWindowClose { window: 9 })
        );
    }

    #[test]
    fn session_window_changed() {
        assert_eq!(
            parse(b"%session-window-changed $1 @4"),
            Some(Notification::SessionWindowChanged { session: 1, window: 4 })
        );
    }

    #[test]
    fn bare_events() {
        assert_eq!(parse(b"%sessions-changed"), Some(Notification::SessionsChanged));
        assert_eq!(parse(b"%exit"), Some(Notification::Exit));
    }

    #[test]
    fn wrong_sigil_rejected() {
        assert_eq!(parse(b"%window-close %5"), None);
        assert_eq!(parse(b"%output @7 data"), None);
    }

    #[test]
    fn unknown_event_rejected() {
        assert_eq!(parse(b"%subscription-changed foo"), None);
    }

    #[test]
    fn double_space_rejected() {
        assert_eq!(parse(b"%window-close  @5"), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics(input in proptest::collection::vec(any::<u8>(), 0..128)) {
                let _ = parse(&input);
            }
        }
    }
}
