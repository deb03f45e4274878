//! Local model of the mirrored multiplexer.
//!
//! Sessions link windows by index, windows own ordered pane lists, and panes
//! back-reference their window by remote id only, which keeps the object
//! graph acyclic. Everything is keyed by the remote's numeric ids; nothing
//! here talks to the wire.

pub mod environ;
pub mod layout;
pub mod options;
pub mod pane;
pub mod screen;
pub mod session;
pub mod window;

pub use environ::Environ;
pub use layout::Layout;
pub use options::Options;
pub use pane::{InputSender, Pane, PaneHandle, PaneInput};
pub use screen::PaneScreen;
pub use session::Session;
pub use window::{Window, WindowHandle};
