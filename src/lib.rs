// Library modules
pub mod client;
pub mod config;
pub mod control;
pub mod mux;
pub mod transport;
pub mod view;

// Re-export commonly used types
pub use client::Client;
pub use config::Config;
pub use control::events::Notification;
pub use control::Remote;
pub use mux::{Environ, Layout, Options, Pane, PaneScreen, Session, Window};
pub use transport::Transport;
pub use view::PaneWidget;
