//! Local windows: ordered pane lists plus an active-pane pointer.

use std::sync::{Arc, Mutex};

use super::layout::Layout;
use super::pane::PaneHandle;

/// Shared handle to a window; session winlinks and the client's window map
/// both hold one.
pub type WindowHandle = Arc<Mutex<Window>>;

/// A mirrored window. Windows own their panes (an ordered list); the active
/// pane is tracked by remote pane id.
pub struct Window {
    /// Remote window id (the `@W` number).
    pub id: u32,
    name: String,
    sx: u16,
    sy: u16,
    layout: Option<Layout>,
    panes: Vec<PaneHandle>,
    active: Option<u32>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("panes", &self.panes.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Window {
    pub fn new(id: u32, sx: u16, sy: u16) -> WindowHandle {
        Arc::new(Mutex::new(Self {
            id,
            name: String::new(),
            sx,
            sy,
            layout: None,
            panes: Vec::new(),
            active: None,
        }))
    }

    pub fn add_pane(&mut self, pane: PaneHandle) {
        self.panes.push(pane);
    }

    /// Seed the default single-cell layout when the first pane lands.
    pub fn init_layout(&mut self) {
        if self.layout.is_none() {
            self.layout = Some(Layout::single(u32::from(self.sx), u32::from(self.sy)));
        }
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = Some(layout);
    }

    pub fn layout(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> (u16, u16) {
        (self.sx, self.sy)
    }

    /// Make `pane_id` the active pane. Membership is the caller's contract;
    /// an unknown id is recorded anyway so a later pane add can satisfy it.
    pub fn set_active(&mut self, pane_id: u32) {
        self.active = Some(pane_id);
    }

    pub fn active_id(&self) -> Option<u32> {
        self.active
    }

    pub fn panes(&self) -> &[PaneHandle] {
        &self.panes
    }

    pub fn contains(&self, pane_id: u32) -> bool {
        self.panes
            .iter()
            .any(|p| p.lock().map(|p| p.id == pane_id).unwrap_or(false))
    }

    /// Pane id after the active one, wrapping — used for local pane cycling.
    pub fn next_pane_id(&self) -> Option<u32> {
        let ids: Vec<u32> = self
            .panes
            .iter()
            .filter_map(|p| {
                let p = p.lock().ok()?;
                (!p.is_dead()).then_some(p.id)
            })
            .collect();
        let current = self.active?;
        let pos = ids.iter().position(|&id| id == current)?;
        ids.get((pos + 1) % ids.len()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::pane::Pane;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn init_layout_only_once() {
        let w = Window::new(1, 80, 24);
        let mut w = w.lock().expect("window lock");
        w.init_layout();
        let first = w.layout().cloned();
        w.set_layout(Layout::single(100, 30));
        w.init_layout();
        assert_ne!(w.layout().cloned(), first);
    }

    #[test]
    fn pane_cycling_wraps() {
        let (tx, _rx) = unbounded_channel();
        let w = Window::new(1, 80, 24);
        let mut guard = w.lock().expect("window lock");
        guard.add_pane(Pane::new(10, 1, 80, 24, 100, tx.clone()));
        guard.add_pane(Pane::new(11, 1, 80, 24, 100, tx));
        guard.set_active(11);

        assert_eq!(guard.next_pane_id(), Some(10));
    }

    #[test]
    fn contains_checks_pane_ids() {
        let (tx, _rx) = unbounded_channel();
        let w = Window::new(1, 80, 24);
        let mut guard = w.lock().expect("window lock");
        guard.add_pane(Pane::new(10, 1, 80, 24, 100, tx));

        assert!(guard.contains(10));
        assert!(!guard.contains(99));
    }
}
