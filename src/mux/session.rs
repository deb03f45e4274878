//! The local session: winlinks (index → window) and the current-window
//! pointer.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::environ::Environ;
use super::options::Options;
use super::window::WindowHandle;

/// A mirrored session.
///
/// Winlinks map the remote's window *indexes* to window objects; the current
/// window is tracked by winlink index. Remote window *ids* are resolved
/// through [`Session::winlink_of_window`].
pub struct Session {
    name: String,
    environ: Environ,
    options: Options,
    winlinks: BTreeMap<u32, WindowHandle>,
    curw: Option<u32>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("windows", &self.winlinks.len())
            .field("curw", &self.curw)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(name: &str, environ: Environ, options: Options) -> Self {
        Self {
            name: name.to_string(),
            environ,
            options,
            winlinks: BTreeMap::new(),
            curw: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environ(&self) -> &Environ {
        &self.environ
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Link `window` at `index`. The first link becomes current.
    pub fn add_winlink(&mut self, index: u32, window: WindowHandle) {
        self.winlinks.insert(index, window);
        if self.curw.is_none() {
            self.curw = Some(index);
        }
    }

    pub fn winlinks(&self) -> impl Iterator<Item = (u32, &WindowHandle)> {
        self.winlinks.iter().map(|(&i, w)| (i, w))
    }

    pub fn window_at(&self, index: u32) -> Option<WindowHandle> {
        self.winlinks.get(&index).cloned()
    }

    /// First winlink index referencing the window with remote id
    /// `window_id`.
    pub fn winlink_of_window(&self, window_id: u32) -> Option<u32> {
        self.winlinks.iter().find_map(|(&index, w)| {
            (w.lock().ok()?.id == window_id).then_some(index)
        })
    }

    pub fn current_index(&self) -> Option<u32> {
        self.curw
    }

    pub fn current(&self) -> Option<WindowHandle> {
        self.curw.and_then(|i| self.window_at(i))
    }

    /// Point the session at the winlink with `index`; unknown indexes are
    /// ignored.
    pub fn switch_current(&mut self, index: u32) {
        if self.winlinks.contains_key(&index) {
            self.curw = Some(index);
        }
    }

    /// Winlink index after the current one, wrapping.
    pub fn next_index(&self) -> Option<u32> {
        self.adjacent_index(true)
    }

    /// Winlink index before the current one, wrapping.
    pub fn prev_index(&self) -> Option<u32> {
        self.adjacent_index(false)
    }

    fn adjacent_index(&self, forward: bool) -> Option<u32> {
        let indexes: Vec<u32> = self.winlinks.keys().copied().collect();
        let pos = indexes.iter().position(|&i| Some(i) == self.curw)?;
        let len = indexes.len();
        let next = if forward { (pos + 1) % len } else { (pos + len - 1) % len };
        indexes.get(next).copied()
    }

    /// Kill every pane in every window. Called before the session handle is
    /// dropped so shared pane handles elsewhere observe the death.
    pub fn destroy(&mut self) {
        for window in self.winlinks.values() {
            let panes: Vec<_> = match window.lock() {
                Ok(w) => w.panes().iter().map(Arc::clone).collect(),
                Err(_) => continue,
            };
            for pane in panes {
                if let Ok(mut p) = pane.lock() {
                    p.kill();
                }
            }
        }
        self.winlinks.clear();
        self.curw = None;
    }
}
