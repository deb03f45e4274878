//! Server options consumed by the model.
//!
//! The core only ever reads numbers (`history-limit`, the scrollback
//! ceiling applied to panes at attach), so the store is a flat name →
//! number map built from configuration and passed down as a dependency
//! rather than read from ambient state.

use std::collections::BTreeMap;

/// Default scrollback limit when configuration does not override it.
pub const DEFAULT_HISTORY_LIMIT: i64 = 2_000;

/// A set of named numeric options.
#[derive(Debug, Clone)]
pub struct Options {
    numbers: BTreeMap<String, i64>,
}

impl Options {
    /// The global option set seeded with defaults.
    pub fn global() -> Self {
        let mut numbers = BTreeMap::new();
        numbers.insert("history-limit".to_string(), DEFAULT_HISTORY_LIMIT);
        Self { numbers }
    }

    pub fn set_number(&mut self, name: &str, value: i64) {
        self.numbers.insert(name.to_string(), value);
    }

    pub fn get_number(&self, name: &str) -> Option<i64> {
        self.numbers.get(name).copied()
    }

    /// Scrollback ceiling for new panes; listing-reported limits are
    /// clamped to this.
    pub fn history_limit(&self) -> usize {
        self.get_number("history-limit")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT as usize)
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::global()
    }
}
