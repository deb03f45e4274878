//! Session environment mirrored from `show-environment` replies.
//!
//! Entry syntax on the wire: `NAME=VALUE` sets a variable, `-NAME` marks it
//! cleared. A cleared entry is kept with no value (it shadows the outer
//! environment rather than disappearing), and the hidden pass additionally
//! flags its entries as hidden.

use std::collections::BTreeMap;

/// One environment variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvEntry {
    /// `None` means cleared (explicitly unset on the remote).
    pub value: Option<String>,
    pub hidden: bool,
}

/// An ordered `NAME → entry` map.
#[derive(Debug, Clone, Default)]
pub struct Environ {
    entries: BTreeMap<String, EnvEntry>,
}

impl Environ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `NAME=VALUE` line. Lines without `=` are not valid
    /// assignments and are skipped.
    pub fn put(&mut self, line: &str, hidden: bool) {
        let Some((name, value)) = line.split_once('=') else {
            log::debug!("environ: ignoring malformed entry: {line:?}");
            return;
        };
        self.set(name, value, hidden);
    }

    pub fn set(&mut self, name: &str, value: &str, hidden: bool) {
        self.entries
            .insert(name.to_string(), EnvEntry { value: Some(value.to_string()), hidden });
    }

    /// Mark `name` cleared, keeping any hidden flag already present.
    pub fn clear(&mut self, name: &str) {
        self.entries.entry(name.to_string()).or_default().value = None;
    }

    pub fn get(&self, name: &str) -> Option<&EnvEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EnvEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
