//! Whitelist and per-domain limit lookup tables.
//!
//! Both tables use the Postfix map file layout: one `key value` pair per
//! line separated by whitespace. Blank lines and lines starting with `#`
//! are ignored. A line holding only a key maps it to an empty value, which
//! is enough for whitelist entries.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

/// Read-only key lookup consulted by the window controller.
pub trait OverrideMap: Send + Sync {
    /// Look up the value stored for `key`.
    fn get(&self, key: &str) -> Option<&str>;

    /// Whether `key` is present at all.
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// An override map held entirely in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    entries: HashMap<String, String>,
}

impl MemoryMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a map file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let map = Self::parse(&contents);

        info!(path = %path.display(), entries = map.len(), "Loaded override map");
        Ok(map)
    }

    /// Parse map file contents.
    pub fn parse(contents: &str) -> Self {
        let mut map = Self::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let Some(key) = fields.next() else {
                continue;
            };
            let value = fields.next().unwrap_or_default();
            if fields.next().is_some() {
                debug!(key = %key, "Ignoring extra fields in map entry");
            }

            map.add(key, value);
        }

        map
    }

    /// Insert or replace an entry.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl OverrideMap for MemoryMap {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MemoryMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.add(key, value);
        }
        map
    }
}
