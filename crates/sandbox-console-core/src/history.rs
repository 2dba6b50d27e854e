//! Command history with persistence and a recall cursor.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::StorageError;

pub const MAX_HISTORY_ENTRIES: usize = 200;

/// Synchronous string store backing the history (`localStorage` in a page).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::default();
        store.values.borrow_mut().insert(key.into(), value.into());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Ordered list of submitted commands.
///
/// The cursor ranges over `0..=len`; `len` is the fresh-input position.
/// Persistence failures are ignored and the history keeps working in memory.
pub struct HistoryStore {
    key: String,
    store: Box<dyn KeyValueStore>,
    entries: Vec<String>,
    cursor: usize,
}

impl HistoryStore {
    pub fn load(key: impl Into<String>, store: Box<dyn KeyValueStore>) -> Self {
        let key = key.into();
        let entries = match store.get(&key) {
            Ok(Some(raw)) => decode_entries(&raw),
            Ok(None) => Vec::new(),
            Err(error) => {
                tracing::debug!(%error, key = %key, "command history unavailable");
                Vec::new()
            }
        };
        let cursor = entries.len();
        Self {
            key,
            store,
            entries,
            cursor,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Appends a command unless it repeats the previous one, then persists.
    pub fn push(&mut self, command: &str) {
        let command = command.trim();
        if command.is_empty() {
            return;
        }

        if self.entries.last().map(String::as_str) != Some(command) {
            self.entries.push(command.to_string());
        }
        if self.entries.len() > MAX_HISTORY_ENTRIES {
            let overflow = self.entries.len() - MAX_HISTORY_ENTRIES;
            self.entries.drain(..overflow);
        }
        self.persist();
        self.cursor = self.entries.len();
    }

    pub fn prev(&mut self) -> &str {
        if self.entries.is_empty() {
            return "";
        }
        self.cursor = self.cursor.saturating_sub(1);
        self.entries
            .get(self.cursor)
            .map_or("", String::as_str)
    }

    pub fn next(&mut self) -> &str {
        if self.entries.is_empty() {
            return "";
        }
        self.cursor = (self.cursor + 1).min(self.entries.len());
        self.entries
            .get(self.cursor)
            .map_or("", String::as_str)
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = self.entries.len();
    }

    /// The last `count` entries with their zero-based position in the full history.
    pub fn recent(&self, count: usize) -> impl Iterator<Item = (usize, &str)> + '_ {
        let start = self.entries.len().saturating_sub(count);
        self.entries[start..]
            .iter()
            .enumerate()
            .map(move |(offset, command)| (start + offset, command.as_str()))
    }

    fn persist(&self) {
        let encoded = match serde_json::to_string(&self.entries) {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::debug!(%error, "failed to encode command history");
                return;
            }
        };
        if let Err(error) = self.store.set(&self.key, &encoded) {
            tracing::debug!(%error, key = %self.key, "failed to persist command history");
        }
    }
}

fn decode_entries(raw: &str) -> Vec<String> {
    let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Vec::new();
    };
    let mut entries = items
        .into_iter()
        .filter_map(|item| match item {
            serde_json::Value::String(command) => Some(command),
            _ => None,
        })
        .collect::<Vec<_>>();
    if entries.len() > MAX_HISTORY_ENTRIES {
        entries.drain(..entries.len() - MAX_HISTORY_ENTRIES);
    }
    entries
}
