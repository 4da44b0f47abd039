//! Abbreviation-tolerant lookup of operations by name.
//!
//! The table is built once and never mutated afterwards. Entries are kept
//! sorted so a prefix lookup is a binary search for the first candidate
//! followed by a scan over the contiguous run of names sharing the prefix.
use crate::error::{HyperadminError, Result};

#[derive(Debug)]
pub struct CommandTableBuilder<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for CommandTableBuilder<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T> CommandTableBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers `operation` under `name`. A later registration of the same
    /// name replaces the earlier one.
    pub fn register(mut self, name: &str, operation: T) -> Self {
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.push((name.to_string(), operation));
        self
    }
    pub fn build(mut self) -> CommandTable<T> {
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        CommandTable { entries: self.entries }
    }
}

#[derive(Debug)]
pub struct CommandTable<T> {
    entries: Vec<(String, T)>,
}

impl<T> CommandTable<T> {
    pub fn builder() -> CommandTableBuilder<T> {
        CommandTableBuilder::new()
    }

    /// Resolves a possibly abbreviated name. An exact name always wins;
    /// otherwise the prefix must select exactly one entry.
    pub fn resolve(&self, typed: &str) -> Result<(&str, &T)> {
        let start = self.entries.partition_point(|(name, _)| name.as_str() < typed);
        let mut matching = self.entries[start..]
            .iter()
            .take_while(|(name, _)| name.starts_with(typed));
        let first = matching
            .next()
            .ok_or_else(|| HyperadminError::NotFound(typed.to_string()))?;
        // the exact name, if registered, sorts first among its extensions
        if first.0 == typed {
            return Ok((&first.0, &first.1));
        }
        let rest: Vec<&(String, T)> = matching.collect();
        if rest.is_empty() {
            return Ok((&first.0, &first.1));
        }
        let mut candidates = vec![first.0.clone()];
        candidates.extend(rest.iter().map(|(name, _)| name.clone()));
        Err(HyperadminError::AmbiguousMatch {
            typed: typed.to_string(),
            candidates,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
