//! The storage-engine contract the administrative operations and the
//! round-trip engine are written against.
use std::collections::BTreeSet;
use std::fmt;

use crate::codec::Resolver;
use crate::datatype::{Date, Value};
use crate::error::Result;
use crate::path::FilterTerm;
use crate::schema::{Id, Schema};

/// What happened to an instance, as recorded in its journal.
pub mod action {
    pub const CREATE: &str = "create";
    pub const SET: &str = "set";
    pub const RETIRED: &str = "retired";
    pub const RESTORED: &str = "restored";
}

/// One change-history record. The payload is opaque text that is carried
/// through export and import untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub id: Id,
    pub timestamp: Date,
    pub actor: String,
    pub action: String,
    pub payload: String,
}

impl JournalEntry {
    pub fn new(id: Id, timestamp: Date, actor: &str, action: &str, payload: &str) -> Self {
        Self {
            id,
            timestamp,
            actor: actor.to_string(),
            action: action.to_string(),
            payload: payload.to_string(),
        }
    }
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.timestamp, self.actor, self.action)?;
        if !self.payload.is_empty() {
            write!(f, " {}", self.payload)?;
        }
        Ok(())
    }
}

/// Property updates; `None` unsets.
pub type Changes = Vec<(String, Option<Value>)>;

pub trait Store: Resolver {
    fn schema(&self) -> &Schema;
    /// This store as the reference lookup the codec needs.
    fn resolver(&self) -> &dyn Resolver;

    /// Creates an instance with the next free identifier. A class with a key
    /// property requires it, and the key must be unused by live instances.
    fn create(&mut self, class: &str, values: Vec<(String, Value)>) -> Result<Id>;
    fn set(&mut self, class: &str, id: Id, changes: Changes) -> Result<()>;
    /// Fails with `NoSuchItem` when the instance does not exist.
    fn get(&self, class: &str, id: Id, property: &str) -> Result<Option<Value>>;

    /// Every identifier of the class, retired ones included, ascending.
    fn node_ids(&self, class: &str) -> Result<Vec<Id>>;
    /// Live identifiers only, ascending.
    fn list(&self, class: &str) -> Result<Vec<Id>>;
    fn is_retired(&self, class: &str, id: Id) -> Result<bool>;
    fn retire(&mut self, class: &str, id: Id) -> Result<()>;
    fn restore(&mut self, class: &str, id: Id) -> Result<()>;

    /// Live instances satisfying every term.
    fn filter(&self, class: &str, terms: &[FilterTerm]) -> Result<Vec<Id>>;
    /// Live instances linking to any of the given identifiers through any of
    /// the given properties.
    fn find(&self, class: &str, terms: &[(String, BTreeSet<Id>)]) -> Result<Vec<Id>>;

    fn journal(&self, class: &str, id: Id) -> Result<Vec<JournalEntry>>;
    /// All journal entries of the class in recording order.
    fn journals(&self, class: &str) -> Result<Vec<JournalEntry>>;

    /// Writes an instance at exactly `id`, replacing whatever was there. No
    /// journal entry is recorded and values are stored as given. A live row
    /// whose key value another live instance holds is refused.
    fn import_row(&mut self, class: &str, id: Id, values: Changes, retired: bool) -> Result<()>;
    fn import_journal(&mut self, class: &str, entry: JournalEntry) -> Result<()>;

    /// The identifier the next `create` will use.
    fn next_id(&self, class: &str) -> Result<Id>;
    fn set_next_id(&mut self, class: &str, next: Id) -> Result<()>;

    fn attachment(&self, class: &str, id: Id) -> Result<Option<Vec<u8>>>;
    fn set_attachment(&mut self, class: &str, id: Id, content: Vec<u8>) -> Result<()>;

    /// Drops journal entries older than `before`, except creations. Returns
    /// how many were dropped.
    fn pack(&mut self, before: Date) -> Result<usize>;

    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}
