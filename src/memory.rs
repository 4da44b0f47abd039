//! In-process storage engine: one table per class, journaled mutations and
//! snapshot transactions.
use std::collections::{BTreeMap, BTreeSet, HashMap};

// used to keep the one-to-one mapping between key values and identifiers
use bimap::BiMap;
// retired identifiers and filter hits are kept as compressed bitmaps
use roaring::RoaringTreemap;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::codec::{Resolver, to_json};
use crate::datatype::{Date, Value};
use crate::error::{HyperadminError, Result};
use crate::path::{FilterTerm, ResolvedPath};
use crate::schema::{ClassHasher, Id, Schema};
use crate::store::{Changes, JournalEntry, Store, action};

type Item = HashMap<String, Value, ClassHasher>;

#[derive(Debug, Clone, Default)]
struct ClassTable {
    items: BTreeMap<Id, Item>,
    retired: RoaringTreemap,
    // key value to identifier, live instances only
    keys: BiMap<String, Id>,
    journal: Vec<JournalEntry>,
    // highest identifier handed out, imported or reserved
    lower_bound: Id,
    attachments: HashMap<Id, Vec<u8>, ClassHasher>,
}

impl ClassTable {
    fn generate(&mut self) -> Id {
        loop {
            self.lower_bound += 1;
            if !self.items.contains_key(&self.lower_bound) {
                return self.lower_bound;
            }
        }
    }
    fn live(&self) -> impl Iterator<Item = (&Id, &Item)> {
        self.items.iter().filter(|(id, _)| !self.retired.contains(**id))
    }
}

type Tables = HashMap<String, ClassTable, ClassHasher>;

#[derive(Debug)]
pub struct MemoryStore {
    schema: Schema,
    actor: String,
    working: Tables,
    committed: Tables,
}

impl MemoryStore {
    /// An empty store for `schema`; journal entries are stamped with `actor`.
    pub fn new(schema: Schema, actor: &str) -> Self {
        let tables: Tables = schema
            .class_names()
            .iter()
            .map(|name| (name.clone(), ClassTable::default()))
            .collect();
        Self {
            schema,
            actor: actor.to_string(),
            committed: tables.clone(),
            working: tables,
        }
    }
    pub fn actor(&self) -> &str {
        &self.actor
    }

    fn table(&self, class: &str) -> Result<&ClassTable> {
        self.working
            .get(class)
            .ok_or_else(|| HyperadminError::UnknownClass(class.to_string()))
    }
    fn table_mut(&mut self, class: &str) -> Result<&mut ClassTable> {
        self.working
            .get_mut(class)
            .ok_or_else(|| HyperadminError::UnknownClass(class.to_string()))
    }
    fn item(&self, class: &str, id: Id) -> Result<&Item> {
        self.table(class)?
            .items
            .get(&id)
            .ok_or_else(|| HyperadminError::NoSuchItem { class: class.to_string(), id })
    }

    /// Rejects values whose variant does not fit the declared kind.
    fn check(&self, class: &str, property: &str, value: &Value) -> Result<()> {
        let kind = self.schema.kind_of(class, property)?;
        if value.kind_name() != kind.name() {
            return Err(HyperadminError::InvalidValue {
                property: property.to_string(),
                kind: kind.to_string(),
                raw: value.kind_name().to_string(),
            });
        }
        Ok(())
    }

    fn check_changes(&self, class: &str, changes: &Changes) -> Result<()> {
        for (property, value) in changes {
            match value {
                Some(value) => self.check(class, property, value)?,
                None => {
                    self.schema.kind_of(class, property)?;
                }
            }
        }
        Ok(())
    }

    /// Values of the final hop of `path` on every instance reached from `id`.
    fn reached(&self, id: Id, path: &ResolvedPath) -> Result<Vec<Option<Value>>> {
        let mut class = path.start.as_str();
        let mut frontier = BTreeSet::from([id]);
        for hop in &path.links {
            let target = self
                .schema
                .kind_of(class, hop)?
                .target()
                .ok_or_else(|| HyperadminError::NotTraversable {
                    class: class.to_string(),
                    hop: hop.clone(),
                    path: path.dotted(),
                })?;
            let table = self.table(class)?;
            frontier = frontier
                .iter()
                .filter_map(|id| table.items.get(id))
                .filter_map(|item| item.get(hop))
                .flat_map(Value::references)
                .collect();
            class = target;
        }
        let table = self.table(class)?;
        Ok(frontier
            .iter()
            .filter_map(|id| table.items.get(id))
            .map(|item| item.get(&path.property).cloned())
            .collect())
    }
}

/// Credentials are kept hashed, everything else as given.
fn stored(value: Value) -> Value {
    match value {
        Value::Secret(credential) => Value::Secret(credential.hashed()),
        other => other,
    }
}

fn key_in_use(class: &str, key: &str, other: Id) -> HyperadminError {
    HyperadminError::Storage(format!("key value \"{key}\" is already used by {class}{other}"))
}

impl Resolver for MemoryStore {
    fn has_id(&self, class: &str, id: Id) -> bool {
        self.working
            .get(class)
            .is_some_and(|table| table.items.contains_key(&id))
    }
    fn lookup_key(&self, class: &str, key: &str) -> Option<Id> {
        self.working.get(class)?.keys.get_by_left(key).copied()
    }
    fn current(&self, class: &str, id: Id, property: &str) -> Option<Value> {
        self.working.get(class)?.items.get(&id)?.get(property).cloned()
    }
}

impl Store for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn resolver(&self) -> &dyn Resolver {
        self
    }

    fn create(&mut self, class: &str, values: Vec<(String, Value)>) -> Result<Id> {
        let mut item = Item::default();
        for (property, value) in values {
            self.check(class, &property, &value)?;
            item.insert(property, stored(value));
        }
        let key = match self.schema.class(class)?.key_property() {
            Some(key_property) => match item.get(key_property) {
                Some(Value::String(key)) => Some(key.clone()),
                _ => {
                    return Err(HyperadminError::Usage(format!(
                        "you must provide the \"{key_property}\" property"
                    )));
                }
            },
            None => None,
        };
        let actor = self.actor.clone();
        let table = self.table_mut(class)?;
        if let Some(key) = &key {
            if let Some(other) = table.keys.get_by_left(key) {
                return Err(key_in_use(class, key, *other));
            }
        }
        let id = table.generate();
        if let Some(key) = key {
            table.keys.insert(key, id);
        }
        table.items.insert(id, item);
        table.journal.push(JournalEntry::new(id, Date::now(), &actor, action::CREATE, "{}"));
        debug!("created {class}{id}");
        Ok(id)
    }

    fn set(&mut self, class: &str, id: Id, changes: Changes) -> Result<()> {
        self.check_changes(class, &changes)?;
        let key_property = self.schema.class(class)?.key_property().map(String::from);
        let actor = self.actor.clone();
        let table = self.table_mut(class)?;
        if !table.items.contains_key(&id) {
            return Err(HyperadminError::NoSuchItem { class: class.to_string(), id });
        }
        let live = !table.retired.contains(id);
        let mut new_key = None;
        if let Some(key_property) = &key_property {
            if let Some((_, value)) = changes.iter().find(|(p, _)| p == key_property) {
                let Some(Value::String(key)) = value else {
                    return Err(HyperadminError::Usage(format!(
                        "the key property \"{key_property}\" cannot be unset"
                    )));
                };
                if let Some(other) = table.keys.get_by_left(key) {
                    if live && *other != id {
                        return Err(key_in_use(class, key, *other));
                    }
                }
                new_key = Some(key.clone());
            }
        }
        let item = table
            .items
            .get_mut(&id)
            .ok_or_else(|| HyperadminError::NoSuchItem { class: class.to_string(), id })?;
        // the journal keeps the values being replaced
        let mut previous = Map::new();
        for (property, value) in changes {
            let before = match value {
                Some(value) => item.insert(property.clone(), stored(value)),
                None => item.remove(&property),
            };
            if before.as_ref() != item.get(&property) {
                previous.insert(property, to_json(before.as_ref()));
            }
        }
        if let (Some(key), true) = (new_key, live) {
            table.keys.insert(key, id);
        }
        if !previous.is_empty() {
            let payload = Json::Object(previous).to_string();
            table.journal.push(JournalEntry::new(id, Date::now(), &actor, action::SET, &payload));
        }
        Ok(())
    }

    fn get(&self, class: &str, id: Id, property: &str) -> Result<Option<Value>> {
        self.schema.kind_of(class, property)?;
        Ok(self.item(class, id)?.get(property).cloned())
    }

    fn node_ids(&self, class: &str) -> Result<Vec<Id>> {
        Ok(self.table(class)?.items.keys().copied().collect())
    }

    fn list(&self, class: &str) -> Result<Vec<Id>> {
        Ok(self.table(class)?.live().map(|(id, _)| *id).collect())
    }

    fn is_retired(&self, class: &str, id: Id) -> Result<bool> {
        self.item(class, id)?;
        Ok(self.table(class)?.retired.contains(id))
    }

    fn retire(&mut self, class: &str, id: Id) -> Result<()> {
        self.item(class, id)?;
        let actor = self.actor.clone();
        let table = self.table_mut(class)?;
        if table.retired.insert(id) {
            table.keys.remove_by_right(&id);
            table.journal.push(JournalEntry::new(id, Date::now(), &actor, action::RETIRED, ""));
        }
        Ok(())
    }

    fn restore(&mut self, class: &str, id: Id) -> Result<()> {
        let key = match self.schema.class(class)?.key_property() {
            Some(key_property) => match self.item(class, id)?.get(key_property) {
                Some(Value::String(key)) => Some(key.clone()),
                _ => None,
            },
            None => {
                self.item(class, id)?;
                None
            }
        };
        let actor = self.actor.clone();
        let table = self.table_mut(class)?;
        if !table.retired.contains(id) {
            return Ok(());
        }
        if let Some(key) = &key {
            if let Some(other) = table.keys.get_by_left(key) {
                return Err(key_in_use(class, key, *other));
            }
        }
        table.retired.remove(id);
        if let Some(key) = key {
            table.keys.insert(key, id);
        }
        table.journal.push(JournalEntry::new(id, Date::now(), &actor, action::RESTORED, ""));
        Ok(())
    }

    fn filter(&self, class: &str, terms: &[FilterTerm]) -> Result<Vec<Id>> {
        let table = self.table(class)?;
        let mut hits = RoaringTreemap::new();
        'candidates: for (id, _) in table.live() {
            for term in terms {
                if !term.matches(&self.reached(*id, &term.path)?) {
                    continue 'candidates;
                }
            }
            hits.insert(*id);
        }
        Ok(hits.iter().collect())
    }

    fn find(&self, class: &str, terms: &[(String, BTreeSet<Id>)]) -> Result<Vec<Id>> {
        for (property, _) in terms {
            self.schema.kind_of(class, property)?;
        }
        let table = self.table(class)?;
        let mut hits = RoaringTreemap::new();
        for (id, item) in table.live() {
            let linked = terms.iter().any(|(property, wanted)| {
                item.get(property)
                    .is_some_and(|value| !value.references().is_disjoint(wanted))
            });
            if linked {
                hits.insert(*id);
            }
        }
        Ok(hits.iter().collect())
    }

    fn journal(&self, class: &str, id: Id) -> Result<Vec<JournalEntry>> {
        self.item(class, id)?;
        Ok(self
            .table(class)?
            .journal
            .iter()
            .filter(|entry| entry.id == id)
            .cloned()
            .collect())
    }

    fn journals(&self, class: &str) -> Result<Vec<JournalEntry>> {
        Ok(self.table(class)?.journal.clone())
    }

    fn import_row(&mut self, class: &str, id: Id, values: Changes, retired: bool) -> Result<()> {
        self.check_changes(class, &values)?;
        let key_property = self.schema.class(class)?.key_property().map(String::from);
        let item: Item = values
            .into_iter()
            .filter_map(|(property, value)| value.map(|v| (property, stored(v))))
            .collect();
        let key = key_property.and_then(|k| match item.get(&k) {
            Some(Value::String(key)) => Some(key.clone()),
            _ => None,
        });
        let table = self.table_mut(class)?;
        if let Some(key) = key.as_deref().filter(|_| !retired) {
            // another live instance keeps its key
            if let Some(&other) = table.keys.get_by_left(key).filter(|&&other| other != id) {
                return Err(key_in_use(class, key, other));
            }
        }
        table.keys.remove_by_right(&id);
        if retired {
            table.retired.insert(id);
        } else {
            table.retired.remove(id);
            if let Some(key) = key {
                table.keys.insert(key, id);
            }
        }
        table.items.insert(id, item);
        table.lower_bound = table.lower_bound.max(id);
        Ok(())
    }

    fn import_journal(&mut self, class: &str, entry: JournalEntry) -> Result<()> {
        self.table_mut(class)?.journal.push(entry);
        Ok(())
    }

    fn next_id(&self, class: &str) -> Result<Id> {
        Ok(self.table(class)?.lower_bound + 1)
    }

    fn set_next_id(&mut self, class: &str, next: Id) -> Result<()> {
        self.table_mut(class)?.lower_bound = next.saturating_sub(1);
        Ok(())
    }

    fn attachment(&self, class: &str, id: Id) -> Result<Option<Vec<u8>>> {
        Ok(self.table(class)?.attachments.get(&id).cloned())
    }

    fn set_attachment(&mut self, class: &str, id: Id, content: Vec<u8>) -> Result<()> {
        if !self.schema.class(class)?.has_attachments() {
            return Err(HyperadminError::Usage(format!("class \"{class}\" has no attachments")));
        }
        self.item(class, id)?;
        self.table_mut(class)?.attachments.insert(id, content);
        Ok(())
    }

    fn pack(&mut self, before: Date) -> Result<usize> {
        let mut dropped = 0;
        for (class, table) in self.working.iter_mut() {
            let kept = table.journal.len();
            table
                .journal
                .retain(|entry| entry.action == action::CREATE || entry.timestamp >= before);
            debug!("packed {} journal entries of {class}", kept - table.journal.len());
            dropped += kept - table.journal.len();
        }
        Ok(dropped)
    }

    fn commit(&mut self) -> Result<()> {
        self.committed = self.working.clone();
        debug!("committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.working = self.committed.clone();
        debug!("rolled back");
        Ok(())
    }
}
