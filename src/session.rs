//! The context every administrative operation runs in: the store being
//! administered, the settings and whether there are uncommitted changes.
use tracing::debug;

use crate::codec::PropertyCodec;
use crate::command::CommandTable;
use crate::error::{HyperadminError, Result};
use crate::schema::{Id, Schema};
use crate::settings::Settings;
use crate::store::Store;

/// An administrative operation. It receives the arguments following its
/// name and returns the lines to show.
pub type Operation = fn(&mut Session, &[String]) -> Result<Vec<String>>;

pub struct Session {
    store: Box<dyn Store>,
    settings: Settings,
    uncommitted: bool,
}

impl Session {
    pub fn new(store: Box<dyn Store>, settings: Settings) -> Self {
        Self {
            store,
            settings,
            uncommitted: false,
        }
    }
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
    pub fn store_mut(&mut self) -> &mut dyn Store {
        self.store.as_mut()
    }
    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
    pub fn codec(&self) -> PropertyCodec<'_> {
        PropertyCodec::new(self.store.schema(), self.store.resolver())
    }
    pub fn is_uncommitted(&self) -> bool {
        self.uncommitted
    }
    pub fn mark_uncommitted(&mut self) {
        self.uncommitted = true;
    }

    pub fn commit(&mut self) -> Result<()> {
        self.store.commit()?;
        self.uncommitted = false;
        Ok(())
    }
    pub fn rollback(&mut self) -> Result<()> {
        self.store.rollback()?;
        self.uncommitted = false;
        Ok(())
    }

    /// Resolves `line[0]` in `commands` and runs it on the rest of the line.
    pub fn execute(&mut self, commands: &CommandTable<Operation>, line: &[String]) -> Result<Vec<String>> {
        let (typed, args) = line
            .split_first()
            .ok_or_else(|| HyperadminError::Usage("no command given".to_string()))?;
        let (name, operation) = commands.resolve(typed)?;
        debug!("dispatching {name} with {} arguments", args.len());
        operation(self, args)
    }

    /// Formats identifiers of `class` for list output: designators or bare
    /// identifiers, one per line or joined by the separator.
    pub fn format_ids(&self, class: &str, ids: &[Id]) -> Vec<String> {
        let items: Vec<String> = ids
            .iter()
            .map(|id| {
                if self.settings.print_designator {
                    format!("{class}{id}")
                } else {
                    id.to_string()
                }
            })
            .collect();
        self.join(items)
    }

    /// Joins items into one line when a separator is configured.
    pub fn join(&self, items: Vec<String>) -> Vec<String> {
        match &self.settings.separator {
            Some(separator) => vec![items.join(separator)],
            None => items,
        }
    }
}
