//! One-shot command execution against a directory-backed store.
use tracing::{error, info, warn};

use crate::admin::command_table;
use crate::error::Result;
use crate::memory::MemoryStore;
use crate::roundtrip::{export_classes, import_dir};
use crate::session::Session;
use crate::settings::Settings;
use crate::store::Store;

/// Fills an in-memory store from `data_dir` when one is configured, runs a
/// single command and, when the command changed something, commits and
/// writes the store back to `data_dir`.
///
/// Classes whose files failed to load are not written back, so their files
/// stay as they were.
pub fn run(settings: Settings, line: &[String]) -> Result<Vec<String>> {
    let schema = settings.schema()?;
    let mut store = MemoryStore::new(schema, &settings.user);
    let mut unloaded = Vec::new();
    if let Some(dir) = settings.data_dir.as_deref().filter(|dir| dir.is_dir()) {
        info!("loading {}", dir.display());
        let report = import_dir(&mut store, dir, &settings.import_options(true)?)?;
        for (class, e) in report.failed {
            error!("could not load {class}: {e}");
            unloaded.push(class);
        }
        store.commit()?;
    }

    let commands = command_table();
    let mut session = Session::new(Box::new(store), settings);
    let output = match session.execute(&commands, line) {
        Ok(output) => output,
        Err(e) => {
            session.rollback()?;
            return Err(e);
        }
    };
    if session.is_uncommitted() {
        session.commit()?;
        if let Some(dir) = session.settings().data_dir.clone() {
            let options = session.settings().export_options(true)?;
            let classes: Vec<String> = session
                .schema()
                .class_names()
                .iter()
                .filter(|class| !unloaded.contains(*class))
                .cloned()
                .collect();
            for class in &unloaded {
                warn!("leaving {class} untouched in {}", dir.display());
            }
            export_classes(session.store(), &classes, &dir, &options)?;
            info!("saved to {}", dir.display());
        }
    }
    Ok(output)
}
