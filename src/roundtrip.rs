//! Bulk export and import of whole classes as delimiter-separated files.
//!
//! A class `c` is written to `c.csv` (header, then one row per instance) and
//! `c-journals.csv` (one row per journal entry, no header). Attachments go to
//! `c-files/<id / 1000>/c<id>`. Data fields are JSON literals, see
//! [`encode_field`]; the identifier column is bare.
use std::cmp::Reverse;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::codec::{decode_field, decode_retired, encode_field};
use crate::datatype::{Date, Value};
use crate::error::{HyperadminError, Result};
use crate::rows::{Dialect, RowReader, RowWriter};
use crate::schema::{ClassSpec, ID_PROPERTY, Id, RETIRED_COLUMN};
use crate::store::{JournalEntry, Store};

pub const JOURNAL_SUFFIX: &str = "-journals";
pub const DEFAULT_FIELD_SIZE: usize = 131072;
const JOURNAL_COLUMNS: usize = 5;
const FILES_PER_DIRECTORY: Id = 1000;

pub fn rows_file(dir: &Path, class: &str) -> PathBuf {
    dir.join(format!("{class}.csv"))
}

pub fn journals_file(dir: &Path, class: &str) -> PathBuf {
    dir.join(format!("{class}{JOURNAL_SUFFIX}.csv"))
}

pub fn attachment_file(dir: &Path, class: &str, id: Id) -> PathBuf {
    dir.join(format!("{class}-files"))
        .join((id / FILES_PER_DIRECTORY).to_string())
        .join(format!("{class}{id}"))
}

// ------------- Export -------------
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub dialect: Dialect,
    /// The field size importers are configured for; longer fields are
    /// reported, not refused.
    pub csv_field_size: usize,
    /// Whether attachment payloads are written next to the tables.
    pub attachments: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            csv_field_size: DEFAULT_FIELD_SIZE,
            attachments: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub class: String,
    pub rows: usize,
    pub journals: usize,
    pub attachments: usize,
    /// Byte length of the longest encoded field in the row file.
    pub longest_field: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportSummary {
    pub classes: Vec<ExportReport>,
    /// Set when some field is longer than the configured field size; holds
    /// the size that would be needed.
    pub field_size_needed: Option<usize>,
}

/// The field size a reader needs for these exports, if it exceeds the
/// configured one.
pub fn field_size_needed(reports: &[ExportReport], configured: usize) -> Option<usize> {
    let longest = reports
        .iter()
        .map(|report| report.longest_field)
        .fold(0, usize::max);
    (longest > configured).then_some(longest)
}

/// Identifiers of `class` in export order. With a key property, instances
/// sort by key with retired ones ahead of a live one sharing their key, so
/// an importer never meets a live key before its retired predecessor.
pub fn export_order(store: &dyn Store, class: &str) -> Result<Vec<Id>> {
    let mut ids = store.node_ids(class)?;
    let Some(key) = store.schema().class(class)?.key_property() else {
        return Ok(ids);
    };
    let mut keyed = Vec::with_capacity(ids.len());
    for id in ids.drain(..) {
        let value = match store.get(class, id, key)? {
            Some(Value::String(value)) => value,
            _ => String::new(),
        };
        keyed.push((value, Reverse(store.is_retired(class, id)?), id));
    }
    keyed.sort();
    Ok(keyed.into_iter().map(|(_, _, id)| id).collect())
}

pub fn export_class(store: &dyn Store, class: &str, dir: &Path, options: &ExportOptions) -> Result<ExportReport> {
    let spec = store.schema().class(class)?;
    fs::create_dir_all(dir)?;
    if !options.attachments && spec.has_attachments() {
        info!("exporting {class} without its files");
    }
    let mut writer = RowWriter::new(BufWriter::new(File::create(rows_file(dir, class))?), options.dialect);
    writer.write_row(&spec.export_columns())?;
    let mut rows = 0;
    let mut attachments = 0;
    for id in export_order(store, class)? {
        debug!("exporting {class} - {id}");
        let mut fields = Vec::with_capacity(spec.properties().len() + 2);
        fields.push(id.to_string());
        for property in spec.property_names() {
            fields.push(encode_field(store.get(class, id, property)?.as_ref()));
        }
        fields.push(serde_json::Value::Bool(store.is_retired(class, id)?).to_string());
        writer.write_row(&fields)?;
        rows += 1;
        if options.attachments && spec.has_attachments() {
            if let Some(content) = store.attachment(class, id)? {
                let path = attachment_file(dir, class, id);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, content)?;
                attachments += 1;
            }
        }
    }
    let longest_field = writer.longest_field();
    writer.finish()?;

    info!("exporting journal for {class}");
    let mut journal = RowWriter::new(BufWriter::new(File::create(journals_file(dir, class))?), options.dialect);
    let entries = store.journals(class)?;
    for entry in &entries {
        journal.write_row(&[
            entry.id.to_string(),
            entry.timestamp.to_string(),
            entry.actor.clone(),
            entry.action.clone(),
            entry.payload.clone(),
        ])?;
    }
    journal.finish()?;

    Ok(ExportReport {
        class: class.to_string(),
        rows,
        journals: entries.len(),
        attachments,
        longest_field,
    })
}

/// Exports every named class into `dir`. An oversized field is reported in
/// the summary and logged, the export itself still succeeds.
pub fn export_classes<S: AsRef<str>>(store: &dyn Store, classes: &[S], dir: &Path, options: &ExportOptions) -> Result<ExportSummary> {
    let reports = classes
        .iter()
        .map(|class| export_class(store, class.as_ref(), dir, options))
        .collect::<Result<Vec<_>>>()?;
    let field_size_needed = field_size_needed(&reports, options.csv_field_size);
    if let Some(needed) = field_size_needed {
        warn!("config csv_field_size should be at least {needed}");
    }
    Ok(ExportSummary { classes: reports, field_size_needed })
}

// ------------- Import -------------
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub dialect: Dialect,
    /// Whether attachment payloads are read back.
    pub attachments: bool,
    /// Stop at the first class file that fails instead of moving on.
    pub abort_on_error: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            attachments: true,
            abort_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassImport {
    pub class: String,
    pub rows: usize,
    pub journals: usize,
    pub attachments: usize,
    pub next_id: Id,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub imported: Vec<ClassImport>,
    /// Class files that failed, with the reason. Earlier rows of a failed
    /// file may already be applied.
    pub failed: Vec<(String, HyperadminError)>,
}

impl ImportReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Class names with a row file in `dir`, sorted.
pub fn classes_in(dir: &Path) -> Result<Vec<String>> {
    let mut classes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if !stem.ends_with(JOURNAL_SUFFIX) {
            classes.push(stem.to_string());
        }
    }
    classes.sort();
    Ok(classes)
}

/// Imports every row file in `dir`. A failing file is recorded in the
/// report and the next file is tried, unless `abort_on_error` is set.
pub fn import_dir(store: &mut dyn Store, dir: &Path, options: &ImportOptions) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for class in classes_in(dir)? {
        match import_class(store, &class, dir, options) {
            Ok(imported) => report.imported.push(imported),
            Err(e) if options.abort_on_error => return Err(e),
            Err(e) => {
                warn!("skipping {class}: {e}");
                report.failed.push((class, e));
            }
        }
    }
    Ok(report)
}

/// Opens `path`, or `None` when it does not exist.
fn open_optional(path: &Path) -> Result<Option<File>> {
    match File::open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn check_header(spec: &ClassSpec, found: Option<Vec<String>>) -> Result<()> {
    let expected = spec.export_columns();
    let found = found.unwrap_or_default();
    if found != expected {
        return Err(HyperadminError::FormatMismatch {
            class: spec.name().to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn parse_id(property: &str, text: &str) -> Result<Id> {
    text.trim().parse().map_err(|_| HyperadminError::InvalidValue {
        property: property.to_string(),
        kind: "identifier".to_string(),
        raw: text.to_string(),
    })
}

/// Imports `class` from its row file, then its journal file and
/// attachments. Instances land at their exported identifiers, replacing
/// what was there, and the class counter ends up one past the highest
/// imported identifier.
pub fn import_class(store: &mut dyn Store, class: &str, dir: &Path, options: &ImportOptions) -> Result<ClassImport> {
    let spec = store.schema().class(class)?.clone();
    let file = File::open(rows_file(dir, class))?;
    let mut reader = RowReader::new(BufReader::new(file), options.dialect);
    check_header(&spec, reader.next().transpose()?)?;
    let columns = spec.properties().len() + 2;

    let mut rows = 0;
    let mut attachments = 0;
    let mut max_id: Id = 0;
    for (n, fields) in reader.enumerate() {
        let fields = fields?;
        if fields.len() != columns {
            return Err(HyperadminError::RowArity {
                class: class.to_string(),
                row: n + 1,
                expected: columns,
                found: fields.len(),
            });
        }
        let id = parse_id(ID_PROPERTY, &fields[0])?;
        let mut values = Vec::with_capacity(spec.properties().len());
        for ((property, kind), text) in spec.properties().iter().zip(&fields[1..]) {
            values.push((property.clone(), decode_field(property, kind, text)?));
        }
        let flag = &fields[columns - 1];
        let retired = decode_retired(flag).ok_or_else(|| HyperadminError::InvalidValue {
            property: RETIRED_COLUMN.to_string(),
            kind: "Boolean".to_string(),
            raw: flag.clone(),
        })?;
        debug!("importing {class} - {id}");
        store.import_row(class, id, values, retired)?;
        rows += 1;
        max_id = max_id.max(id);

        if options.attachments && spec.has_attachments() {
            let path = attachment_file(dir, class, id);
            match fs::read(&path) {
                Ok(content) => {
                    store.set_attachment(class, id, content)?;
                    attachments += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("no attachment for {class}{id}");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    let journals = match open_optional(&journals_file(dir, class))? {
        Some(file) => import_journals(store, class, file, options.dialect)?,
        None => {
            info!("no journal file for {class}");
            0
        }
    };

    let next_id = max_id + 1;
    store.set_next_id(class, next_id)?;
    info!("setting {class} {next_id}");
    Ok(ClassImport {
        class: class.to_string(),
        rows,
        journals,
        attachments,
        next_id,
    })
}

fn import_journals(store: &mut dyn Store, class: &str, file: File, dialect: Dialect) -> Result<usize> {
    let journal_class = format!("{class}{JOURNAL_SUFFIX}");
    let mut count = 0;
    for (n, fields) in RowReader::new(BufReader::new(file), dialect).enumerate() {
        let fields = fields?;
        let [id, timestamp, actor, action, payload] = fields.as_slice() else {
            return Err(HyperadminError::RowArity {
                class: journal_class,
                row: n + 1,
                expected: JOURNAL_COLUMNS,
                found: fields.len(),
            });
        };
        let timestamp = Date::parse_canonical(timestamp).ok_or_else(|| HyperadminError::InvalidValue {
            property: "timestamp".to_string(),
            kind: "Date".to_string(),
            raw: timestamp.clone(),
        })?;
        let entry = JournalEntry::new(parse_id(ID_PROPERTY, id)?, timestamp, actor, action, payload);
        store.import_journal(class, entry)?;
        count += 1;
    }
    Ok(count)
}
