//! Runtime settings, read through `config` from an optional TOML file and
//! `HYPERADMIN_*` environment variables.
//!
//! ```toml
//! delimiter = ":"
//! data_dir = "tracker-data"
//!
//! [[classes]]
//! name = "user"
//! key = "username"
//! properties = ["username: String", "password: Password", "roles: Multilink(role)"]
//! ```
use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::{HyperadminError, Result};
use crate::roundtrip::{DEFAULT_FIELD_SIZE, ExportOptions, ImportOptions};
use crate::rows::{DEFAULT_DELIMITER, Dialect};
use crate::schema::{ClassSpec, PropertyKind, Schema};

pub const CONFIG_VARIABLE: &str = "HYPERADMIN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "hyperadmin.toml";
const ENV_PREFIX: &str = "HYPERADMIN";

/// One class as written in the settings file. Properties are
/// `"name: Kind"` strings so their order is kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassDefinition {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub attachments: bool,
    #[serde(default)]
    pub properties: Vec<String>,
}

impl ClassDefinition {
    pub fn to_spec(&self) -> Result<ClassSpec> {
        let mut spec = ClassSpec::new(&self.name);
        for declaration in &self.properties {
            let (name, kind) = declaration.split_once(':').ok_or_else(|| {
                HyperadminError::Schema(format!(
                    "{}: \"{declaration}\" is not \"name: Kind\"", self.name
                ))
            })?;
            spec = spec.property(name.trim(), kind.parse::<PropertyKind>()?);
        }
        if let Some(key) = &self.key {
            spec = spec.key(key);
        }
        if self.attachments {
            spec = spec.with_attachments();
        }
        Ok(spec)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Field delimiter of the export files, a single character.
    pub delimiter: String,
    /// Field size importers are expected to handle.
    pub csv_field_size: usize,
    /// Join list output on one line with this separator.
    pub separator: Option<String>,
    /// Print designators instead of bare identifiers.
    pub print_designator: bool,
    pub verbose: bool,
    /// Actor recorded in journal entries.
    pub user: String,
    /// Stop a multi-class import at the first failing file.
    pub abort_on_error: bool,
    /// Directory the binary loads from and saves to.
    pub data_dir: Option<PathBuf>,
    pub classes: Vec<ClassDefinition>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
            csv_field_size: DEFAULT_FIELD_SIZE,
            separator: None,
            print_designator: false,
            verbose: false,
            user: "admin".to_string(),
            abort_on_error: false,
            data_dir: None,
            classes: Vec::new(),
        }
    }
}

impl Settings {
    /// Reads `$HYPERADMIN_CONFIG` (or `hyperadmin.toml` when it exists)
    /// overlaid with `HYPERADMIN_*` variables.
    pub fn load() -> Result<Settings> {
        let path = env::var(CONFIG_VARIABLE).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let settings: Settings = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Settings> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.dialect()?;
        if self.csv_field_size == 0 {
            return Err(HyperadminError::Config("csv_field_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn dialect(&self) -> Result<Dialect> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(delimiter), None) => Dialect::new(delimiter),
            _ => Err(HyperadminError::Config(format!(
                "delimiter \"{}\" must be a single character", self.delimiter
            ))),
        }
    }

    pub fn schema(&self) -> Result<Schema> {
        let classes = self
            .classes
            .iter()
            .map(ClassDefinition::to_spec)
            .collect::<Result<Vec<_>>>()?;
        Schema::from_classes(classes)
    }

    pub fn export_options(&self, attachments: bool) -> Result<ExportOptions> {
        Ok(ExportOptions {
            dialect: self.dialect()?,
            csv_field_size: self.csv_field_size,
            attachments,
        })
    }

    pub fn import_options(&self, attachments: bool) -> Result<ImportOptions> {
        Ok(ImportOptions {
            dialect: self.dialect()?,
            attachments,
            abort_on_error: self.abort_on_error,
        })
    }
}
