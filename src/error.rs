use thiserror::Error;

use crate::schema::Id;

#[derive(Error, Debug)]
pub enum HyperadminError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("no such class \"{0}\"")]
    UnknownClass(String),
    #[error("class \"{class}\" has no property \"{property}\"")]
    UnknownProperty { class: String, property: String },
    #[error("property \"{property}\": \"{raw}\" is not a valid {kind}")]
    InvalidValue { property: String, kind: String, raw: String },
    #[error("property \"{property}\": no {class} with id or key \"{raw}\"")]
    UnresolvedReference { class: String, property: String, raw: String },
    #[error("\"{0}\" is not a valid designator (expected <class><id>, e.g. issue12)")]
    MalformedDesignator(String),
    #[error("class \"{class}\" has no property \"{hop}\" in \"{path}\"")]
    NoSuchProperty { class: String, hop: String, path: String },
    #[error("property \"{hop}\" of class \"{class}\" is not a link and cannot be followed in \"{path}\"")]
    NotTraversable { class: String, hop: String, path: String },
    #[error("{class}: file header {found:?} does not match the class properties {expected:?}")]
    FormatMismatch { class: String, expected: Vec<String>, found: Vec<String> },
    #[error("{class}: row {row} has {found} fields, expected {expected}")]
    RowArity { class: String, row: usize, expected: usize, found: usize },
    #[error("multiple commands match \"{typed}\": {}", .candidates.join(", "))]
    AmbiguousMatch { typed: String, candidates: Vec<String> },
    #[error("unknown command \"{0}\"")]
    NotFound(String),
    #[error("no such {class} item \"{id}\"")]
    NoSuchItem { class: String, id: Id },
    #[error("{0}")]
    Usage(String),
    #[error("import failed: {}", .failures.join("; "))]
    Import { failures: Vec<String> },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HyperadminError>;

// Helper conversions
impl From<config::ConfigError> for HyperadminError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
