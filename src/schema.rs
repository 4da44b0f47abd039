use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use seahash::SeaHasher;

use crate::error::{HyperadminError, Result};

// ------------- Identifiers -------------
pub type Id = u64;

pub type ClassHasher = BuildHasherDefault<SeaHasher>;

/// Every class carries this implicit property as its first export column.
pub const ID_PROPERTY: &str = "id";
/// Trailing export column holding the retirement flag.
pub const RETIRED_COLUMN: &str = "is retired";

// ------------- PropertyKind -------------
/// The closed set of property kinds a class may declare. Links carry the
/// name of the class they reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    Date,
    Interval,
    Secret,
    Link(String),
    MultiLink(String),
}

impl PropertyKind {
    /// The class referenced by a Link or MultiLink.
    pub fn target(&self) -> Option<&str> {
        match self {
            PropertyKind::Link(class) | PropertyKind::MultiLink(class) => Some(class),
            _ => None,
        }
    }
    pub fn is_link(&self) -> bool {
        self.target().is_some()
    }
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::String => "String",
            PropertyKind::Number => "Number",
            PropertyKind::Boolean => "Boolean",
            PropertyKind::Date => "Date",
            PropertyKind::Interval => "Interval",
            PropertyKind::Secret => "Password",
            PropertyKind::Link(_) => "Link",
            PropertyKind::MultiLink(_) => "Multilink",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.target() {
            Some(class) => write!(f, "{}({})", self.name(), class),
            None => write!(f, "{}", self.name()),
        }
    }
}

impl FromStr for PropertyKind {
    type Err = HyperadminError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((kind, rest)) = s.split_once('(') {
            let target = rest
                .strip_suffix(')')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| HyperadminError::Schema(format!("malformed property kind \"{s}\"")))?;
            return match kind.trim().to_ascii_lowercase().as_str() {
                "link" => Ok(PropertyKind::Link(target.to_string())),
                "multilink" => Ok(PropertyKind::MultiLink(target.to_string())),
                _ => Err(HyperadminError::Schema(format!("unknown property kind \"{s}\""))),
            };
        }
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(PropertyKind::String),
            "number" => Ok(PropertyKind::Number),
            "boolean" => Ok(PropertyKind::Boolean),
            "date" => Ok(PropertyKind::Date),
            "interval" => Ok(PropertyKind::Interval),
            "password" | "secret" => Ok(PropertyKind::Secret),
            _ => Err(HyperadminError::Schema(format!("unknown property kind \"{s}\""))),
        }
    }
}

// ------------- ClassSpec -------------
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    properties: Vec<(String, PropertyKind)>,
    key: Option<String>,
    attachments: bool,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            key: None,
            attachments: false,
        }
    }
    pub fn property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.push((name.to_string(), kind));
        self
    }
    pub fn key(mut self, name: &str) -> Self {
        self.key = Some(name.to_string());
        self
    }
    pub fn with_attachments(mut self) -> Self {
        self.attachments = true;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn properties(&self) -> &[(String, PropertyKind)] {
        &self.properties
    }
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(name, _)| name.as_str())
    }
    pub fn kind(&self, property: &str) -> Option<&PropertyKind> {
        self.properties
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, kind)| kind)
    }
    pub fn key_property(&self) -> Option<&str> {
        self.key.as_deref()
    }
    pub fn has_attachments(&self) -> bool {
        self.attachments
    }
    /// Header of the class's row file: `id`, the properties in declaration
    /// order, then `is retired`.
    pub fn export_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.properties.len() + 2);
        columns.push(ID_PROPERTY.to_string());
        columns.extend(self.property_names().map(String::from));
        columns.push(RETIRED_COLUMN.to_string());
        columns
    }
    /// The property used when listing instances: the key, then `name`,
    /// then `title`, then the alphabetically first property.
    pub fn label_property(&self) -> Option<&str> {
        if let Some(key) = self.key_property() {
            return Some(key);
        }
        for candidate in ["name", "title"] {
            if let Some(found) = self.property_names().find(|p| *p == candidate) {
                return Some(found);
            }
        }
        self.property_names().min()
    }
}

// ------------- Schema -------------
/// Read-only mapping from class name to its ordered property kinds.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    classes: HashMap<String, ClassSpec, ClassHasher>,
    order: Vec<String>,
}

impl Schema {
    /// Builds a schema and checks it is self-consistent: no duplicate
    /// classes or properties, no declared `id`, link targets exist and key
    /// properties are declared strings.
    pub fn from_classes(classes: Vec<ClassSpec>) -> Result<Self> {
        let mut schema = Schema::default();
        for class in classes {
            if schema.classes.contains_key(class.name()) {
                return Err(HyperadminError::Schema(format!("class \"{}\" declared twice", class.name())));
            }
            schema.order.push(class.name().to_string());
            schema.classes.insert(class.name().to_string(), class);
        }
        schema.validate()?;
        Ok(schema)
    }
    fn validate(&self) -> Result<()> {
        for class in self.classes() {
            let mut seen: Vec<&str> = Vec::new();
            for (property, kind) in class.properties() {
                if property == ID_PROPERTY || property == RETIRED_COLUMN {
                    return Err(HyperadminError::Schema(format!(
                        "{}: \"{property}\" is reserved", class.name()
                    )));
                }
                if seen.contains(&property.as_str()) {
                    return Err(HyperadminError::Schema(format!(
                        "{}: property \"{property}\" declared twice", class.name()
                    )));
                }
                seen.push(property);
                if let Some(target) = kind.target() {
                    if !self.classes.contains_key(target) {
                        return Err(HyperadminError::Schema(format!(
                            "{}.{property} links to unknown class \"{target}\"", class.name()
                        )));
                    }
                }
            }
            if let Some(key) = class.key_property() {
                if class.kind(key) != Some(&PropertyKind::String) {
                    return Err(HyperadminError::Schema(format!(
                        "{}: key property \"{key}\" must be a declared String property", class.name()
                    )));
                }
            }
        }
        Ok(())
    }
    pub fn get(&self, class: &str) -> Option<&ClassSpec> {
        self.classes.get(class)
    }
    pub fn class(&self, class: &str) -> Result<&ClassSpec> {
        self.get(class)
            .ok_or_else(|| HyperadminError::UnknownClass(class.to_string()))
    }
    /// Kind of `property` on `class`, failing with `UnknownProperty`.
    pub fn kind_of(&self, class: &str, property: &str) -> Result<&PropertyKind> {
        self.class(class)?
            .kind(property)
            .ok_or_else(|| HyperadminError::UnknownProperty {
                class: class.to_string(),
                property: property.to_string(),
            })
    }
    /// Class names in declaration order.
    pub fn class_names(&self) -> &[String] {
        &self.order
    }
    pub fn classes(&self) -> impl Iterator<Item = &ClassSpec> {
        self.order.iter().filter_map(|name| self.classes.get(name))
    }
}
