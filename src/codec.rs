//! Conversion between command-line / file text and schema-typed values.
//!
//! Two encodings live here:
//! * the user-facing one ([`PropertyCodec::decode`] / [`encode`]), which
//!   resolves references by id or key and accepts partial dates, and
//! * the trusted round-trip one ([`encode_field`] / [`decode_field`]) used by
//!   the export files, where every field is a JSON literal and identifiers
//!   are taken literally.
use std::collections::BTreeSet;

use serde_json::Value as Json;

use crate::datatype::{Credential, Date, Decimal, Interval, Value};
use crate::error::{HyperadminError, Result};
use crate::schema::{Id, PropertyKind, Schema};

/// What a Secret encodes to for display. Stored material is never shown.
pub const REDACTED: &str = "********";

const TRUTHY: [&str; 4] = ["yes", "true", "on", "1"];
const FALSY: [&str; 4] = ["no", "false", "off", "0"];

/// Lookups the codec needs from the storage engine while decoding
/// references.
pub trait Resolver {
    /// Whether `class` holds an instance with identifier `id`.
    fn has_id(&self, class: &str, id: Id) -> bool;
    /// The identifier of the live `class` instance whose key is `key`.
    fn lookup_key(&self, class: &str, key: &str) -> Option<Id>;
    /// The stored value of a property, used for `+id`/`-id` multilink edits.
    fn current(&self, class: &str, id: Id, property: &str) -> Option<Value>;
}

/// A `property=value` argument. An absent value means "unset".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAssignment {
    pub property: String,
    pub raw: Option<String>,
}

/// Splits `prop=value` arguments. Everything after the first `=` is the
/// value, and an empty value unsets the property.
pub fn parse_assignments<S: AsRef<str>>(args: &[S]) -> Result<Vec<RawAssignment>> {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            let (property, value) = arg
                .split_once('=')
                .ok_or_else(|| HyperadminError::Usage(format!("argument \"{arg}\" not propname=value")))?;
            Ok(RawAssignment {
                property: property.to_string(),
                raw: (!value.is_empty()).then(|| value.to_string()),
            })
        })
        .collect()
}

pub struct PropertyCodec<'a> {
    schema: &'a Schema,
    resolver: &'a dyn Resolver,
}

impl<'a> PropertyCodec<'a> {
    pub fn new(schema: &'a Schema, resolver: &'a dyn Resolver) -> Self {
        Self { schema, resolver }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    /// Converts `raw` into a value of the kind `class.property` declares.
    /// `existing` names the instance being edited, if any; it only matters
    /// for relative multilink edits.
    pub fn decode(&self, class: &str, existing: Option<Id>, property: &str, raw: &str) -> Result<Value> {
        let kind = self.schema.kind_of(class, property)?;
        let invalid = || HyperadminError::InvalidValue {
            property: property.to_string(),
            kind: kind.to_string(),
            raw: raw.to_string(),
        };
        match kind {
            PropertyKind::String => Ok(Value::String(raw.to_string())),
            PropertyKind::Number => Decimal::parse(raw).map(Value::Number).ok_or_else(invalid),
            PropertyKind::Boolean => parse_boolean(raw).map(Value::Boolean).ok_or_else(invalid),
            PropertyKind::Date => Date::parse(raw).map(Value::Date).ok_or_else(invalid),
            PropertyKind::Interval => Interval::parse(raw).map(Value::Interval).ok_or_else(invalid),
            PropertyKind::Secret => Ok(Value::Secret(Credential::Plain(raw.to_string()))),
            PropertyKind::Link(target) => self.reference(target, property, raw).map(Value::Link),
            PropertyKind::MultiLink(target) => self
                .multilink(class, existing, property, target, raw)
                .map(Value::MultiLink),
        }
    }

    /// Decodes an assignment; `None` means the property is to be unset.
    pub fn decode_assignment(&self, class: &str, existing: Option<Id>, assignment: &RawAssignment) -> Result<Option<Value>> {
        match &assignment.raw {
            Some(raw) => self.decode(class, existing, &assignment.property, raw).map(Some),
            None => {
                self.schema.kind_of(class, &assignment.property)?;
                Ok(None)
            }
        }
    }

    /// Resolves one reference token: an existing identifier of `target`
    /// first, then `target`'s key value.
    pub fn reference(&self, target: &str, property: &str, token: &str) -> Result<Id> {
        let token = token.trim();
        if let Ok(id) = token.parse::<Id>() {
            if self.resolver.has_id(target, id) {
                return Ok(id);
            }
        }
        self.resolver
            .lookup_key(target, token)
            .ok_or_else(|| HyperadminError::UnresolvedReference {
                class: target.to_string(),
                property: property.to_string(),
                raw: token.to_string(),
            })
    }

    fn multilink(&self, class: &str, existing: Option<Id>, property: &str, target: &str, raw: &str) -> Result<BTreeSet<Id>> {
        let tokens: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        let editing = tokens.iter().any(|t| t.starts_with('+') || t.starts_with('-'));
        let mut ids = match (editing, existing) {
            (true, Some(id)) => self
                .resolver
                .current(class, id, property)
                .map(|v| v.references())
                .unwrap_or_default(),
            _ => BTreeSet::new(),
        };
        for token in tokens {
            if let Some(removed) = token.strip_prefix('-') {
                ids.remove(&self.reference(target, property, removed)?);
            } else {
                let added = token.strip_prefix('+').unwrap_or(token);
                ids.insert(self.reference(target, property, added)?);
            }
        }
        Ok(ids)
    }
}

pub fn parse_boolean(raw: &str) -> Option<bool> {
    let lowered = raw.trim().to_ascii_lowercase();
    if TRUTHY.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSY.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Text form of a value for display and re-entry. Every kind decodes back
/// to the same value except Secret, which always shows [`REDACTED`].
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Boolean(b) => (if *b { "yes" } else { "no" }).to_string(),
        Value::Date(d) => d.to_string(),
        Value::Interval(i) => i.to_string(),
        Value::Secret(_) => REDACTED.to_string(),
        Value::Link(id) => id.to_string(),
        Value::MultiLink(ids) => ids
            .iter()
            .map(Id::to_string)
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Export form of a (possibly unset) property value as a JSON literal.
/// Secrets are written in their stored, hashed form.
pub fn encode_field(value: Option<&Value>) -> String {
    to_json(value).to_string()
}

/// The JSON value behind [`encode_field`], also used in journal payloads.
pub fn to_json(value: Option<&Value>) -> Json {
    match value {
        None => Json::Null,
        Some(Value::String(s)) => Json::String(s.clone()),
        Some(Value::Number(n)) => Json::String(n.to_string()),
        Some(Value::Boolean(b)) => Json::Bool(*b),
        Some(Value::Date(d)) => Json::String(d.to_string()),
        Some(Value::Interval(i)) => Json::String(i.to_string()),
        Some(Value::Secret(c)) => Json::String(c.stored()),
        Some(Value::Link(id)) => Json::String(id.to_string()),
        Some(Value::MultiLink(ids)) => Json::Array(ids.iter().map(|id| Json::String(id.to_string())).collect()),
    }
}

/// Inverse of [`encode_field`] for a property of the given kind. References
/// are taken literally and dates must be canonical.
pub fn decode_field(property: &str, kind: &PropertyKind, text: &str) -> Result<Option<Value>> {
    let invalid = || HyperadminError::InvalidValue {
        property: property.to_string(),
        kind: kind.to_string(),
        raw: text.to_string(),
    };
    let json: Json = serde_json::from_str(text).map_err(|_| invalid())?;
    let value = match (kind, &json) {
        (_, Json::Null) => return Ok(None),
        (PropertyKind::String, Json::String(s)) => Value::String(s.clone()),
        (PropertyKind::Number, Json::String(s)) => Decimal::parse(s).map(Value::Number).ok_or_else(invalid)?,
        (PropertyKind::Number, Json::Number(n)) => Decimal::parse(&n.to_string()).map(Value::Number).ok_or_else(invalid)?,
        (PropertyKind::Boolean, Json::Bool(b)) => Value::Boolean(*b),
        (PropertyKind::Date, Json::String(s)) => Date::parse_canonical(s).map(Value::Date).ok_or_else(invalid)?,
        (PropertyKind::Interval, Json::String(s)) => Interval::parse(s).map(Value::Interval).ok_or_else(invalid)?,
        (PropertyKind::Secret, Json::String(s)) => Credential::from_stored(s).map(Value::Secret).ok_or_else(invalid)?,
        (PropertyKind::Link(_), Json::String(s)) => Value::Link(s.parse().map_err(|_| invalid())?),
        (PropertyKind::MultiLink(_), Json::Array(items)) => Value::MultiLink(
            items
                .iter()
                .map(|item| item.as_str().and_then(|s| s.parse::<Id>().ok()).ok_or_else(invalid))
                .collect::<Result<BTreeSet<Id>>>()?,
        ),
        _ => return Err(invalid()),
    };
    Ok(Some(value))
}

/// Parses the trailing `is retired` column.
pub fn decode_retired(text: &str) -> Option<bool> {
    match serde_json::from_str::<Json>(text).ok()? {
        Json::Bool(b) => Some(b),
        _ => None,
    }
}
