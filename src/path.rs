//! Designators (`issue42`) and dotted transitive property paths
//! (`assignedto.manager.team`), plus the filter terms built from them.
use std::collections::BTreeSet;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::codec::{PropertyCodec, RawAssignment};
use crate::datatype::Value;
use crate::error::{HyperadminError, Result};
use crate::schema::{Id, PropertyKind, Schema};

lazy_static! {
    static ref DESIGNATOR: Regex =
        Regex::new(r"^([A-Za-z](?:[A-Za-z_0-9]*[A-Za-z_])?)([0-9]+)$").unwrap();
}

// ------------- Designator -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Designator {
    pub class: String,
    pub id: Id,
}

impl Designator {
    pub fn new(class: &str, id: Id) -> Self {
        Self { class: class.to_string(), id }
    }
}

impl fmt::Display for Designator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.class, self.id)
    }
}

/// Splits `<class><digits>` without consulting a schema.
pub fn split_designator(text: &str) -> Result<Designator> {
    let malformed = || HyperadminError::MalformedDesignator(text.to_string());
    let captures = DESIGNATOR.captures(text.trim()).ok_or_else(malformed)?;
    let id = captures[2].parse::<Id>().map_err(|_| malformed())?;
    Ok(Designator::new(&captures[1], id))
}

/// Splits a designator and checks its class exists.
pub fn designator_in(schema: &Schema, text: &str) -> Result<Designator> {
    let designator = split_designator(text)?;
    schema.class(&designator.class)?;
    Ok(designator)
}

// ------------- Transitive paths -------------
/// A dotted path walked down to the class that owns its final hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub start: String,
    /// The non-final hops, each a Link or MultiLink.
    pub links: Vec<String>,
    /// Class owning the final hop.
    pub class: String,
    /// The final hop, not yet looked up.
    pub property: String,
}

impl ResolvedPath {
    pub fn dotted(&self) -> String {
        let mut hops = self.links.clone();
        hops.push(self.property.clone());
        hops.join(".")
    }
}

/// Walks `dotted` from `start`. Every hop but the last must be a Link or
/// MultiLink; the last is returned as-is for the caller to look up.
pub fn resolve_path(schema: &Schema, start: &str, dotted: &str) -> Result<ResolvedPath> {
    schema.class(start)?;
    let hops: Vec<&str> = dotted.split('.').collect();
    let (last, links) = hops.split_last().unwrap_or((&"", &[]));
    let mut current = start.to_string();
    for hop in links {
        let class = schema.class(&current)?;
        let kind = class.kind(hop).ok_or_else(|| HyperadminError::NoSuchProperty {
            class: current.clone(),
            hop: hop.to_string(),
            path: dotted.to_string(),
        })?;
        let target = kind.target().ok_or_else(|| HyperadminError::NotTraversable {
            class: current.clone(),
            hop: hop.to_string(),
            path: dotted.to_string(),
        })?;
        current = target.to_string();
    }
    if last.is_empty() {
        return Err(HyperadminError::NoSuchProperty {
            class: current,
            hop: String::new(),
            path: dotted.to_string(),
        });
    }
    Ok(ResolvedPath {
        start: start.to_string(),
        links: links.iter().map(|hop| hop.to_string()).collect(),
        class: current,
        property: last.to_string(),
    })
}

// ------------- Filters -------------
/// How the comma-separated values of one filter argument combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every value must match (string properties).
    All,
    /// Any value may match (links, multilinks and the other kinds).
    Any,
}

impl MatchMode {
    pub fn for_kind(kind: &PropertyKind) -> MatchMode {
        match kind {
            PropertyKind::String => MatchMode::All,
            _ => MatchMode::Any,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTerm {
    pub path: ResolvedPath,
    pub mode: MatchMode,
    pub values: Vec<Value>,
}

impl FilterTerm {
    /// `reached` holds the final property's value on every instance reached
    /// by following the path from one candidate.
    pub fn matches(&self, reached: &[Option<Value>]) -> bool {
        let hit = |wanted: &Value| reached.iter().flatten().any(|have| value_matches(wanted, have));
        match self.mode {
            MatchMode::All => self.values.iter().all(|wanted| hit(wanted)),
            MatchMode::Any => self.values.iter().any(|wanted| hit(wanted)),
        }
    }
}

fn value_matches(wanted: &Value, have: &Value) -> bool {
    match (wanted, have) {
        (Value::String(wanted), Value::String(have)) => {
            have.to_lowercase().contains(&wanted.to_lowercase())
        }
        (Value::Link(_) | Value::MultiLink(_), Value::Link(_) | Value::MultiLink(_)) => {
            !wanted.references().is_disjoint(&have.references())
        }
        _ => wanted == have,
    }
}

fn split_values(raw: &str) -> Vec<&str> {
    if raw.contains(',') {
        raw.split(',').collect()
    } else {
        vec![raw]
    }
}

/// Builds filter terms from `path=value[,value]` arguments on `class`. Each
/// value is decoded against the property the path ends at.
pub fn filter_terms(codec: &PropertyCodec, class: &str, assignments: &[RawAssignment]) -> Result<Vec<FilterTerm>> {
    let mut terms = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let raw = assignment.raw.as_deref().ok_or_else(|| {
            HyperadminError::Usage(format!("no value given for \"{}\"", assignment.property))
        })?;
        let path = resolve_path(codec.schema(), class, &assignment.property)?;
        let kind = codec.schema().kind_of(&path.class, &path.property)?;
        let values = split_values(raw)
            .into_iter()
            .map(|token| codec.decode(&path.class, None, &path.property, token))
            .collect::<Result<Vec<Value>>>()?;
        terms.push(FilterTerm {
            mode: MatchMode::for_kind(kind),
            path,
            values,
        });
    }
    Ok(terms)
}

/// Builds `find` criteria: link properties of `class` mapped to the set of
/// identifiers any of which may match.
pub fn find_terms(codec: &PropertyCodec, class: &str, assignments: &[RawAssignment]) -> Result<Vec<(String, BTreeSet<Id>)>> {
    let mut terms = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let kind = codec.schema().kind_of(class, &assignment.property)?;
        if !kind.is_link() {
            return Err(HyperadminError::Usage(format!(
                "property \"{}\" is not a Link or Multilink", assignment.property
            )));
        }
        let mut ids = BTreeSet::new();
        for token in split_values(assignment.raw.as_deref().unwrap_or_default()) {
            ids.extend(codec.decode(class, None, &assignment.property, token)?.references());
        }
        terms.push((assignment.property.clone(), ids));
    }
    Ok(terms)
}
