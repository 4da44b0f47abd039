//! The administrative operations and the table they are dispatched from.
use std::path::Path;

use tracing::info;

use crate::codec::{encode, parse_assignments};
use crate::command::CommandTable;
use crate::datatype::{Date, Interval};
use crate::error::{HyperadminError, Result};
use crate::path::{Designator, designator_in, filter_terms, find_terms, split_designator};
use crate::roundtrip::{export_classes, import_dir};
use crate::schema::{ID_PROPERTY, Id};
use crate::session::{Operation, Session};
use crate::store::Store;

pub fn command_table() -> CommandTable<Operation> {
    CommandTable::<Operation>::builder()
        .register("commit", do_commit)
        .register("create", do_create)
        .register("display", do_display)
        .register("export", do_export)
        .register("exporttables", do_exporttables)
        .register("filter", do_filter)
        .register("find", do_find)
        .register("get", do_get)
        .register("history", do_history)
        .register("import", do_import)
        .register("importtables", do_importtables)
        .register("list", do_list)
        .register("pack", do_pack)
        .register("restore", do_restore)
        .register("retire", do_retire)
        .register("rollback", do_rollback)
        .register("set", do_set)
        .register("specification", do_specification)
        .register("table", do_table)
        .build()
}

fn not_enough() -> HyperadminError {
    HyperadminError::Usage("Not enough arguments supplied".to_string())
}

fn too_many() -> HyperadminError {
    HyperadminError::Usage("Too many arguments supplied".to_string())
}

fn designators(session: &Session, list: &str) -> Result<Vec<Designator>> {
    list.split(',')
        .map(|text| designator_in(session.schema(), text))
        .collect()
}

/// Display text of one property, with `id` standing for the identifier.
fn property_text(store: &dyn Store, class: &str, id: Id, property: &str) -> Result<String> {
    if property == ID_PROPERTY {
        return Ok(id.to_string());
    }
    Ok(store.get(class, id, property)?.map(|v| encode(&v)).unwrap_or_default())
}

fn check_property(session: &Session, class: &str, property: &str) -> Result<()> {
    if property != ID_PROPERTY {
        session.schema().kind_of(class, property)?;
    }
    Ok(())
}

/// get property designator[,designator]*
pub fn do_get(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [property, list, ..] = args else {
        return Err(not_enough());
    };
    let print_designator = session.settings().print_designator;
    let joined = session.settings().separator.is_some();
    let mut items = Vec::new();
    for designator in designators(session, list)? {
        let class = designator.class.as_str();
        let kind = session.schema().kind_of(class, property)?;
        let value = session.store().get(class, designator.id, property)?;
        if print_designator {
            let target = kind.target().ok_or_else(|| {
                HyperadminError::Usage(format!(
                    "property {property} is not of type Multilink or Link so the designator option does not apply"
                ))
            })?;
            let refs = value.map(|v| v.references()).unwrap_or_default();
            items.extend(refs.iter().map(|id| format!("{target}{id}")));
        } else if joined && kind.is_link() {
            let refs = value.map(|v| v.references()).unwrap_or_default();
            items.extend(refs.iter().map(Id::to_string));
        } else {
            items.push(value.map(|v| encode(&v)).unwrap_or_default());
        }
    }
    Ok(session.join(items))
}

/// set designator[,designator]*|class property=value ...
pub fn do_set(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [targets, assignments @ ..] = args else {
        return Err(not_enough());
    };
    if assignments.is_empty() {
        return Err(not_enough());
    }
    let targets = if targets.contains(',') {
        designators(session, targets)?
    } else {
        match split_designator(targets) {
            Ok(designator) => {
                session.schema().class(&designator.class)?;
                vec![designator]
            }
            // a bare class name means every live instance of it
            Err(_) => session
                .store()
                .list(targets)?
                .into_iter()
                .map(|id| Designator::new(targets, id))
                .collect(),
        }
    };
    let assignments = parse_assignments(assignments)?;
    for target in targets {
        // relative multilink edits are decoded against each instance in turn
        let changes = {
            let codec = session.codec();
            assignments
                .iter()
                .map(|a| {
                    codec
                        .decode_assignment(&target.class, Some(target.id), a)
                        .map(|value| (a.property.clone(), value))
                })
                .collect::<Result<Vec<_>>>()?
        };
        session.store_mut().set(&target.class, target.id, changes)?;
        session.mark_uncommitted();
    }
    Ok(Vec::new())
}

/// filter class path=value[,value] ...
pub fn do_filter(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [class, assignments @ ..] = args else {
        return Err(not_enough());
    };
    session.schema().class(class)?;
    let assignments = parse_assignments(assignments)?;
    let terms = filter_terms(&session.codec(), class, &assignments)?;
    let ids = session.store().filter(class, &terms)?;
    Ok(session.format_ids(class, &ids))
}

/// find class property=value[,value] ...
pub fn do_find(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [class, assignments @ ..] = args else {
        return Err(not_enough());
    };
    session.schema().class(class)?;
    let assignments = parse_assignments(assignments)?;
    let terms = find_terms(&session.codec(), class, &assignments)?;
    let ids = session.store().find(class, &terms)?;
    Ok(session.format_ids(class, &ids))
}

/// specification class
pub fn do_specification(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [class, ..] = args else {
        return Err(not_enough());
    };
    let spec = session.schema().class(class)?;
    Ok(spec
        .properties()
        .iter()
        .map(|(name, kind)| {
            if spec.key_property() == Some(name.as_str()) {
                format!("{name}: {kind} (key property)")
            } else {
                format!("{name}: {kind}")
            }
        })
        .collect())
}

/// display designator[,designator]*
pub fn do_display(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [list, ..] = args else {
        return Err(not_enough());
    };
    let mut lines = Vec::new();
    for designator in designators(session, list)? {
        let spec = session.schema().class(&designator.class)?;
        let mut properties: Vec<&str> = spec.property_names().collect();
        properties.sort_unstable();
        for property in properties {
            let value = property_text(session.store(), &designator.class, designator.id, property)?;
            lines.push(format!("{property}: {value}"));
        }
    }
    Ok(lines)
}

/// create class property=value ...
pub fn do_create(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [class, assignments @ ..] = args else {
        return Err(not_enough());
    };
    session.schema().class(class)?;
    let assignments = parse_assignments(assignments)?;
    let values = {
        let codec = session.codec();
        let mut values = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            if let Some(value) = codec.decode_assignment(class, None, assignment)? {
                values.push((assignment.property.clone(), value));
            }
        }
        values
    };
    let id = session.store_mut().create(class, values)?;
    session.mark_uncommitted();
    Ok(vec![id.to_string()])
}

/// list class [property]
pub fn do_list(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    if args.len() > 2 {
        return Err(too_many());
    }
    let [class, rest @ ..] = args else {
        return Err(not_enough());
    };
    let spec = session.schema().class(class)?;
    let explicit = rest.first().map(String::as_str);
    let property = explicit.or_else(|| spec.label_property()).unwrap_or(ID_PROPERTY);
    check_property(session, class, property)?;
    let ids = session.store().list(class)?;
    if session.settings().separator.is_some() {
        if explicit.is_none() {
            return Ok(session.format_ids(class, &ids));
        }
        let values = ids
            .iter()
            .map(|id| property_text(session.store(), class, *id, property))
            .collect::<Result<Vec<_>>>()?;
        return Ok(session.join(values));
    }
    ids.iter()
        .map(|id| Ok(format!("{id:>4}: {}", property_text(session.store(), class, *id, property)?)))
        .collect()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// table class [property[:width][,property[:width]]*]
pub fn do_table(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [class, rest @ ..] = args else {
        return Err(not_enough());
    };
    let spec = session.schema().class(class)?;
    let requested: Vec<String> = match rest.first() {
        Some(list) => list.split(',').map(String::from).collect(),
        None => std::iter::once(ID_PROPERTY)
            .chain(spec.property_names())
            .map(String::from)
            .collect(),
    };
    let ids = session.store().list(class)?;

    // column name and width
    let mut columns: Vec<(String, usize)> = Vec::with_capacity(requested.len());
    for column in &requested {
        let (name, width) = match column.split(':').collect::<Vec<_>>().as_slice() {
            [name] => (name.to_string(), None),
            [name, ""] => (name.to_string(), Some(name.chars().count())),
            [name, width] => {
                let width = width.parse::<usize>().map_err(|_| {
                    HyperadminError::Usage(format!(
                        "\"{column}\" does not have an integer width: \"{width}\""
                    ))
                })?;
                (name.to_string(), Some(width))
            }
            _ => return Err(HyperadminError::Usage(format!("\"{column}\" not name:width"))),
        };
        check_property(session, class, &name)?;
        let width = match width {
            Some(width) => width,
            None => {
                let mut widest = name.chars().count();
                for id in &ids {
                    widest = widest.max(property_text(session.store(), class, *id, &name)?.chars().count());
                }
                widest
            }
        };
        columns.push((name, width));
    }

    let mut lines = Vec::with_capacity(ids.len() + 1);
    lines.push(
        columns
            .iter()
            .map(|(name, width)| format!("{:<width$}", capitalize(name), width = *width))
            .collect::<Vec<_>>()
            .join(" "),
    );
    for id in &ids {
        let mut cells = Vec::with_capacity(columns.len());
        for (name, width) in &columns {
            let value: String = property_text(session.store(), class, *id, name)?
                .chars()
                .take(*width)
                .collect();
            cells.push(format!("{value:<width$}", width = *width));
        }
        lines.push(cells.join(" "));
    }
    Ok(lines)
}

/// history designator
pub fn do_history(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let designator = match args {
        [] => return Err(not_enough()),
        [designator] => designator_in(session.schema(), designator)?,
        _ => return Err(too_many()),
    };
    Ok(session
        .store()
        .journal(&designator.class, designator.id)?
        .iter()
        .map(ToString::to_string)
        .collect())
}

/// retire designator[,designator]*
pub fn do_retire(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [list, ..] = args else {
        return Err(not_enough());
    };
    for designator in designators(session, list)? {
        session.store_mut().retire(&designator.class, designator.id)?;
        session.mark_uncommitted();
    }
    Ok(Vec::new())
}

/// restore designator[,designator]*
pub fn do_restore(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [list, ..] = args else {
        return Err(not_enough());
    };
    for designator in designators(session, list)? {
        session.store_mut().restore(&designator.class, designator.id)?;
        session.mark_uncommitted();
    }
    Ok(Vec::new())
}

/// export [[-]class[,class]] dir
pub fn do_export(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    export(session, args, true)
}

/// exporttables [[-]class[,class]] dir
pub fn do_exporttables(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    export(session, args, false)
}

fn export(session: &mut Session, args: &[String], attachments: bool) -> Result<Vec<String>> {
    let (dir, selection) = match args {
        [dir] => (dir, None),
        [selection, dir] => (dir, Some(selection.as_str())),
        [] => return Err(not_enough()),
        _ => return Err(too_many()),
    };
    let all = session.schema().class_names();
    let classes: Vec<String> = match selection {
        None => all.to_vec(),
        Some(selection) => match selection.strip_prefix('-') {
            Some(excluded) => {
                let excluded: Vec<&str> = excluded.split(',').collect();
                all.iter()
                    .filter(|class| !excluded.contains(&class.as_str()))
                    .cloned()
                    .collect()
            }
            None => {
                let listed: Vec<String> = selection.split(',').map(String::from).collect();
                for class in &listed {
                    session.schema().class(class)?;
                }
                listed
            }
        },
    };
    let options = session.settings().export_options(attachments)?;
    let summary = export_classes(session.store(), &classes, Path::new(dir), &options)?;
    let mut lines = Vec::new();
    if session.settings().verbose {
        for report in &summary.classes {
            lines.push(format!(
                "exported {}: {} rows, {} journal entries, {} files",
                report.class, report.rows, report.journals, report.attachments
            ));
        }
    }
    if let Some(needed) = summary.field_size_needed {
        lines.push(format!("Warning: config csv_field_size should be at least {needed}"));
    }
    Ok(lines)
}

/// import dir
pub fn do_import(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    import(session, args, true)
}

/// importtables dir
pub fn do_importtables(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    import(session, args, false)
}

fn import(session: &mut Session, args: &[String], attachments: bool) -> Result<Vec<String>> {
    let [dir, ..] = args else {
        return Err(not_enough());
    };
    let options = session.settings().import_options(attachments)?;
    let report = import_dir(session.store_mut(), Path::new(dir), &options)?;
    session.mark_uncommitted();
    if !report.is_clean() {
        return Err(HyperadminError::Import {
            failures: report
                .failed
                .iter()
                .map(|(class, e)| format!("{class}: {e}"))
                .collect(),
        });
    }
    Ok(report
        .imported
        .iter()
        .map(|class| format!("setting {} {}", class.class, class.next_id))
        .collect())
}

/// pack period|date
pub fn do_pack(session: &mut Session, args: &[String]) -> Result<Vec<String>> {
    let [spec] = args else {
        return Err(if args.is_empty() { not_enough() } else { too_many() });
    };
    let invalid = || HyperadminError::InvalidValue {
        property: "pack".to_string(),
        kind: "Date".to_string(),
        raw: spec.clone(),
    };
    // a bare period counts back from now, so it carries no sign
    if spec.trim_start().starts_with(['+', '-']) {
        return Err(invalid());
    }
    let before = if Interval::parse(spec).is_some() {
        Date::parse(&format!(". - {spec}"))
    } else {
        Date::parse(spec)
    };
    let before = before.ok_or_else(invalid)?;
    let dropped = session.store_mut().pack(before)?;
    info!("packed {dropped} journal entries older than {before}");
    session.mark_uncommitted();
    Ok(Vec::new())
}

/// commit
pub fn do_commit(session: &mut Session, _args: &[String]) -> Result<Vec<String>> {
    session.commit()?;
    Ok(Vec::new())
}

/// rollback
pub fn do_rollback(session: &mut Session, _args: &[String]) -> Result<Vec<String>> {
    session.rollback()?;
    Ok(Vec::new())
}
