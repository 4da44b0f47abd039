use std::fs;
use std::path::PathBuf;

use hyperadmin::codec::Resolver;
use hyperadmin::datatype::{Credential, Date, Decimal, Interval, Value};
use hyperadmin::error::HyperadminError;
use hyperadmin::memory::MemoryStore;
use hyperadmin::roundtrip::{
    ExportOptions, ImportOptions, attachment_file, export_class, export_classes, export_order,
    import_class, import_dir, journals_file, rows_file,
};
use hyperadmin::rows::Dialect;
use hyperadmin::schema::{ClassSpec, PropertyKind, Schema};
use hyperadmin::store::{JournalEntry, Store};

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hyperadmin_{}_{name}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn tracker() -> Schema {
    Schema::from_classes(vec![
        ClassSpec::new("user")
            .property("username", PropertyKind::String)
            .property("password", PropertyKind::Secret)
            .key("username"),
        ClassSpec::new("issue")
            .property("title", PropertyKind::String)
            .property("effort", PropertyKind::Number)
            .property("urgent", PropertyKind::Boolean)
            .property("deadline", PropertyKind::Date)
            .property("estimate", PropertyKind::Interval)
            .property("assignedto", PropertyKind::Link("user".to_string()))
            .property("nosy", PropertyKind::MultiLink("user".to_string())),
        ClassSpec::new("file")
            .property("name", PropertyKind::String)
            .with_attachments(),
    ])
    .unwrap()
}

fn s(text: &str) -> Value {
    Value::String(text.to_string())
}

fn prop(name: &str, value: Value) -> (String, Value) {
    (name.to_string(), value)
}

fn seeded() -> MemoryStore {
    let mut store = MemoryStore::new(tracker(), "admin");
    let anna = store
        .create("user", vec![
            prop("username", s("anna")),
            prop("password", Value::Secret(Credential::Plain("pw".to_string()))),
        ])
        .unwrap();
    let bert = store.create("user", vec![prop("username", s("bert"))]).unwrap();
    store
        .create("issue", vec![
            prop("title", s("colon: \"quoted\"\nand a second line")),
            prop("effort", Value::Number(Decimal::parse("2.25").unwrap())),
            prop("urgent", Value::Boolean(true)),
            prop("deadline", Value::Date(Date::parse_canonical("2024-05-01.09:00:00").unwrap())),
            prop("estimate", Value::Interval(Interval::parse("1w 2:30").unwrap())),
            prop("assignedto", Value::Link(anna)),
            prop("nosy", Value::MultiLink([anna, bert].into())),
        ])
        .unwrap();
    let second = store.create("issue", vec![prop("title", s(""))]).unwrap();
    store
        .set("issue", second, vec![("title".to_string(), Some(s("renamed"))), ("urgent".to_string(), Some(Value::Boolean(false)))])
        .unwrap();
    store.retire("user", bert).unwrap();
    store
}

fn values(store: &MemoryStore, class: &str) -> Vec<(u64, Vec<Option<Value>>, bool)> {
    let spec = store.schema().class(class).unwrap().clone();
    store
        .node_ids(class)
        .unwrap()
        .into_iter()
        .map(|id| {
            let row = spec
                .property_names()
                .map(|p| store.get(class, id, p).unwrap())
                .collect();
            (id, row, store.is_retired(class, id).unwrap())
        })
        .collect()
}

#[test]
fn export_then_import_reproduces_rows_journals_and_counter() {
    let dir = scratch("full_cycle");
    let source = seeded();
    let classes = ["user", "issue", "file"];
    let summary = export_classes(&source, &classes, &dir, &ExportOptions::default()).unwrap();
    assert_eq!(summary.classes.len(), 3);
    assert_eq!(summary.field_size_needed, None);
    assert_eq!(summary.classes[1].rows, 2);
    // two creations and one change
    assert_eq!(summary.classes[1].journals, 3);

    let mut target = MemoryStore::new(tracker(), "someone else");
    let report = import_dir(&mut target, &dir, &ImportOptions::default()).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.imported.len(), 3);

    for class in classes {
        assert_eq!(values(&target, class), values(&source, class), "{class} rows differ");
        assert_eq!(target.journals(class).unwrap(), source.journals(class).unwrap(), "{class} journals differ");
        let max = source.node_ids(class).unwrap().into_iter().max().unwrap_or(0);
        assert_eq!(target.next_id(class).unwrap(), max + 1);
    }
    // the stored hash came back untouched
    let Some(Value::Secret(credential)) = target.get("user", 1, "password").unwrap() else {
        panic!("password lost");
    };
    assert!(credential.verify("pw"));
    // retired bert gave up his key
    assert_eq!(target.lookup_key("user", "bert"), None);
    assert_eq!(target.lookup_key("user", "anna"), Some(1));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn header_row_names_the_columns() {
    let dir = scratch("header");
    export_class(&seeded(), "issue", &dir, &ExportOptions::default()).unwrap();
    let text = fs::read_to_string(rows_file(&dir, "issue")).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(header, "id:title:effort:urgent:deadline:estimate:assignedto:nosy:is retired");
    let journal = fs::read_to_string(journals_file(&dir, "issue")).unwrap();
    assert!(journal.lines().next().unwrap().starts_with("1:"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn retired_rows_precede_live_rows_with_the_same_key() {
    let mut store = MemoryStore::new(tracker(), "admin");
    let zed = store.create("user", vec![prop("username", s("zed"))]).unwrap();
    let first = store.create("user", vec![prop("username", s("amy"))]).unwrap();
    store.retire("user", first).unwrap();
    // the key is free again once retired
    let second = store.create("user", vec![prop("username", s("amy"))]).unwrap();
    let old = store.create("user", vec![prop("username", s("bob"))]).unwrap();
    store.retire("user", old).unwrap();
    assert_eq!(export_order(&store, "user").unwrap(), vec![first, second, old, zed]);

    // and the import of that order succeeds with both amys
    let dir = scratch("retired_first");
    export_class(&store, "user", &dir, &ExportOptions::default()).unwrap();
    let mut target = MemoryStore::new(tracker(), "admin");
    import_class(&mut target, "user", &dir, &ImportOptions::default()).unwrap();
    assert_eq!(target.lookup_key("user", "amy"), Some(second));
    assert!(target.is_retired("user", first).unwrap());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn header_mismatch_imports_nothing() {
    let dir = scratch("mismatch");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ticket.csv"), "id:title:status:is retired\n1:\"a\":\"open\":false\n").unwrap();
    let schema = Schema::from_classes(vec![
        ClassSpec::new("ticket")
            .property("title", PropertyKind::String)
            .property("priority", PropertyKind::String),
    ])
    .unwrap();
    let mut store = MemoryStore::new(schema, "admin");
    let err = import_class(&mut store, "ticket", &dir, &ImportOptions::default()).unwrap_err();
    match err {
        HyperadminError::FormatMismatch { class, expected, found } => {
            assert_eq!(class, "ticket");
            assert_eq!(expected, vec!["id", "title", "priority", "is retired"]);
            assert_eq!(found, vec!["id", "title", "status", "is retired"]);
        }
        other => panic!("unexpected {other}"),
    }
    assert!(store.node_ids("ticket").unwrap().is_empty());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn short_rows_are_arity_errors() {
    let dir = scratch("arity");
    fs::create_dir_all(&dir).unwrap();
    // JSON strings arrive quoted twice, once for JSON and once for the row
    fs::write(dir.join("file.csv"), "id:name:is retired\n1:\"\"\"a\"\"\":false\n2:\"\"\"b\"\"\"\n").unwrap();
    let mut store = MemoryStore::new(tracker(), "admin");
    let err = import_class(&mut store, "file", &dir, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, HyperadminError::RowArity { row: 2, expected: 3, found: 2, .. }), "{err}");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn one_bad_file_does_not_stop_the_others() {
    let dir = scratch("batch");
    export_classes(&seeded(), &["user", "issue"], &dir, &ExportOptions::default()).unwrap();
    // break the issue header
    let rows = rows_file(&dir, "issue");
    let text = fs::read_to_string(&rows).unwrap().replacen("effort", "effrot", 1);
    fs::write(&rows, text).unwrap();

    let mut store = MemoryStore::new(tracker(), "admin");
    let report = import_dir(&mut store, &dir, &ImportOptions::default()).unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "issue");
    assert_eq!(report.imported.len(), 1);
    assert_eq!(store.node_ids("user").unwrap(), vec![1, 2]);

    let mut store = MemoryStore::new(tracker(), "admin");
    let options = ImportOptions { abort_on_error: true, ..ImportOptions::default() };
    let err = import_dir(&mut store, &dir, &options).unwrap_err();
    assert!(matches!(err, HyperadminError::FormatMismatch { .. }));
    // issue sorts before user, so nothing was loaded
    assert!(store.node_ids("user").unwrap().is_empty());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_journal_is_tolerated_and_counter_still_set() {
    let dir = scratch("no_journal");
    export_class(&seeded(), "issue", &dir, &ExportOptions::default()).unwrap();
    fs::remove_file(journals_file(&dir, "issue")).unwrap();
    let mut store = MemoryStore::new(tracker(), "admin");
    let imported = import_class(&mut store, "issue", &dir, &ImportOptions::default()).unwrap();
    assert_eq!((imported.rows, imported.journals, imported.next_id), (2, 0, 3));
    assert_eq!(store.next_id("issue").unwrap(), 3);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn import_overwrites_and_resets_counter() {
    let dir = scratch("overwrite");
    let mut source = MemoryStore::new(tracker(), "admin");
    source.create("file", vec![prop("name", s("exported"))]).unwrap();
    export_class(&source, "file", &dir, &ExportOptions::default()).unwrap();

    let mut target = MemoryStore::new(tracker(), "admin");
    for name in ["a", "b", "c"] {
        target.create("file", vec![prop("name", s(name))]).unwrap();
    }
    import_class(&mut target, "file", &dir, &ImportOptions::default()).unwrap();
    assert_eq!(target.get("file", 1, "name").unwrap(), Some(s("exported")));
    assert_eq!(target.get("file", 3, "name").unwrap(), Some(s("c")));
    assert_eq!(target.next_id("file").unwrap(), 2);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn import_refuses_a_key_held_by_another_live_instance() {
    let dir = scratch("key_conflict");
    let mut source = MemoryStore::new(tracker(), "admin");
    source.create("user", vec![prop("username", s("bert"))]).unwrap();
    export_class(&source, "user", &dir, &ExportOptions::default()).unwrap();

    let mut target = MemoryStore::new(tracker(), "admin");
    target.create("user", vec![prop("username", s("anna"))]).unwrap();
    let bert = target.create("user", vec![prop("username", s("bert"))]).unwrap();
    let err = import_class(&mut target, "user", &dir, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, HyperadminError::Storage(_)), "{err}");
    assert_eq!(target.lookup_key("user", "bert"), Some(bert));
    assert_eq!(target.get("user", 1, "username").unwrap(), Some(s("anna")));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn attachments_follow_their_rows_unless_tables_only() {
    let dir = scratch("attachments");
    let mut source = MemoryStore::new(tracker(), "admin");
    let id = source.create("file", vec![prop("name", s("log.txt"))]).unwrap();
    source.set_attachment("file", id, b"line one\nline two\n".to_vec()).unwrap();
    source.create("file", vec![prop("name", s("empty"))]).unwrap();

    let tables_only = ExportOptions { attachments: false, ..ExportOptions::default() };
    let report = export_class(&source, "file", &dir, &tables_only).unwrap();
    assert_eq!(report.attachments, 0);
    assert!(!attachment_file(&dir, "file", id).exists());

    let report = export_class(&source, "file", &dir, &ExportOptions::default()).unwrap();
    assert_eq!(report.attachments, 1);
    assert!(dir.join("file-files").join("0").join("file1").exists());

    let mut target = MemoryStore::new(tracker(), "admin");
    let imported = import_class(&mut target, "file", &dir, &ImportOptions::default()).unwrap();
    assert_eq!(imported.attachments, 1);
    assert_eq!(target.attachment("file", id).unwrap().unwrap(), b"line one\nline two\n");
    assert_eq!(target.attachment("file", 2).unwrap(), None);

    let mut target = MemoryStore::new(tracker(), "admin");
    let options = ImportOptions { attachments: false, ..ImportOptions::default() };
    import_class(&mut target, "file", &dir, &options).unwrap();
    assert_eq!(target.attachment("file", id).unwrap(), None);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn oversized_fields_are_reported_not_refused() {
    let dir = scratch("oversized");
    let mut store = MemoryStore::new(tracker(), "admin");
    store.create("file", vec![prop("name", s(&"x".repeat(300)))]).unwrap();
    let options = ExportOptions { csv_field_size: 100, ..ExportOptions::default() };
    let summary = export_classes(&store, &["file"], &dir, &options).unwrap();
    // 300 characters, the JSON quotes, and the row quoting around those
    assert_eq!(summary.field_size_needed, Some(306));
    assert_eq!(summary.classes[0].rows, 1);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn other_delimiters_round_trip() {
    let dir = scratch("pipes");
    let source = seeded();
    let dialect = Dialect::new('|').unwrap();
    let export = ExportOptions { dialect, ..ExportOptions::default() };
    export_class(&source, "issue", &dir, &export).unwrap();
    let header = fs::read_to_string(rows_file(&dir, "issue")).unwrap();
    assert!(header.starts_with("id|title|"));

    let mut target = MemoryStore::new(tracker(), "admin");
    let import = ImportOptions { dialect, ..ImportOptions::default() };
    import_class(&mut target, "issue", &dir, &import).unwrap();
    assert_eq!(values(&target, "issue"), values(&source, "issue"));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn journal_entries_keep_their_payload_verbatim() {
    let dir = scratch("journal_payload");
    let mut source = MemoryStore::new(tracker(), "admin");
    let id = source.create("file", vec![prop("name", s("a"))]).unwrap();
    let stamp = Date::parse_canonical("2020-02-02.02:02:02").unwrap();
    source
        .import_journal("file", JournalEntry::new(id, stamp, "robot", "link", "{\"odd\": \"a:b\\n\"}\nsecond line"))
        .unwrap();
    export_class(&source, "file", &dir, &ExportOptions::default()).unwrap();
    let mut target = MemoryStore::new(tracker(), "admin");
    import_class(&mut target, "file", &dir, &ImportOptions::default()).unwrap();
    assert_eq!(target.journal("file", id).unwrap(), source.journal("file", id).unwrap());
    let _ = fs::remove_dir_all(&dir);
}
