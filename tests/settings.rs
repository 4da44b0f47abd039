use hyperadmin::error::HyperadminError;
use hyperadmin::schema::PropertyKind;
use hyperadmin::settings::Settings;

#[test]
fn defaults_without_a_file() {
    let settings = Settings::from_toml("").unwrap();
    assert_eq!(settings.delimiter, ":");
    assert_eq!(settings.user, "admin");
    assert_eq!(settings.separator, None);
    assert!(!settings.print_designator && !settings.abort_on_error);
    assert_eq!(settings.dialect().unwrap().delimiter(), ':');
    assert!(settings.schema().unwrap().class_names().is_empty());
}

#[test]
fn classes_keep_their_declared_order() {
    let settings = Settings::from_toml(
        r#"
        delimiter = "|"
        separator = ","
        user = "importer"
        csv_field_size = 512

        [[classes]]
        name = "status"
        key = "name"
        properties = ["name: String", "order: Number"]

        [[classes]]
        name = "file"
        attachments = true
        properties = ["name: String", "status: Link(status)", "readers: Multilink(status)"]
        "#,
    )
    .unwrap();
    assert_eq!(settings.separator.as_deref(), Some(","));
    let options = settings.export_options(false).unwrap();
    assert_eq!(options.dialect.delimiter(), '|');
    assert_eq!(options.csv_field_size, 512);
    assert!(!options.attachments);

    let schema = settings.schema().unwrap();
    assert_eq!(schema.class_names(), ["status", "file"]);
    let file = schema.class("file").unwrap();
    assert!(file.has_attachments());
    assert_eq!(file.property_names().collect::<Vec<_>>(), vec!["name", "status", "readers"]);
    assert_eq!(file.kind("readers"), Some(&PropertyKind::MultiLink("status".to_string())));
    assert_eq!(schema.class("status").unwrap().key_property(), Some("name"));
}

#[test]
fn delimiters_must_be_single_usable_characters() {
    for delimiter in ["::", "", "\\\""] {
        let toml = format!("delimiter = \"{delimiter}\"");
        let err = Settings::from_toml(&toml).unwrap_err();
        assert!(matches!(err, HyperadminError::Config(_)), "{delimiter:?} gave {err}");
    }
    let err = Settings::from_toml("csv_field_size = 0").unwrap_err();
    assert!(matches!(err, HyperadminError::Config(_)));
}

#[test]
fn broken_class_definitions_fail_schema_building() {
    let unknown_kind = Settings::from_toml(
        r#"
        [[classes]]
        name = "user"
        properties = ["mood: Feeling"]
        "#,
    )
    .unwrap();
    assert!(matches!(unknown_kind.schema().unwrap_err(), HyperadminError::Schema(_)));

    let no_kind = Settings::from_toml(
        r#"
        [[classes]]
        name = "user"
        properties = ["mood"]
        "#,
    )
    .unwrap();
    assert!(matches!(no_kind.schema().unwrap_err(), HyperadminError::Schema(_)));

    let dangling = Settings::from_toml(
        r#"
        [[classes]]
        name = "issue"
        properties = ["assignedto: Link(user)"]
        "#,
    )
    .unwrap();
    assert!(matches!(dangling.schema().unwrap_err(), HyperadminError::Schema(_)));
}
