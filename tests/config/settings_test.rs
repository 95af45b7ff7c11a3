use aggsql::config::{Settings, SettingsError};
use aggsql::{translate_json, Dialect, OracleConfiguration, TranslateError, TranslationOptions};
use serde_json::json;
use std::io::Write;

#[test]
fn test_settings_from_toml() {
    let settings = Settings::from_toml(
        r#"
[oracle]
collection = "orders"
schema = "sales"
data_column = "doc"
id_column = "doc_id"

[translation]
dialect = "oracle23ai"
inline_binds = true
optimize = false
"#,
    )
    .unwrap();

    assert_eq!(settings.oracle.qualified_table(), "sales.orders");
    assert_eq!(settings.oracle.data_column, "doc");
    assert_eq!(settings.oracle.id_column, "doc_id");
    assert_eq!(settings.translation.dialect, Dialect::Oracle23ai);
    assert!(settings.translation.inline_binds);
    assert!(!settings.translation.optimize);
    assert!(!settings.translation.pretty);
}

#[test]
fn test_settings_drive_translation() {
    let settings = Settings::from_toml(
        r#"
[oracle]
collection = "orders"
data_column = "doc"

[translation]
inline_binds = true
"#,
    )
    .unwrap();

    let result = translate_json(
        &json!([{"$match": {"status": "active"}}]),
        &settings.oracle,
        &settings.translation,
    )
    .unwrap();
    assert_eq!(
        result.sql,
        "SELECT base.doc FROM orders base WHERE base.doc.status.string() = 'active'"
    );
    assert!(result.binds.is_empty());
}

#[test]
fn test_environment_expansion() {
    std::env::set_var("AGGSQL_SETTINGS_TEST_SCHEMA", "reporting");
    let settings = Settings::from_toml(
        r#"
[oracle]
collection = "orders"
schema = "${AGGSQL_SETTINGS_TEST_SCHEMA}"
"#,
    )
    .unwrap();
    assert_eq!(settings.oracle.schema.as_deref(), Some("reporting"));
    std::env::remove_var("AGGSQL_SETTINGS_TEST_SCHEMA");
}

#[test]
fn test_missing_environment_variable() {
    let err = Settings::from_toml(
        r#"
[oracle]
collection = "${AGGSQL_SETTINGS_TEST_UNSET_12345}"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SettingsError::MissingEnvVar(ref name) if name == "AGGSQL_SETTINGS_TEST_UNSET_12345"));
}

#[test]
fn test_unknown_dialect_is_parse_error() {
    let err = Settings::from_toml(
        r#"
[translation]
dialect = "oracle8i"
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SettingsError::ParseError(_)));
}

#[test]
fn test_settings_from_file() {
    let path = std::env::temp_dir().join(format!("aggsql_settings_{}.toml", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "[oracle]\ncollection = \"events\"\n\n[translation]\npretty = true").unwrap();
    drop(file);

    let settings = Settings::from_file(&path).unwrap();
    assert_eq!(settings.oracle.collection, "events");
    assert!(settings.translation.pretty);
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(
        Settings::from_file(&path),
        Err(SettingsError::FileNotFound(_))
    ));
}

#[test]
fn test_configuration_names_are_checked() {
    let config = OracleConfiguration::new("orders").with_data_column("data; --");
    let err = translate_json(&json!([]), &config, &TranslationOptions::default()).unwrap_err();
    assert!(matches!(err, TranslateError::Validation(_)));
}
