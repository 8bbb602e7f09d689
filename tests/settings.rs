use std::fs;

use jstage::settings::Settings;

#[test]
fn missing_file_is_created_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("save").join("settings.json");

    let settings = Settings::load_or_default(&path).unwrap();
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.language, "FR");
    assert_eq!(settings.progression, "LNiveau1");
    assert!(path.exists());
}

#[test]
fn corrupt_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();

    assert_eq!(Settings::load_or_default(&path).unwrap(), Settings::default());
    let rewritten: Settings = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(rewritten, Settings::default());
}

#[test]
fn saved_settings_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = Settings {
        language: "EN".into(),
        username: "ada".into(),
        progression: "LNiveau3".into(),
        all_access: true,
        has_selected_username: true,
    };
    settings.save(&path).unwrap();
    assert_eq!(Settings::load_or_default(&path).unwrap(), settings);
}

#[test]
fn partial_file_keeps_defaults_for_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, r#"{ "language": "EN" }"#).unwrap();

    let settings = Settings::load_or_default(&path).unwrap();
    assert_eq!(settings.language, "EN");
    assert_eq!(settings.username, "Player");
}

#[test]
fn values_are_looked_up_by_key() {
    let settings = Settings::default();
    assert_eq!(settings.value("language"), Some(serde_json::json!("FR")));
    assert_eq!(settings.value("all_access"), Some(serde_json::json!(false)));
    assert_eq!(settings.value("volume"), None);
}
