use super::*;

use std::collections::HashMap;

use controller::WebhookMethod;
use shared::domain::LightId;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings =
        load_settings_from(&dir.path().join("missing.toml"), env_from(&[])).expect("settings");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.tick_seconds, 60);
    assert_eq!(settings.daily_reset_hour, 4);
    assert_eq!(settings.bridge(), None);
}

#[test]
fn file_values_are_overridden_by_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("daylight.toml");
    fs::write(
        &path,
        r#"
bind_addr = "0.0.0.0:9000"
bridge_url = "192.168.1.20"
bridge_username = "from-file"
tick_seconds = 30

[[webhooks]]
name = "porch"
url = "http://hooks.local/{id}/{on}"
method = "POST"
body = '{"light": "{name}"}'
lights = [3]
"#,
    )
    .expect("write config");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("HUE_USERNAME", "from-env"),
            ("DAYLIGHT_TICK_SECONDS", "15"),
            ("APP__TICK_SECONDS", "10"),
            ("DAYLIGHT_LOG", "debug,sqlx=warn"),
        ]),
    )
    .expect("settings");

    assert_eq!(settings.bind_addr, "0.0.0.0:9000");
    assert_eq!(settings.bridge(), Some(("192.168.1.20", "from-env")));
    // the APP__ alias wins
    assert_eq!(settings.tick_seconds, 10);
    assert_eq!(settings.log_filter, "debug,sqlx=warn");
    assert_eq!(settings.database_url, Settings::default().database_url);

    assert_eq!(settings.webhooks.len(), 1);
    let hook = &settings.webhooks[0];
    assert_eq!(hook.method, WebhookMethod::Post);
    assert_eq!(hook.lights, vec![LightId(3)]);
    assert!(hook.groups.is_empty());
}

#[test]
fn invalid_numbers_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.toml");

    let err = load_settings_from(&missing, env_from(&[("DAYLIGHT_TICK_SECONDS", "soon")]))
        .expect_err("not a number");
    assert!(err.to_string().contains("DAYLIGHT_TICK_SECONDS"));

    load_settings_from(&missing, env_from(&[("DAYLIGHT_DAILY_RESET_HOUR", "24")]))
        .expect_err("hour out of range");
    load_settings_from(&missing, env_from(&[("APP__TICK_SECONDS", "0")]))
        .expect_err("zero tick");
}

#[test]
fn malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("daylight.toml");
    fs::write(&path, "tick_seconds = \"often\"").expect("write config");
    load_settings_from(&path, env_from(&[])).expect_err("bad file");
}

#[test]
fn bridge_requires_both_url_and_username() {
    let settings = Settings {
        bridge_url: Some("hue.local".into()),
        ..Settings::default()
    };
    assert_eq!(settings.bridge(), None);
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn keeps_windows_absolute_path_with_single_sqlite_colon() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
    assert_eq!(
        normalize_database_url("C:\\Users\\alice\\test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite://C:/Users/alice/test.db"),
        "sqlite:C:/Users/alice/test.db"
    );
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("nested").join("daylight.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    assert!(dir.path().join("nested").exists());

    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);
    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
