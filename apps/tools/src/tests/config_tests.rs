use super::{apply_env_overrides, load_settings, normalize_database_url, Settings};

use std::{collections::HashMap, fs, path::PathBuf};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_full_urls_untouched() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./x.db?mode=rwc"),
        "sqlite://./x.db?mode=rwc"
    );
}

#[test]
fn rewrites_single_colon_windows_path() {
    assert_eq!(
        normalize_database_url("sqlite:C:\\Users\\alice\\test.db"),
        "sqlite://C:/Users/alice/test.db"
    );
}

#[test]
fn blank_url_falls_back_to_default() {
    assert_eq!(
        normalize_database_url("   "),
        "sqlite://./data/collections.db"
    );
}

#[test]
fn data_dir_is_used_when_no_url_is_set() {
    let settings = Settings {
        data_dir: Some(PathBuf::from("/srv/shelf")),
        ..Settings::default()
    };
    assert_eq!(
        settings.database_url(),
        "sqlite:///srv/shelf/collections.sqlite3"
    );

    let settings = Settings {
        database_url: Some("./explicit.db".into()),
        ..settings
    };
    assert_eq!(settings.database_url(), "sqlite://./explicit.db");
}

#[test]
fn app_prefixed_env_wins_over_plain_env() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env_of(&[
            ("DATABASE_URL", "sqlite://plain.db"),
            ("APP__DATABASE_URL", "sqlite://app.db"),
            ("APP__LOG_FILTER", "debug"),
            ("APP__SESSION_OWNER", " 12 "),
        ]),
    );
    assert_eq!(settings.database_url.as_deref(), Some("sqlite://app.db"));
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(settings.session_owner, Some(12));
}

#[test]
fn unparsable_session_owner_is_ignored() {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings, env_of(&[("APP__SESSION_OWNER", "me")]));
    assert_eq!(settings.session_owner, None);
}

#[test]
fn reads_settings_from_toml_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let config_path = temp_root.path().join("tools.toml");
    fs::write(
        &config_path,
        "database_url = \"sqlite://from-file.db\"\nsession_owner = 3\n",
    )
    .expect("write config");

    let settings = load_settings(&config_path).expect("settings");
    if std::env::var("APP__DATABASE_URL").is_err() && std::env::var("DATABASE_URL").is_err() {
        assert_eq!(settings.database_url(), "sqlite://from-file.db");
    }
    if std::env::var("APP__SESSION_OWNER").is_err() {
        assert_eq!(settings.session_owner, Some(3));
    }
}

#[test]
fn missing_config_file_yields_defaults() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let settings = load_settings(&temp_root.path().join("absent.toml")).expect("settings");
    assert_eq!(settings.data_dir, None);
}

#[test]
fn rejects_unknown_config_keys() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let config_path = temp_root.path().join("tools.toml");
    fs::write(&config_path, "bind_addr = \"0.0.0.0:1\"\n").expect("write config");

    let err = load_settings(&config_path).expect_err("unknown key");
    assert!(err.to_string().contains("invalid config file"));
}
