use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use controller::WebhookConfig;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "daylight.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub bridge_url: Option<String>,
    pub bridge_username: Option<String>,
    pub tick_seconds: u64,
    /// Local hour at which curve offsets and overrides are reset.
    pub daily_reset_hour: u32,
    pub http_timeout_seconds: u64,
    pub log_filter: String,
    pub webhooks: Vec<WebhookConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/daylight.db".into(),
            bridge_url: None,
            bridge_username: None,
            tick_seconds: 60,
            daily_reset_hour: 4,
            http_timeout_seconds: 5,
            log_filter: "info".into(),
            webhooks: Vec::new(),
        }
    }
}

impl Settings {
    /// Bridge address and username, when both are configured.
    pub fn bridge(&self) -> Option<(&str, &str)> {
        match (self.bridge_url.as_deref(), self.bridge_username.as_deref()) {
            (Some(url), Some(username)) if !url.trim().is_empty() && !username.is_empty() => {
                Some((url, username))
            }
            _ => None,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.tick_seconds == 0 {
            bail!("tick_seconds must be at least 1");
        }
        if self.daily_reset_hour > 23 {
            bail!(
                "daily_reset_hour must be within 0..=23, got {}",
                self.daily_reset_hour
            );
        }
        if self.http_timeout_seconds == 0 {
            bail!("http_timeout_seconds must be at least 1");
        }
        Ok(())
    }
}

pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the optional config file, then the environment. For every
/// setting the `APP__` alias wins over the plain variable.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<Settings>(&raw)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?,
        Err(_) => Settings::default(),
    };

    if let Some(v) = env_override(&env, &["DAYLIGHT_BIND", "APP__BIND_ADDR"]) {
        settings.bind_addr = v;
    }
    if let Some(v) = env_override(&env, &["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    if let Some(v) = env_override(&env, &["HUE_BRIDGE_URL", "APP__BRIDGE_URL"]) {
        settings.bridge_url = Some(v);
    }
    if let Some(v) = env_override(&env, &["HUE_USERNAME", "APP__BRIDGE_USERNAME"]) {
        settings.bridge_username = Some(v);
    }
    if let Some(v) = parsed_override(&env, &["DAYLIGHT_TICK_SECONDS", "APP__TICK_SECONDS"])? {
        settings.tick_seconds = v;
    }
    if let Some(v) = parsed_override(
        &env,
        &["DAYLIGHT_DAILY_RESET_HOUR", "APP__DAILY_RESET_HOUR"],
    )? {
        settings.daily_reset_hour = v;
    }
    if let Some(v) = parsed_override(
        &env,
        &["DAYLIGHT_HTTP_TIMEOUT_SECONDS", "APP__HTTP_TIMEOUT_SECONDS"],
    )? {
        settings.http_timeout_seconds = v;
    }
    if let Some(v) = env_override(&env, &["DAYLIGHT_LOG", "APP__LOG_FILTER"]) {
        settings.log_filter = v;
    }

    settings.validate()?;
    Ok(settings)
}

fn env_override(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| env(key)).last()
}

fn parsed_override<T>(
    env: &impl Fn(&str) -> Option<String>,
    keys: &[&str],
) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let Some(raw) = env_override(env, keys) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{raw}' for {}", keys.join(" / ")))?;
    Ok(Some(value))
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        return sqlite_url_for_path(path);
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return sqlite_url_for_path(path);
    }

    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    sqlite_url_for_path(raw_database_url)
}

/// `sqlite://` for unix-style paths, `sqlite:` for drive-letter paths.
fn sqlite_url_for_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    if has_drive_letter(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
