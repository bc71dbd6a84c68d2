use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::Context;
use url::Url;

pub const DEFAULT_SETTINGS_FILE: &str = "pipeline.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub report_debounce: Duration,
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080/".into(),
            request_timeout: Duration::from_secs(10),
            report_debounce: Duration::from_millis(150),
            event_buffer: 256,
        }
    }
}

impl ClientSettings {
    pub fn with_base_url(base_url: &str) -> anyhow::Result<Self> {
        Ok(Self {
            api_base_url: parse_base_url(base_url)?.to_string(),
            ..Self::default()
        })
    }
}

/// Defaults, then `pipeline.toml` (or `path`), then environment overrides.
pub fn load_client_settings(path: Option<&Path>) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();
    match path {
        Some(path) => apply_file(&mut settings, path)?,
        None if Path::new(DEFAULT_SETTINGS_FILE).exists() => {
            apply_file(&mut settings, Path::new(DEFAULT_SETTINGS_FILE))?
        }
        None => {}
    }
    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("'{}' must contain string key/value pairs", path.display()))?;
    apply_pairs(settings, |key| file_cfg.get(key).cloned(), &FILE_KEYS)
}

fn apply_env(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("PIPELINE_API_URL") {
        settings.api_base_url = parse_base_url(&v)?.to_string();
    }
    apply_pairs(settings, lookup, &ENV_KEYS)
}

struct KeyNames {
    api_url: &'static str,
    timeout_ms: &'static str,
    debounce_ms: &'static str,
    event_buffer: &'static str,
}

const FILE_KEYS: KeyNames = KeyNames {
    api_url: "api_url",
    timeout_ms: "request_timeout_ms",
    debounce_ms: "report_debounce_ms",
    event_buffer: "event_buffer",
};

const ENV_KEYS: KeyNames = KeyNames {
    api_url: "APP__API_URL",
    timeout_ms: "APP__REQUEST_TIMEOUT_MS",
    debounce_ms: "APP__REPORT_DEBOUNCE_MS",
    event_buffer: "APP__EVENT_BUFFER",
};

fn apply_pairs(
    settings: &mut ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
    keys: &KeyNames,
) -> anyhow::Result<()> {
    if let Some(v) = lookup(keys.api_url) {
        settings.api_base_url = parse_base_url(&v)?.to_string();
    }
    if let Some(v) = lookup(keys.timeout_ms) {
        settings.request_timeout = Duration::from_millis(parse_number(keys.timeout_ms, &v)?);
    }
    if let Some(v) = lookup(keys.debounce_ms) {
        settings.report_debounce = Duration::from_millis(parse_number(keys.debounce_ms, &v)?);
    }
    if let Some(v) = lookup(keys.event_buffer) {
        let buffer = parse_number(keys.event_buffer, &v)?;
        anyhow::ensure!(buffer > 0, "{} must be positive", keys.event_buffer);
        settings.event_buffer = usize::try_from(buffer)
            .with_context(|| format!("{} is too large", keys.event_buffer))?;
    }
    Ok(())
}

fn parse_number(name: &str, raw: &str) -> anyhow::Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{name} expects a whole number, got '{raw}'"))
}

/// Accepts `http(s)` URLs and normalizes them to end with a slash so joins keep the path.
pub fn parse_base_url(raw: &str) -> anyhow::Result<Url> {
    let mut url =
        Url::parse(raw.trim()).with_context(|| format!("invalid api url '{raw}'"))?;
    anyhow::ensure!(
        matches!(url.scheme(), "http" | "https"),
        "api url '{raw}' must use http or https"
    );
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
