use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;

pub const DEFAULT_SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub seed_demo_data: bool,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8080".into(),
            seed_demo_data: true,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if Path::new(DEFAULT_SETTINGS_FILE).exists() {
        apply_file(&mut settings, Path::new(DEFAULT_SETTINGS_FILE))?;
    }
    apply_env(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let file_cfg = toml::from_str::<HashMap<String, String>>(&raw)
        .with_context(|| format!("'{}' must contain string key/value pairs", path.display()))?;

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("seed_demo_data") {
        settings.seed_demo_data = parse_flag("seed_demo_data", v)?;
    }
    if let Some(v) = file_cfg.get("max_body_bytes") {
        settings.max_body_bytes = v
            .parse()
            .with_context(|| format!("max_body_bytes '{v}' is not a byte count"))?;
    }
    Ok(())
}

fn apply_env(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__BIND_ADDR") {
        settings.server_bind = v;
    }
    if let Some(v) = lookup("APP__SEED_DEMO_DATA") {
        settings.seed_demo_data = parse_flag("APP__SEED_DEMO_DATA", &v)?;
    }
    Ok(())
}

fn parse_flag(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("{name} expects a boolean, got '{other}'"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
