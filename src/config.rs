#![forbid(unsafe_code)]

//! Runtime configuration shared by the binaries.
//!
//! Values resolve in order: explicit override (CLI flag), process environment,
//! `.env` file, built-in default. Everything has a default so the tool runs
//! out of the box with a `transcripts/` directory next to the binary.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_TRANSCRIPTS_DIR: &str = "transcripts";
pub const DEFAULT_WWW_ROOT: &str = "www";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub transcripts_dir: PathBuf,
    pub www_root: PathBuf,
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub transcripts_dir: Option<PathBuf>,
    pub www_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub env_path: Option<PathBuf>,
}

pub fn load_config(overrides: ConfigOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(&env_path)?;
    Ok(resolve_config(&file_vars, env_var_string, overrides))
}

fn resolve_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: ConfigOverrides,
) -> RuntimeConfig {
    let lookup = |key: &str| env_lookup(key).or_else(|| file_vars.get(key).cloned());

    let transcripts_dir = overrides
        .transcripts_dir
        .or_else(|| lookup("TRANSCRIPTS_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TRANSCRIPTS_DIR));
    let www_root = overrides
        .www_root
        .or_else(|| lookup("WWW_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_WWW_ROOT));
    let port = overrides
        .port
        .or_else(|| lookup("SCRAPER_PORT").and_then(|value| value.parse::<u16>().ok()))
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .or_else(|| lookup("SCRAPER_HOST"))
        .filter(|value| !value.trim().is_empty())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    RuntimeConfig {
        transcripts_dir,
        www_root,
        port,
        host,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parses a `KEY=value` env file, tolerating comments, `export` prefixes, and
/// single or double quotes. A missing file is treated as empty.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
