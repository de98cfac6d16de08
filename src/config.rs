use crate::types::*;
use std::{
  env,
  fs,
  path::{Path, PathBuf},
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  repo_root().join("config.json")
}

pub fn logs_dir() -> PathBuf {
  repo_root().join("logs")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

/// Env values fill fields that are blank or still at their built-in default.
pub fn apply_env_defaults(mut config: AppConfig) -> AppConfig {
  let defaults = AppConfig::default();
  if config.bind_addr.trim().is_empty() || config.bind_addr.trim() == defaults.bind_addr {
    if let Some(value) = env_default("CATEGORIES_BIND_ADDR") {
      config.bind_addr = value;
    }
  }
  if config.static_dir.trim().is_empty() || config.static_dir.trim() == defaults.static_dir {
    if let Some(value) = env_default("CATEGORIES_STATIC_DIR") {
      config.static_dir = value;
    }
  }
  if config.identity_column.trim().is_empty() {
    if let Some(value) = env_default("CATEGORIES_IDENTITY_COLUMN") {
      config.identity_column = value;
    }
  }
  config
}

/// Trim every field and put defaults back where a field was left blank.
pub fn normalize_config(mut config: AppConfig) -> AppConfig {
  let defaults = AppConfig::default();
  config.bind_addr = config.bind_addr.trim().to_string();
  if config.bind_addr.is_empty() {
    config.bind_addr = defaults.bind_addr;
  }
  config.static_dir = config.static_dir.trim().to_string();
  if config.static_dir.is_empty() {
    config.static_dir = defaults.static_dir;
  }
  config.identity_column = config.identity_column.trim().to_string();
  config
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
  if !path.is_file() {
    return Ok(normalize_config(apply_env_defaults(AppConfig::default())));
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(normalize_config(apply_env_defaults(config)))
}

pub fn save_config_to(path: &Path, config: AppConfig) -> Result<AppConfig, String> {
  let config = normalize_config(config);
  let payload = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
  fs::write(path, payload).map_err(|e| format!("write config {}: {e}", path.display()))?;
  Ok(config)
}

pub fn load_config_inner() -> Result<AppConfig, String> {
  load_config_from(&config_path())
}

pub fn save_config_inner(config: AppConfig) -> Result<AppConfig, String> {
  save_config_to(&config_path(), config)
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn log_config_warnings(config: &AppConfig) {
  let static_dir = resolve_repo_path(&config.static_dir);
  if !static_dir.is_dir() {
    tracing::warn!(
      "static dir {} does not exist; the browser UI will not be served",
      static_dir.display()
    );
  }
  if config.bind_addr.parse::<std::net::SocketAddr>().is_err() {
    tracing::warn!("bind address {} is not a socket address; the server will fail to bind", config.bind_addr);
  }
  if config.identity_column().is_some() {
    tracing::info!("players are identified by column {}", config.identity_column);
  }
}
