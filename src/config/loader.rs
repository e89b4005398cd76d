use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{app::LogLevel, display::DisplayMode, Error, Result};

use super::{Config, CONFIG_DIR_NAME, CONFIG_FILE_NAME};

pub fn load_or_default() -> Result<Config> {
    load_or_create(&config_path()?)
}

/// Load `path`, writing a default config there first when it is missing.
pub fn load_or_create(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        cfg.save_to_path(path)?;
        super::validate(&cfg)?;
        return Ok(cfg);
    }
    load_from_path(path)
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    if !path.exists() {
        let cfg = Config::default();
        super::validate(&cfg)?;
        return Ok(cfg);
    }

    let raw = fs::read_to_string(path)?;
    parse(&raw)
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = format!(
        "# glucoframe config\n\
api_endpoint = \"{}\"\n\
api_token = \"{}\"\n\
locale = \"{}\"\n\
min = {}\n\
max = {}\n\
emergency_min = {}\n\
emergency_max = {}\n\
timezone = \"{}\"\n\
beeper = {}\n\
beeper_start_time = \"{}\"\n\
beeper_end_time = \"{}\"\n\
stale_after_minutes = {}\n\
stale_emergency_after_minutes = {}\n\
brightness = {}\n\
configured = {}\n\
display_mode = \"{}\"\n\
history_cap = {}\n\
backend_timeout_ms = {}\n\
retry_delay_ms = {}\n\
has_env_sensor = {}\n\
has_rgb_indicator = {}\n\
supports_rotation = {}\n\
log_level = \"{}\"\n",
        config.api_endpoint,
        config.api_token,
        config.locale,
        config.min,
        config.max,
        config.emergency_min,
        config.emergency_max,
        config.timezone,
        config.beeper,
        config.beeper_start_time,
        config.beeper_end_time,
        config.stale_after_minutes,
        config.stale_emergency_after_minutes,
        config.brightness,
        config.configured,
        config.display_mode.name(),
        config.history_cap,
        config.backend_timeout_ms,
        config.retry_delay_ms,
        config.has_env_sensor,
        config.has_rgb_indicator,
        config.supports_rotation,
        config.log_level.as_str(),
    );
    let contents = match &config.data_dir {
        Some(dir) => format!("{contents}data_dir = \"{dir}\"\n"),
        None => contents,
    };
    fs::write(path, contents)?;
    Ok(())
}

pub fn parse(raw: &str) -> Result<Config> {
    let mut cfg = Config::default();

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (key, value) = trimmed.split_once('=').ok_or_else(|| {
            Error::InvalidArgs(format!("invalid config line {}: '{}'", idx + 1, line))
        })?;

        let key = key.trim();
        let value = value.trim().trim_matches('"');
        let line_no = idx + 1;
        match key {
            "api_endpoint" => cfg.api_endpoint = value.trim_end_matches('/').to_string(),
            "api_token" => cfg.api_token = value.to_string(),
            "locale" => cfg.locale = value.to_string(),
            "min" => cfg.min = number(key, value, line_no)?,
            "max" => cfg.max = number(key, value, line_no)?,
            "emergency_min" => cfg.emergency_min = number(key, value, line_no)?,
            "emergency_max" => cfg.emergency_max = number(key, value, line_no)?,
            "timezone" => cfg.timezone = value.to_string(),
            "beeper" => cfg.beeper = number(key, value, line_no)?,
            "beeper_start_time" => cfg.beeper_start_time = value.to_string(),
            "beeper_end_time" => cfg.beeper_end_time = value.to_string(),
            "stale_after_minutes" => cfg.stale_after_minutes = number(key, value, line_no)?,
            "stale_emergency_after_minutes" => {
                cfg.stale_emergency_after_minutes = number(key, value, line_no)?
            }
            "brightness" => cfg.brightness = number(key, value, line_no)?,
            "configured" => cfg.configured = flag(key, value, line_no)?,
            "display_mode" => {
                cfg.display_mode = value.parse::<DisplayMode>().map_err(|e| {
                    Error::InvalidArgs(format!("invalid display_mode on line {line_no}: {e}"))
                })?;
            }
            "data_dir" => {
                cfg.data_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "history_cap" => cfg.history_cap = number(key, value, line_no)?,
            "backend_timeout_ms" => cfg.backend_timeout_ms = number(key, value, line_no)?,
            "retry_delay_ms" => cfg.retry_delay_ms = number(key, value, line_no)?,
            "has_env_sensor" => cfg.has_env_sensor = flag(key, value, line_no)?,
            "has_rgb_indicator" => cfg.has_rgb_indicator = flag(key, value, line_no)?,
            "supports_rotation" => cfg.supports_rotation = flag(key, value, line_no)?,
            "log_level" => {
                cfg.log_level = value.parse::<LogLevel>().map_err(|_| {
                    Error::InvalidArgs(format!("invalid log_level on line {line_no}: '{value}'"))
                })?;
            }
            other => {
                return Err(Error::InvalidArgs(format!(
                    "unknown config key '{other}' on line {line_no}"
                )));
            }
        }
    }

    super::validate(&cfg)?;
    Ok(cfg)
}

pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| Error::InvalidArgs("HOME not set; cannot locate config directory".into()))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn number<T: std::str::FromStr>(key: &str, value: &str, line_no: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidArgs(format!("invalid {key} value on line {line_no}")))
}

fn flag(key: &str, value: &str, line_no: usize) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::InvalidArgs(format!(
            "invalid {key} on line {line_no}: expected true or false"
        ))),
    }
}
