//! Reads and writes `~/.rally/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rally_runtime::config::MissionConfig;

/// Return the path to `~/.rally/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rally").join("config.toml")
}

/// Load from `path`.  `Ok(None)` when the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<MissionConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: MissionConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `RALLY_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `RALLY_COURSE` | `launch.course` |
/// | `RALLY_INITIAL_LINE` | `launch.initial_line` |
/// | `RALLY_SKIP_PUSH` | `launch.skip_push` |
/// | `RALLY_TICK_HZ` | `tick_hz` |
///
/// Values that do not parse are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut MissionConfig) {
    if let Ok(v) = std::env::var("RALLY_COURSE") {
        match v.parse() {
            Ok(course) => cfg.launch.course = course,
            Err(e) => tracing::warn!(error = %e, "ignoring RALLY_COURSE"),
        }
    }
    if let Ok(v) = std::env::var("RALLY_INITIAL_LINE")
        && let Ok(line) = v.parse::<usize>()
    {
        cfg.launch.initial_line = line;
    }
    if let Ok(v) = std::env::var("RALLY_SKIP_PUSH") {
        cfg.launch.skip_push = matches!(v.trim(), "1" | "true" | "yes");
    }
    if let Ok(v) = std::env::var("RALLY_TICK_HZ")
        && let Ok(hz) = v.parse::<f32>()
    {
        cfg.tick_hz = hz;
    }
}

/// Write `cfg` to `path`, creating the parent directory.
pub fn save_to(cfg: &MissionConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
