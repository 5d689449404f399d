use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use glossa_core::normalize::NormalizeOptions;

/// Optional JSON configuration file (`--config`). Everything has a
/// sensible default; environment variables win over the file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CliConfig {
    /// Pool location; `GLOSSA_POOL` / `POOL_ROOT` override it.
    #[serde(default)]
    pub pool_root: Option<String>,

    /// Marker module path for pool imports.
    #[serde(default)]
    pub pool_module: Option<String>,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub json: bool,
}

pub fn load_config(path: Option<&str>) -> Result<CliConfig> {
    match path {
        None => Ok(CliConfig::default()),
        Some(p) => {
            let raw = fs::read_to_string(Path::new(p))?;
            let cfg: CliConfig =
                serde_json::from_str(&raw).map_err(|e| anyhow!("invalid config json: {e}"))?;
            Ok(cfg)
        }
    }
}

/// Pool root resolution order: `--pool` flag, `GLOSSA_POOL`, `POOL_ROOT`,
/// the config file, then a user-local default.
pub fn resolve_pool_root(flag: Option<&str>, cfg: &CliConfig) -> PathBuf {
    if let Some(p) = flag {
        return PathBuf::from(p);
    }
    for var in ["GLOSSA_POOL", "POOL_ROOT"] {
        if let Ok(p) = std::env::var(var) {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
    }
    if let Some(p) = &cfg.pool_root {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".glossa").join("pool")
}

/// Author recorded in object metadata: `GLOSSA_AUTHOR`, then `USER`.
pub fn resolve_author() -> String {
    for var in ["GLOSSA_AUTHOR", "USER"] {
        if let Ok(v) = std::env::var(var) {
            if !v.trim().is_empty() {
                return v;
            }
        }
    }
    "unknown".to_string()
}

pub fn normalize_options(cfg: &CliConfig) -> NormalizeOptions {
    match &cfg.pool_module {
        Some(module) if !module.trim().is_empty() => {
            NormalizeOptions { pool_module: module.clone() }
        }
        _ => NormalizeOptions::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_everything() {
        let cfg = CliConfig { pool_root: Some("/from/config".into()), ..Default::default() };
        assert_eq!(resolve_pool_root(Some("/from/flag"), &cfg), PathBuf::from("/from/flag"));
    }

    #[test]
    fn config_defaults_parse_from_empty_object() {
        let cfg: CliConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.pool_root.is_none());
        assert!(!cfg.telemetry.json);
        assert_eq!(normalize_options(&cfg).pool_module, "pool.import");
    }

    #[test]
    fn pool_module_override() {
        let cfg: CliConfig = serde_json::from_str(r#"{"pool_module": "depot.import"}"#).unwrap();
        assert_eq!(normalize_options(&cfg).pool_module, "depot.import");
    }
}
