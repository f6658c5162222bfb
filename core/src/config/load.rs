use std::path::{Path, PathBuf};

use super::types::{AppConfig, RetrievalProvider};

/// Get the default taskweave data directory: ~/.taskweave
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir()
        .or_else(|| std::env::var("HOME").ok().map(PathBuf::from))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".taskweave"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.taskweave/config.toml
    let data_dir = get_data_dir()?;
    let home_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml
    let local_config = Path::new("config.toml");

    let mut cfg = if home_config.exists() {
        load_from_path(&home_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    if is_unset(&cfg.logging.directory) {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    if is_unset(&cfg.store.directory) {
        cfg.store.directory = Some(data_dir.join("jobs").to_string_lossy().to_string());
    }

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_ref().map(|s| s.trim().is_empty()).unwrap_or(true)
}

/// Environment overrides (highest priority). Empty values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("TASKWEAVE_REASONING_URL") {
        cfg.reasoning.base_url = v;
    }
    if let Some(v) = get("TASKWEAVE_REASONING_API_KEY") {
        cfg.reasoning.api_key = v;
    }
    if let Some(v) = get("TASKWEAVE_REASONING_MODEL") {
        cfg.reasoning.model = v;
    }
    if let Some(v) = get("TASKWEAVE_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
        cfg.engine.max_concurrency = v;
    }
    if let Some(v) = get("TASKWEAVE_STORE_DIR") {
        cfg.store.directory = Some(v);
    }
    if let Some(v) = get("TASKWEAVE_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    if let RetrievalProvider::Http(ref mut http) = cfg.retrieval.provider {
        if let Some(v) = get("TASKWEAVE_RETRIEVAL_URL") {
            http.base_url = v;
        }
        if let Some(v) = get("TASKWEAVE_RETRIEVAL_API_KEY") {
            http.api_key = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let env: HashMap<&str, &str> = [
            ("TASKWEAVE_REASONING_MODEL", "local-model"),
            ("TASKWEAVE_REASONING_API_KEY", "   "),
            ("TASKWEAVE_MAX_CONCURRENCY", "6"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.reasoning.model, "local-model");
        assert!(cfg.reasoning.api_key.is_empty());
        assert_eq!(cfg.engine.max_concurrency, 6);
    }

    #[test]
    fn test_load_from_path_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nrepair_attempts = \"two\"\n").unwrap();

        let err = load_from_path(&path).unwrap_err().to_string();
        assert!(err.contains("config.toml"));
    }
}
