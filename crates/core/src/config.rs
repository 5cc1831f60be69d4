use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::{
    error::{Result, SlidecastError},
    keys::{MAX_API_KEYS, normalize_keys},
};

/// Persisted user configuration (`config.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub google_api_keys: Vec<String>,

    /// Legacy single-key field, folded into `google_api_keys` on load.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub google_api_key: String,
}

impl GlobalConfig {
    fn migrate(mut self) -> Self {
        if self.google_api_keys.is_empty() && !self.google_api_key.trim().is_empty() {
            self.google_api_keys = vec![self.google_api_key.trim().to_string()];
        }
        self.google_api_keys = normalize_keys(&self.google_api_keys);
        self
    }

    /// Replace every stored key with `key`.
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let key = non_empty_key(key)?;
        self.google_api_keys = vec![key];
        self.google_api_key.clear();
        Ok(())
    }

    /// Append `key` for rotation. Duplicates are ignored.
    pub fn add_api_key(&mut self, key: &str) -> Result<()> {
        let key = non_empty_key(key)?;
        let mut keys = self.google_api_keys.clone();
        keys.push(key);
        let keys = normalize_keys(&keys);
        if keys.len() > MAX_API_KEYS {
            return Err(SlidecastError::TooManyApiKeys {
                count: keys.len(),
                max: MAX_API_KEYS,
            });
        }
        self.google_api_keys = keys;
        self.google_api_key.clear();
        Ok(())
    }

    pub fn masked_keys(&self) -> Vec<String> {
        self.google_api_keys.iter().map(|k| mask_key(k)).collect()
    }
}

fn non_empty_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() {
        return Err(SlidecastError::Config {
            path: config_path(),
            reason: "api key is empty".to_string(),
        });
    }
    Ok(key.to_string())
}

/// Show the first and last four characters of long keys only.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slidecast")
        .join("config.json")
}

/// Load the config from the default location.
pub async fn load_config() -> Result<GlobalConfig> {
    load_config_from(&config_path()).await
}

/// A missing file is an empty config.
pub async fn load_config_from(path: &Path) -> Result<GlobalConfig> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GlobalConfig::default()),
        Err(e) => return Err(e.into()),
    };

    let config: GlobalConfig =
        serde_json::from_str(&content).map_err(|e| SlidecastError::Config {
            path: path.to_path_buf(),
            reason: format!("invalid config file: {e}"),
        })?;

    Ok(config.migrate())
}

pub async fn save_config(config: &GlobalConfig) -> Result<PathBuf> {
    let path = config_path();
    save_config_to(config, &path).await?;
    Ok(path)
}

pub async fn save_config_to(config: &GlobalConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut json = serde_json::to_string_pretty(config)?;
    json.push('\n');
    fs::write(path, json).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_is_empty_config() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(&dir.path().join("config.json"))
            .await
            .unwrap();
        assert_eq!(config, GlobalConfig::default());
    }

    #[tokio::test]
    async fn legacy_key_is_migrated_and_keys_normalized() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"google_api_key": "  legacy  "}"#)
            .await
            .unwrap();
        let config = load_config_from(&path).await.unwrap();
        assert_eq!(config.google_api_keys, vec!["legacy"]);

        fs::write(&path, r#"{"google_api_keys": ["a", " ", "b", "a"]}"#)
            .await
            .unwrap();
        let config = load_config_from(&path).await.unwrap();
        assert_eq!(config.google_api_keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn invalid_json_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").await.unwrap();

        let err = load_config_from(&path).await.unwrap_err();
        assert!(matches!(err, SlidecastError::Config { path: ref p, .. } if p == &path));
    }

    #[tokio::test]
    async fn save_then_load_keeps_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = GlobalConfig::default();
        config.add_api_key("first-key").unwrap();
        config.add_api_key("second-key").unwrap();

        save_config_to(&config, &path).await.unwrap();
        let raw = fs::read_to_string(&path).await.unwrap();
        assert!(raw.ends_with('\n'));
        assert!(!raw.contains("google_api_key\""));

        let loaded = load_config_from(&path).await.unwrap();
        assert_eq!(loaded.google_api_keys, vec!["first-key", "second-key"]);
    }

    #[test]
    fn set_replaces_and_add_appends_without_duplicates() {
        let mut config = GlobalConfig {
            google_api_keys: vec!["old".to_string()],
            google_api_key: "legacy".to_string(),
        };
        config.set_api_key(" new ").unwrap();
        assert_eq!(config.google_api_keys, vec!["new"]);
        assert!(config.google_api_key.is_empty());

        config.add_api_key("new").unwrap();
        config.add_api_key("other").unwrap();
        assert_eq!(config.google_api_keys, vec!["new", "other"]);
        assert!(config.add_api_key("   ").is_err());
    }

    #[test]
    fn add_rejects_more_than_max_keys() {
        let mut config = GlobalConfig::default();
        for i in 0..MAX_API_KEYS {
            config.add_api_key(&format!("key-{i}")).unwrap();
        }
        let err = config.add_api_key("one-too-many").unwrap_err();
        assert!(matches!(
            err,
            SlidecastError::TooManyApiKeys { count: 11, max: 10 }
        ));
        assert_eq!(config.google_api_keys.len(), MAX_API_KEYS);
    }

    #[test]
    fn masks_long_and_short_keys() {
        assert_eq!(mask_key("AIzaSyExampleKey1234"), "AIza...1234");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key("12345678"), "****");
    }
}
