use crate::core::cache::CacheConfig;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";

fn default_redirect_url() -> String {
    "tasaverde://auth/callback".to_string()
}

fn default_oauth_provider() -> String {
    "google".to_string()
}

fn default_market() -> String {
    "ves".to_string()
}

fn default_stale_secs() -> u64 {
    30
}

fn default_gc_secs() -> u64 {
    600
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    pub base_url: String,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_oauth_provider")]
    pub oauth_provider: String,
}

impl IdentityConfig {
    /// The configured anon key, or the one from the environment.
    pub fn resolve_anon_key(&self) -> Result<String> {
        match &self.anon_key {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => std::env::var(ANON_KEY_ENV).with_context(|| {
                format!("identity.anon_key is not set and {ANON_KEY_ENV} is missing")
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RatesConfig {
    pub base_url: String,
    #[serde(default = "default_market")]
    pub market: String,
    #[serde(default = "default_stale_secs")]
    pub stale_secs: u64,
    #[serde(default = "default_gc_secs")]
    pub gc_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl RatesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stale_secs == 0 {
            bail!("rates.stale_secs must be at least 1");
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            stale_time: Duration::from_secs(self.stale_secs),
            gc_time: Duration::from_secs(self.gc_secs),
            retries: self.retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub rates: RatesConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("app", "tasaverde", "tasaverde")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("app", "tasaverde", "tasaverde")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.rates.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization_with_defaults() {
        let yaml_str = r#"
identity:
  base_url: "https://project.supabase.co"
  anon_key: "anon"
rates:
  base_url: "https://rates.example.com"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.identity.base_url, "https://project.supabase.co");
        assert_eq!(config.identity.redirect_url, "tasaverde://auth/callback");
        assert_eq!(config.identity.oauth_provider, "google");
        assert_eq!(config.identity.resolve_anon_key().unwrap(), "anon");
        assert_eq!(config.rates.market, "ves");
        assert!(config.data_path.is_none());

        let cache = config.rates.cache_config();
        assert_eq!(cache.stale_time, Duration::from_secs(30));
        assert_eq!(cache.gc_time, Duration::from_secs(600));
        assert_eq!(cache.retries, 2);
        assert_eq!(cache.retry_delay_ms, 1000);
    }

    #[test]
    fn test_config_overrides() {
        let yaml_str = r#"
identity:
  base_url: "http://localhost:54321"
  anon_key: "anon"
  redirect_url: "myapp://callback"
  oauth_provider: "github"
rates:
  base_url: "http://localhost:8080"
  market: "cop"
  stale_secs: 5
  gc_secs: 60
  retries: 0
  retry_delay_ms: 10
data_path: "/tmp/tasaverde"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert_eq!(config.identity.redirect_url, "myapp://callback");
        assert_eq!(config.identity.oauth_provider, "github");
        assert_eq!(config.rates.market, "cop");
        assert_eq!(config.rates.cache_config().retries, 0);
        assert_eq!(
            config.default_data_path().unwrap(),
            PathBuf::from("/tmp/tasaverde")
        );
    }

    #[test]
    fn test_zero_stale_time_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            r#"
identity:
  base_url: "https://project.supabase.co"
rates:
  base_url: "https://rates.example.com"
  stale_secs: 0
"#,
        )
        .unwrap();

        let err = AppConfig::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("stale_secs"));
    }

    #[test]
    fn test_missing_rates_section_fails() {
        let yaml_str = r#"
identity:
  base_url: "https://project.supabase.co"
"#;
        assert!(serde_yaml::from_str::<AppConfig>(yaml_str).is_err());
    }
}
