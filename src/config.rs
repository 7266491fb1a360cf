use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::net::RetryPolicy;

const PRODUCTION_API_URL: &str = "https://festadellosport.onrender.com/";
const LOCAL_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub proxy: ProxyConfig,
  pub tables: TablesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Host the site is served from; local hosts talk to `local_url`
  pub site_host: Option<String>,
  pub production_url: String,
  pub local_url: String,
  pub retry_attempts: u32,
  pub retry_base_delay_ms: u64,
  /// Per-request timeout; none by default
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      site_host: None,
      production_url: PRODUCTION_API_URL.to_string(),
      local_url: LOCAL_API_URL.to_string(),
      retry_attempts: 3,
      retry_base_delay_ms: 1000,
      timeout_secs: None,
    }
  }
}

impl ApiConfig {
  /// Base URL of the backend.
  ///
  /// `FESTA_API_URL` wins over the configured hosts.
  pub fn base_url(&self) -> Result<Url> {
    if let Ok(url) = std::env::var("FESTA_API_URL") {
      return Url::parse(&url).map_err(|e| eyre!("Invalid FESTA_API_URL '{}': {}", url, e));
    }
    self.resolve_base_url()
  }

  /// Local hosts (localhost, 127.0.0.1, empty) use the local backend, anything
  /// else the production one.
  pub fn resolve_base_url(&self) -> Result<Url> {
    let raw = match self.site_host.as_deref() {
      Some(host) if is_local_host(host) => &self.local_url,
      _ => &self.production_url,
    };
    Url::parse(raw).map_err(|e| eyre!("Invalid backend URL '{}': {}", raw, e))
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy::new()
      .with_max_attempts(self.retry_attempts)
      .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout_secs.map(Duration::from_secs)
  }
}

pub fn is_local_host(host: &str) -> bool {
  matches!(host, "localhost" | "127.0.0.1" | "")
}

/// Settings of the offline proxy: cache names and pre-cache manifests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
  /// Origin the site is served from; relative manifest entries resolve against it
  pub origin: Url,
  /// Prefix shared by every namespace this proxy owns
  pub cache_prefix: String,
  /// Bump to invalidate every cached byte on the next activation
  pub version: String,
  pub api_prefix: String,
  pub critical_assets: Vec<String>,
  pub image_assets: Vec<String>,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      origin: Url::parse(PRODUCTION_API_URL).expect("static URL is valid"),
      cache_prefix: "festa-sport-".to_string(),
      version: "v2".to_string(),
      api_prefix: "/api/".to_string(),
      critical_assets: [
        "/",
        "/index.html",
        "/css/style.css",
        "/js/config.js",
        "/js/script.js",
        "/favicon/favicon.ico",
      ]
      .map(String::from)
      .to_vec(),
      image_assets: [
        "/assets/images/fcapralbese-Photoroom.png",
        "/assets/images/foratorio-Photoroom.png",
      ]
      .map(String::from)
      .to_vec(),
    }
  }
}

/// Tables shown by the reservation widget.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
  pub ids: Vec<String>,
}

impl Default for TablesConfig {
  fn default() -> Self {
    Self {
      ids: (1..=16).map(|n| n.to_string()).collect(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./festa.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/festa/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("festa.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("festa").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Directory for the cache database and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("festa"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_local_hosts_use_local_backend() {
    for host in ["localhost", "127.0.0.1", ""] {
      let api = ApiConfig {
        site_host: Some(host.to_string()),
        ..ApiConfig::default()
      };
      assert_eq!(api.resolve_base_url().unwrap().as_str(), "http://localhost:3001/");
    }
  }

  #[test]
  fn test_other_hosts_use_production_backend() {
    let api = ApiConfig {
      site_host: Some("festadellosport.it".to_string()),
      ..ApiConfig::default()
    };
    assert_eq!(
      api.resolve_base_url().unwrap().as_str(),
      "https://festadellosport.onrender.com/"
    );
    assert_eq!(
      ApiConfig::default().resolve_base_url().unwrap().as_str(),
      "https://festadellosport.onrender.com/"
    );
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "proxy:\n  version: v3\n  image_assets: []\napi:\n  retry_attempts: 5\ntables:\n  ids: [\"5\", \"12\"]"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.proxy.version, "v3");
    assert_eq!(config.proxy.cache_prefix, "festa-sport-");
    assert!(config.proxy.image_assets.is_empty());
    assert_eq!(config.proxy.critical_assets.len(), 6);
    assert_eq!(config.api.retry_policy().max_attempts, 5);
    assert_eq!(config.api.retry_policy().base_delay, Duration::from_millis(1000));
    assert_eq!(config.tables.ids, vec!["5", "12"]);
  }

  #[test]
  fn test_missing_explicit_file_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }
}
