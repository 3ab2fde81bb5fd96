// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Configuration Types
//
// Defines the configuration schema shared by the directory and host server processes:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Bind and advertise addresses, default ports
// - Directory location
// - Call timeouts for machine-to-machine requests

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::address::Address;

pub const API_VERSION: &str = "ferry.dev/v1";
pub const KIND: &str = "FleetConfig";

/// Directory port used when nothing else is configured.
pub const DEFAULT_DIRECTORY_PORT: u16 = 48050;

/// Host server port used when nothing else is configured.
pub const DEFAULT_HOST_PORT: u16 = 1565;

/// Top-level Kubernetes-style fleet configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// API version (must be "ferry.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FleetConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: FleetConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable name of this fleet member
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfigSpec {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface every listener binds to (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Host name other fleet members and browsers use to reach this process.
    /// Agents are registered in the directory under this host.
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,

    #[serde(default = "default_directory_port")]
    pub directory_port: u16,

    #[serde(default = "default_host_port")]
    pub host_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Where host servers find the directory ("host:port")
    #[serde(default = "default_directory_address")]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Upper bound on any machine-to-machine call (connect + write + read)
    #[serde(default = "default_call_timeout", with = "humantime_serde")]
    pub call_timeout: Duration,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_advertise_host() -> String {
    "localhost".to_string()
}

fn default_directory_port() -> u16 {
    DEFAULT_DIRECTORY_PORT
}

fn default_host_port() -> u16 {
    DEFAULT_HOST_PORT
}

fn default_directory_address() -> String {
    format!("localhost:{}", DEFAULT_DIRECTORY_PORT)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            advertise_host: default_advertise_host(),
            directory_port: default_directory_port(),
            host_port: default_host_port(),
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            address: default_directory_address(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "ferry-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
            },
            spec: FleetConfigSpec::default(),
        }
    }
}

impl FleetConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FERRY_CONFIG_PATH environment variable
    /// 2. ./ferry-config.yaml (working directory)
    /// 3. ~/.ferry/config.yaml (user home)
    /// 4. /etc/ferry/config.yaml (system, Unix) or C:\ProgramData\Ferry\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FERRY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./ferry-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".ferry").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/ferry/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Ferry\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FERRY_ADVERTISE_HOST") {
            if !val.is_empty() {
                tracing::info!("Environment override: FERRY_ADVERTISE_HOST={}", val);
                self.spec.network.advertise_host = val;
            }
        }

        if let Ok(val) = std::env::var("FERRY_DIRECTORY") {
            if val.parse::<Address>().is_ok() {
                tracing::info!("Environment override: FERRY_DIRECTORY={}", val);
                self.spec.directory.address = val;
            } else {
                tracing::warn!(
                    "Invalid value for FERRY_DIRECTORY: '{}'. Expected host:port. Ignoring.",
                    val
                );
            }
        }

        if let Ok(val) = std::env::var("FERRY_CALL_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => {
                    tracing::info!("Environment override: FERRY_CALL_TIMEOUT_MS={}", ms);
                    self.spec.timeouts.call_timeout = Duration::from_millis(ms);
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for FERRY_CALL_TIMEOUT_MS: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.network.advertise_host.is_empty() {
            anyhow::bail!("spec.network.advertise_host cannot be empty");
        }

        self.directory_address()?;

        if self.spec.timeouts.call_timeout.is_zero() {
            anyhow::bail!("spec.timeouts.call_timeout must be greater than zero");
        }

        Ok(())
    }

    pub fn directory_address(&self) -> anyhow::Result<Address> {
        self.spec
            .directory
            .address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid spec.directory.address: {}", e))
    }

    pub fn call_timeout(&self) -> Duration {
        self.spec.timeouts.call_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = FleetConfig::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.network.host_port, DEFAULT_HOST_PORT);
        assert_eq!(manifest.call_timeout(), Duration::from_secs(5));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_partial_spec() {
        let yaml = r#"
apiVersion: ferry.dev/v1
kind: FleetConfig
metadata:
  name: edge-1
spec:
  network:
    advertise_host: edge-1.local
  directory:
    address: directory.local:48050
  timeouts:
    call_timeout: 750ms
"#;
        let config = FleetConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "edge-1");
        assert_eq!(config.spec.network.advertise_host, "edge-1.local");
        assert_eq!(config.spec.network.bind_address, "127.0.0.1");
        assert_eq!(config.spec.network.directory_port, DEFAULT_DIRECTORY_PORT);
        assert_eq!(
            config.directory_address().unwrap(),
            Address::new("directory.local", 48050)
        );
        assert_eq!(config.call_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ferry-config.yaml");

        let mut config = FleetConfig::default();
        config.metadata.name = "roundtrip".to_string();
        config.spec.timeouts.call_timeout = Duration::from_secs(2);
        config.to_yaml_file(&path).unwrap();

        let loaded = FleetConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert_eq!(loaded.call_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(FleetConfig::load_or_default(Some(missing)).is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = FleetConfig::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "fleet".to_string();

        manifest.spec.directory.address = "no-port".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.directory.address = "localhost:48050".to_string();

        manifest.spec.timeouts.call_timeout = Duration::ZERO;
        assert!(manifest.validate().is_err());
    }
}
