// Configuration loading for Trellis servers

pub mod env;
pub mod error;
pub mod loader;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Environment prefix for server settings (`TRELLIS_PORT`, ...).
pub const ENV_PREFIX: &str = "TRELLIS";

/// Listener and file-location settings for a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
    /// Where uploaded files are saved.
    pub upload_dir: PathBuf,
    /// Where downloadable files are read from.
    pub download_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            body_limit: 4 * 1024 * 1024,
            upload_dir: PathBuf::from("./target"),
            download_dir: PathBuf::from("./source"),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with the file at `path` (if any), then `.env`
    /// and `TRELLIS_*` variables, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        EnvLoader::load_dotenv();
        config.apply_env(&EnvLoader::with_prefix(ENV_PREFIX).load())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with a single file. Keys the file omits keep
    /// their default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loader = ConfigLoader::auto(path)?;
        let value = loader.load_file(path)?;

        match loader.format() {
            // env files carry every value as a string
            FileFormat::Env => {
                let mut config = Self::default();
                let vars = value
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect::<HashMap<_, _>>()
                    })
                    .unwrap_or_default();
                config.apply_env(&vars)?;
                Ok(config)
            }
            _ => serde_json::from_value(value)
                .map_err(|e| ConfigError::DeserializationError(e.to_string())),
        }
    }

    /// Overlay string settings keyed by lowercased field name. Unknown keys
    /// are ignored.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        if let Some(host) = vars.get("host") {
            self.host = host.clone();
        }
        if let Some(port) = vars.get("port") {
            self.port = parse_value("port", port)?;
        }
        if let Some(limit) = vars.get("body_limit") {
            self.body_limit = parse_value("body_limit", limit)?;
        }
        if let Some(dir) = vars.get("upload_dir") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = vars.get("download_dir") {
            self.download_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port must be non-zero".into()));
        }
        if self.body_limit == 0 {
            return Err(ConfigError::ValidationError(
                "body_limit must be non-zero".into(),
            ));
        }
        self.host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "host".into(),
                value: self.host.clone(),
            })?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "host".into(),
                value: self.host.clone(),
            })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.body_limit, 4 * 1024 * 1024);
        assert_eq!(config.upload_dir, PathBuf::from("./target"));
        assert_eq!(config.download_dir, PathBuf::from("./source"));
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file_keeps_missing_defaults() {
        let (_dir, path) = write_config("server.toml", "host = \"127.0.0.1\"\nport = 8080\n");
        let config = ServerConfig::from_file(&path).unwrap();

        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.body_limit, 4 * 1024 * 1024);
    }

    #[test]
    fn test_json_file() {
        let (_dir, path) = write_config("server.json", r#"{"upload_dir": "/tmp/up"}"#);
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/up"));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_env_file() {
        let (_dir, path) = write_config("server.env", "PORT=9000\nBODY_LIMIT=1024\n");
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.body_limit, 1024);
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = ServerConfig::default();
        let vars = HashMap::from([
            ("port".to_string(), "4000".to_string()),
            ("download_dir".to_string(), "/srv/files".to_string()),
            ("log_level".to_string(), "debug".to_string()),
        ]);
        config.apply_env(&vars).unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.download_dir, PathBuf::from("/srv/files"));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ServerConfig::default();
        let vars = HashMap::from([("port".to_string(), "http".to_string())]);
        assert!(matches!(
            config.apply_env(&vars),
            Err(ConfigError::InvalidValue { .. })
        ));

        config.port = 0;
        assert!(config.validate().is_err());

        let config = ServerConfig {
            body_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            host: "not-an-ip".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/nonexistent/trellis.toml"),
            Err(ConfigError::LoadError(_))
        ));
    }
}
