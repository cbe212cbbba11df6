//! Server configuration: TOML file, then command-line overrides.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::DEFAULT_QUEUE_CAPACITY;
use crate::query::{TagCategory, DEFAULT_RESULTS_PER_LINE};
use crate::traversal::DEFAULT_INITIAL_CAPACITY;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// A value is out of its allowed range.
    #[error("invalid config value for '{field}': {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Settings of the `serve` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Directory holding `catgraph.cat` and `catgraph.tree`.
    pub data_dir: PathBuf,
    /// Listen address.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Maximum number of admitted jobs.
    pub queue_capacity: usize,
    /// Interval of `WAITING`/`WORKING` progress lines.
    pub notify_interval_ms: u64,
    /// Entries per `RESULT` line.
    pub results_per_line: usize,
    /// Initial (and minimum) entry capacity of pooled result lists.
    pub initial_result_capacity: usize,
    /// Run the full structural verification after loading.
    pub verify_on_load: bool,
    /// Callback name used for `t=js` responses.
    pub js_callback: String,
    /// Origins allowed by CORS; `*` allows any.
    pub allow_origins: Vec<String>,
    /// Priority buckets of the tag index, highest priority first.
    pub tag_categories: Vec<TagCategory>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 8080,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            notify_interval_ms: 200,
            results_per_line: DEFAULT_RESULTS_PER_LINE,
            initial_result_capacity: DEFAULT_INITIAL_CAPACITY,
            verify_on_load: true,
            js_callback: "catgraphCallback".to_string(),
            allow_origins: vec!["*".to_string()],
            tag_categories: Vec::new(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    /// `--data-dir`.
    pub data_dir: Option<PathBuf>,
    /// `--host`.
    pub host: Option<IpAddr>,
    /// `--port`.
    pub port: Option<u16>,
    /// `--queue-capacity`.
    pub queue_capacity: Option<usize>,
}

impl ServerConfig {
    /// Loads `explicit`, else the default config file when present, else
    /// defaults. An explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => read_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, overrides: ServerOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(capacity) = overrides.queue_capacity {
            self.queue_capacity = capacity;
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("queue_capacity", self.queue_capacity as u64),
            ("notify_interval_ms", self.notify_interval_ms),
            ("results_per_line", self.results_per_line as u64),
            ("initial_result_capacity", self.initial_result_capacity as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        if let Some(bad) = self.tag_categories.iter().find(|c| c.tag == 0) {
            return Err(ConfigError::Invalid {
                field: "tag_categories",
                reason: format!("category {} has tag 0; tags start at 1", bad.category),
            });
        }
        if self.js_callback.is_empty()
            || !self
                .js_callback
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
        {
            return Err(ConfigError::Invalid {
                field: "js_callback",
                reason: format!("'{}' is not a JavaScript identifier", self.js_callback),
            });
        }
        Ok(())
    }

    /// Socket address to bind.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Progress broadcast interval.
    pub fn notify_interval(&self) -> Duration {
        Duration::from_millis(self.notify_interval_ms)
    }
}

/// `$CONFIG_DIR/catgraph/server.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("catgraph").join("server.toml"))
}

fn read_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ServerConfig::from_toml(&contents, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
port = 9000
tag_categories = [
  { category = 3943817, depth = 0, tag = 1 },
  { category = 5799448, depth = 1, tag = 1 },
]
"#,
            Path::new("inline.toml"),
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.tag_categories.len(), 2);
        assert_eq!(config.tag_categories[1].depth, 1);
        config.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ServerConfig::from_toml("prot = 1", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_win_and_validation_catches_zero() {
        let mut config = ServerConfig::default();
        config.apply(ServerOverrides {
            port: Some(1234),
            queue_capacity: Some(0),
            ..ServerOverrides::default()
        });
        assert_eq!(config.bind_addr().port(), 1234);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "queue_capacity", .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = ServerConfig::load(Some(Path::new("/nonexistent/catgraph.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
