use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

use crate::common::Result;
use crate::storage::commitlog;

/// Environment variables with this prefix override file settings,
/// e.g. `HOMELOG_PORT=20201` or `HOMELOG_LOG__SEGMENT__MAX_STORE_BYTES=4096`.
pub const ENV_PREFIX: &str = "HOMELOG";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub log_level: String,
    // How long a tailing consumer waits before polling for new records
    pub consume_poll_interval_ms: u64,
    pub log: commitlog::Config,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 20101,
            data_dir: PathBuf::from("/var/run/homelog/commitlog/"),
            log_level: "info".to_string(),
            consume_poll_interval_ms: 50,
            log: commitlog::Config::default(),
        }
    }
}

impl ServerConfig {
    /// Loads settings from an optional file, then the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    pub(crate) fn load_with_prefix(path: Option<&str>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn consume_poll_interval(&self) -> Duration {
        Duration::from_millis(self.consume_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::ServerConfig;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let c = ServerConfig::load(None).unwrap();
        assert_eq!(c.port, ServerConfig::default().port);
        assert_eq!(c.log.segment.max_store_bytes, 1024);
        assert_eq!(c.listen_addr().unwrap().to_string(), "127.0.0.1:20101");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homelog.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "port = 30000\ndata_dir = \"/tmp/homelog\"\n\n[log.segment]\nmax_store_bytes = 4096\ninitial_offset = 7"
        )
        .unwrap();

        let c = ServerConfig::load(path.to_str()).unwrap();
        assert_eq!(c.port, 30000);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.data_dir.to_str(), Some("/tmp/homelog"));
        assert_eq!(c.log.segment.max_store_bytes, 4096);
        assert_eq!(c.log.segment.max_index_bytes, 1024);
        assert_eq!(c.log.segment.initial_offset, 7);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("homelog.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "port = 30000\nlog_level = \"warn\"\n\n[log.segment]\nmax_store_bytes = 2048\nmax_index_bytes = 512"
        )
        .unwrap();

        // A prefix of its own keeps other tests from seeing these variables
        let prefix = "HOMELOG_ENVTEST";
        let vars = [
            ("HOMELOG_ENVTEST_PORT", "30001"),
            ("HOMELOG_ENVTEST_LOG_LEVEL", "debug"),
            ("HOMELOG_ENVTEST_LOG__SEGMENT__MAX_STORE_BYTES", "4096"),
        ];
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let c = ServerConfig::load_with_prefix(path.to_str(), prefix);
        for (key, _) in vars {
            std::env::remove_var(key);
        }

        let c = c.unwrap();
        assert_eq!(c.port, 30001);
        assert_eq!(c.log_level, "debug");
        assert_eq!(c.log.segment.max_store_bytes, 4096);
        // Untouched by the environment
        assert_eq!(c.log.segment.max_index_bytes, 512);
        assert_eq!(c.host, "127.0.0.1");
    }

    #[test]
    fn test_bad_host_is_config_error() {
        let c = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            c.listen_addr(),
            Err(crate::common::Error::Config(_))
        ));
    }
}
