//! Server configuration: TOML file + CLI overrides.

use relay_core::{RelayError, RelayResult};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::info;

/// Which dispatch table the relay runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    /// Presence, rooms, chat, file transfer and friend workflows.
    #[default]
    App,
    /// Bare peer signaling: `register` and `relay`.
    Signaling,
}

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
}

impl ConfigFile {
    pub fn parse(content: &str) -> RelayResult<Self> {
        toml::from_str(content).map_err(|e| RelayError::Config(format!("config parse error: {e}")))
    }
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub mode: RouterMode,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            mode: RouterMode::default(),
            outbound_queue: default_outbound_queue(),
            max_frame_bytes: default_max_frame_bytes(),
            stats_interval: default_stats_interval(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_outbound_queue() -> usize {
    256
}
fn default_max_frame_bytes() -> usize {
    1_048_576
}
fn default_stats_interval() -> u64 {
    60
}

/// Values given on the command line; `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub mode: Option<RouterMode>,
    pub outbound_queue: Option<usize>,
    pub stats_interval: Option<u64>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub mode: RouterMode,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    pub max_frame_bytes: usize,
    /// Seconds between stats log lines; 0 disables them.
    pub stats_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::resolve(ConfigFile::default(), CliOverrides::default())
            .unwrap_or_else(|_| Self {
                bind_addr: SocketAddr::from(([0, 0, 0, 0], default_port())),
                mode: RouterMode::default(),
                outbound_queue: default_outbound_queue(),
                max_frame_bytes: default_max_frame_bytes(),
                stats_interval: default_stats_interval(),
            })
    }
}

impl ServerConfig {
    /// Load config from a TOML file, then apply CLI overrides.
    ///
    /// A missing file means defaults.
    pub fn load(config_path: Option<&Path>, overrides: CliOverrides) -> RelayResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    ConfigFile::parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, overrides)
    }

    /// Merge a parsed file with CLI overrides.
    pub fn resolve(file_config: ConfigFile, overrides: CliOverrides) -> RelayResult<Self> {
        let server = file_config.server;
        let bind = overrides.bind.unwrap_or(server.bind);
        let port = overrides.port.unwrap_or(server.port);
        let ip: IpAddr = bind
            .parse()
            .map_err(|e| RelayError::Config(format!("invalid bind address {bind:?}: {e}")))?;

        let outbound_queue = overrides.outbound_queue.unwrap_or(server.outbound_queue);
        if outbound_queue == 0 {
            return Err(RelayError::Config("outbound_queue must be at least 1".into()));
        }
        if server.max_frame_bytes == 0 {
            return Err(RelayError::Config("max_frame_bytes must be at least 1".into()));
        }

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            mode: overrides.mode.unwrap_or(server.mode),
            outbound_queue,
            max_frame_bytes: server.max_frame_bytes,
            stats_interval: overrides.stats_interval.unwrap_or(server.stats_interval),
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.mode, RouterMode::App);
        assert_eq!(cfg.outbound_queue, 256);
        assert_eq!(cfg.max_frame_bytes, 1_048_576);
        assert_eq!(cfg.stats_interval, 60);
    }

    #[test]
    fn parse_full_file() {
        let file = ConfigFile::parse(
            r#"
            [server]
            bind = "127.0.0.1"
            port = 9001
            mode = "signaling"
            outbound_queue = 32
            max_frame_bytes = 4096
            stats_interval = 0
            "#,
        )
        .unwrap();
        let cfg = ServerConfig::resolve(file, CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9001".parse().unwrap());
        assert_eq!(cfg.mode, RouterMode::Signaling);
        assert_eq!(cfg.outbound_queue, 32);
        assert_eq!(cfg.max_frame_bytes, 4096);
        assert_eq!(cfg.stats_interval, 0);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let file = ConfigFile::parse("[server]\nport = 7000\n").unwrap();
        let cfg = ServerConfig::resolve(file, CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 7000);
        assert_eq!(cfg.mode, RouterMode::App);

        let empty = ConfigFile::parse("").unwrap();
        assert_eq!(empty.server.port, 8080);
    }

    #[test]
    fn cli_overrides_file() {
        let file = ConfigFile::parse("[server]\nport = 7000\nmode = \"signaling\"\n").unwrap();
        let cfg = ServerConfig::resolve(
            file,
            CliOverrides {
                bind: Some("::1".into()),
                port: Some(7100),
                mode: Some(RouterMode::App),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cfg.bind_addr, "[::1]:7100".parse().unwrap());
        assert_eq!(cfg.mode, RouterMode::App);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ConfigFile::parse("[server]\nmode = \"mesh\"\n").is_err());
        assert!(ConfigFile::parse("[server]\nport = \"eighty\"\n").is_err());

        let bad_bind = CliOverrides {
            bind: Some("localhost:80".into()),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::resolve(ConfigFile::default(), bad_bind),
            Err(RelayError::Config(_))
        ));

        let zero_queue = CliOverrides {
            outbound_queue: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::resolve(ConfigFile::default(), zero_queue).is_err());
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 6001").unwrap();
        let cfg = ServerConfig::load(Some(file.path()), CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 6001);

        let missing = Path::new("/definitely/not/here/relay.toml");
        let cfg = ServerConfig::load(Some(missing), CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn tilde_expansion() {
        assert_eq!(expand_tilde_str("/etc/relay.toml"), PathBuf::from("/etc/relay.toml"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde_str("~/relay.toml"), home.join("relay.toml"));
        }
    }
}
