//! Server configuration
//!
//! Resolved once at startup from, in increasing precedence:
//! - built-in defaults rooted at the user's home directory
//! - an optional YAML file (`SENTINEL_WEB_CONFIG`, default `sentinel-web.yaml`)
//! - environment variables (`SENTINEL_LOGS`, `WEB_PORT`, ...)

use crate::actions::RestartCommand;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 8888;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 10;

const STATUS_FILE: &str = "status.json";
const HISTORY_FILE: &str = "history.jsonl";
const ACTIONS_FILE: &str = "actions.jsonl";
const ALERTS_DIR: &str = "alerts";
const CONFIG_FILE: &str = "sentinel.conf";
pub const DASHBOARD_FILE: &str = "sentinel-dashboard.html";
pub const TRIAGE_SCRIPT: &str = "sentinel-triage.sh";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("home directory could not be determined")]
    NoHome,
}

/// Optional overrides read from the YAML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    logs_dir: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    port: Option<u16>,
    bind: Option<IpAddr>,
    token_file: Option<PathBuf>,
    restart_command: Option<String>,
    command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Agent log directory (status, history, alerts, actions)
    pub logs_dir: PathBuf,
    /// Agent config directory (sentinel.conf)
    pub config_dir: PathBuf,
    /// Installation home (dashboard template, triage script)
    pub home_dir: PathBuf,
    pub port: u16,
    pub bind: IpAddr,
    pub token_file: PathBuf,
    /// Argv template with `{service}` / `{uid}` placeholders. `None` = platform default.
    pub restart_command: Option<String>,
    pub command_timeout: Duration,
    /// Directory of the running executable, searched before `home_dir` for assets.
    pub install_dir: Option<PathBuf>,
}

impl WebConfig {
    /// Loads `.env`, the optional YAML file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("SENTINEL_WEB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("sentinel-web.yaml"));
        let yaml = read_optional(&path)?;
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;

        let mut config = Self::resolve(&home, yaml.as_deref(), &path, |key| std::env::var(key).ok())?;
        config.install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        info!(
            logs = ?config.logs_dir,
            config = ?config.config_dir,
            home = ?config.home_dir,
            port = config.port,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Builds a config from a home directory, optional YAML text and an env lookup.
    pub fn resolve<F>(home: &Path, yaml: Option<&str>, yaml_path: &Path, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = match yaml {
            Some(txt) if !txt.trim().is_empty() => serde_yaml::from_str(txt).map_err(|source| ConfigError::Yaml {
                path: yaml_path.to_path_buf(),
                source,
            })?,
            _ => FileConfig::default(),
        };

        let config_dir = env("SENTINEL_CONFIG")
            .map(PathBuf::from)
            .or(file.config_dir)
            .unwrap_or_else(|| home.join(".sentinel-config"));

        let port = match env("WEB_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "WEB_PORT",
                reason: format!("{raw:?}: {e}"),
            })?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let bind = match env("WEB_BIND") {
            Some(raw) => raw.trim().parse::<IpAddr>().map_err(|e| ConfigError::Invalid {
                key: "WEB_BIND",
                reason: format!("{raw:?}: {e}"),
            })?,
            None => file.bind.unwrap_or(IpAddr::from([0, 0, 0, 0])),
        };

        let restart_command = env("SENTINEL_RESTART_COMMAND").or(file.restart_command);
        if let Some(template) = &restart_command {
            RestartCommand::parse(template)?;
        }

        let timeout_secs = file.command_timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "command_timeout_secs",
                reason: "must be greater than zero".into(),
            });
        }

        let config = Self {
            logs_dir: env("SENTINEL_LOGS")
                .map(PathBuf::from)
                .or(file.logs_dir)
                .unwrap_or_else(|| home.join(".sentinel-logs")),
            home_dir: env("SENTINEL_HOME")
                .map(PathBuf::from)
                .or(file.home_dir)
                .unwrap_or_else(|| home.join(".local/share/ops-sentinel")),
            token_file: env("WEB_TOKEN_FILE")
                .map(PathBuf::from)
                .or(file.token_file)
                .unwrap_or_else(|| home.join(".sentinel-config").join("web.token")),
            config_dir,
            port,
            bind,
            restart_command,
            command_timeout: Duration::from_secs(timeout_secs),
            install_dir: None,
        };
        debug!(?config, "resolved configuration");
        Ok(config)
    }

    pub fn status_path(&self) -> PathBuf {
        self.logs_dir.join(STATUS_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.logs_dir.join(HISTORY_FILE)
    }

    pub fn actions_path(&self) -> PathBuf {
        self.logs_dir.join(ACTIONS_FILE)
    }

    pub fn alerts_dir(&self) -> PathBuf {
        self.logs_dir.join(ALERTS_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Directories searched for the dashboard template and triage script, in order.
    pub fn asset_dirs(&self) -> Vec<PathBuf> {
        self.install_dir
            .iter()
            .cloned()
            .chain(std::iter::once(self.home_dir.clone()))
            .collect()
    }

    /// First existing `name` across [`asset_dirs`](Self::asset_dirs).
    pub fn find_asset(&self, name: &str) -> Option<PathBuf> {
        self.asset_dirs()
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        debug!(?path, "no config file, using defaults and environment");
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_under_home() {
        let home = Path::new("/home/op");
        let cfg = WebConfig::resolve(home, None, Path::new("x.yaml"), env_of(&[])).unwrap();
        assert_eq!(cfg.logs_dir, PathBuf::from("/home/op/.sentinel-logs"));
        assert_eq!(cfg.config_dir, PathBuf::from("/home/op/.sentinel-config"));
        assert_eq!(cfg.home_dir, PathBuf::from("/home/op/.local/share/ops-sentinel"));
        assert_eq!(cfg.token_file, PathBuf::from("/home/op/.sentinel-config/web.token"));
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.command_timeout, Duration::from_secs(10));
        assert_eq!(cfg.config_path(), PathBuf::from("/home/op/.sentinel-config/sentinel.conf"));
        assert_eq!(cfg.alerts_dir(), PathBuf::from("/home/op/.sentinel-logs/alerts"));
    }

    #[test]
    fn test_env_overrides_yaml() {
        let yaml = "port: 9000\nlogs_dir: /srv/logs\ncommand_timeout_secs: 3\n";
        let env = env_of(&[("WEB_PORT", "9100"), ("SENTINEL_CONFIG", "/etc/sentinel")]);
        let cfg = WebConfig::resolve(Path::new("/home/op"), Some(yaml), Path::new("x.yaml"), env).unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.logs_dir, PathBuf::from("/srv/logs"));
        assert_eq!(cfg.config_dir, PathBuf::from("/etc/sentinel"));
        assert_eq!(cfg.config_path(), PathBuf::from("/etc/sentinel/sentinel.conf"));
        assert_eq!(cfg.command_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_token_file_stays_in_home_when_config_moves() {
        let env = env_of(&[("SENTINEL_CONFIG", "/etc/sentinel")]);
        let cfg = WebConfig::resolve(Path::new("/home/op"), None, Path::new("x.yaml"), env).unwrap();
        assert_eq!(cfg.token_file, PathBuf::from("/home/op/.sentinel-config/web.token"));

        let env = env_of(&[("SENTINEL_CONFIG", "/etc/sentinel"), ("WEB_TOKEN_FILE", "/run/sentinel.token")]);
        let cfg = WebConfig::resolve(Path::new("/home/op"), None, Path::new("x.yaml"), env).unwrap();
        assert_eq!(cfg.token_file, PathBuf::from("/run/sentinel.token"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let home = Path::new("/home/op");
        let bad_port = WebConfig::resolve(home, None, Path::new("x.yaml"), env_of(&[("WEB_PORT", "http")]));
        assert!(matches!(bad_port, Err(ConfigError::Invalid { key: "WEB_PORT", .. })));

        let bad_cmd = WebConfig::resolve(
            home,
            None,
            Path::new("x.yaml"),
            env_of(&[("SENTINEL_RESTART_COMMAND", "launchctl 'unterminated")]),
        );
        assert!(matches!(bad_cmd, Err(ConfigError::Invalid { key: "restart_command", .. })));

        let bad_yaml = WebConfig::resolve(home, Some("port: [1"), Path::new("x.yaml"), env_of(&[]));
        assert!(matches!(bad_yaml, Err(ConfigError::Yaml { .. })));

        let zero = WebConfig::resolve(home, Some("command_timeout_secs: 0"), Path::new("x.yaml"), env_of(&[]));
        assert!(zero.is_err());
    }

    #[test]
    fn test_find_asset_prefers_install_dir() {
        let install = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join(TRIAGE_SCRIPT), "#!/bin/bash\n").unwrap();

        let mut cfg = WebConfig::resolve(
            Path::new("/home/op"),
            None,
            Path::new("x.yaml"),
            env_of(&[("SENTINEL_HOME", home.path().to_str().unwrap())]),
        )
        .unwrap();
        cfg.install_dir = Some(install.path().to_path_buf());
        assert_eq!(cfg.find_asset(TRIAGE_SCRIPT), Some(home.path().join(TRIAGE_SCRIPT)));

        std::fs::write(install.path().join(TRIAGE_SCRIPT), "#!/bin/bash\n").unwrap();
        assert_eq!(cfg.find_asset(TRIAGE_SCRIPT), Some(install.path().join(TRIAGE_SCRIPT)));
        assert_eq!(cfg.find_asset(DASHBOARD_FILE), None);
    }
}
