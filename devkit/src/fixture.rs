/*!
Arborescence Sentinel temporaire

Crée `logs/` (avec `alerts/`), `config/` et `home/` dans un TempDir supprimé
à la fin du test. `env()` expose les variables SENTINEL_* pointant dessus.
*/

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

pub struct SentinelFixture {
    dir: TempDir,
    overrides: HashMap<String, String>,
}

impl SentinelFixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("logs").join("alerts"))?;
        fs::create_dir_all(dir.path().join("config"))?;
        fs::create_dir_all(dir.path().join("home"))?;
        Ok(Self {
            dir,
            overrides: HashMap::new(),
        })
    }

    /// Extra environment entry, e.g. `SENTINEL_RESTART_COMMAND`.
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.overrides.insert(key.to_string(), value.to_string());
        self
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root().join("logs")
    }

    pub fn alerts_dir(&self) -> PathBuf {
        self.logs_dir().join("alerts")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root().join("config")
    }

    pub fn home_dir(&self) -> PathBuf {
        self.root().join("home")
    }

    pub fn token_file(&self) -> PathBuf {
        self.config_dir().join("web.token")
    }

    /// Environment lookup rooted at this fixture; overrides win.
    pub fn env(&self, key: &str) -> Option<String> {
        if let Some(value) = self.overrides.get(key) {
            return Some(value.clone());
        }
        let path = match key {
            "SENTINEL_LOGS" => self.logs_dir(),
            "SENTINEL_CONFIG" => self.config_dir(),
            "SENTINEL_HOME" => self.home_dir(),
            "WEB_TOKEN_FILE" => self.token_file(),
            _ => return None,
        };
        Some(path.display().to_string())
    }

    pub fn write_status(&self, status: &Value) -> Result<()> {
        fs::write(self.logs_dir().join("status.json"), serde_json::to_string(status)?)?;
        Ok(())
    }

    pub fn write_history(&self, records: &[Value]) -> Result<()> {
        self.write_history_raw(&to_jsonl(records)?)
    }

    /// Raw history text, for malformed-line cases.
    pub fn write_history_raw(&self, text: &str) -> Result<()> {
        fs::write(self.logs_dir().join("history.jsonl"), text)?;
        Ok(())
    }

    pub fn write_actions(&self, records: &[Value]) -> Result<()> {
        fs::write(self.logs_dir().join("actions.jsonl"), to_jsonl(records)?)?;
        Ok(())
    }

    pub fn write_alert_json(&self, name: &str, alert: &Value, modified: SystemTime) -> Result<PathBuf> {
        self.write_alert(name, &serde_json::to_string(alert)?, modified)
    }

    /// Any alert file; the mtime drives ordering.
    pub fn write_alert(&self, name: &str, content: &str, modified: SystemTime) -> Result<PathBuf> {
        let path = self.alerts_dir().join(name);
        fs::write(&path, content)?;
        fs::File::options().write(true).open(&path)?.set_modified(modified)?;
        Ok(path)
    }

    pub fn write_config(&self, text: &str) -> Result<()> {
        fs::write(self.config_dir().join("sentinel.conf"), text)?;
        Ok(())
    }

    pub fn read_config(&self) -> Result<String> {
        Ok(fs::read_to_string(self.config_dir().join("sentinel.conf"))?)
    }

    pub fn write_token(&self, token: &str) -> Result<()> {
        fs::write(self.token_file(), format!("{token}\n"))?;
        Ok(())
    }

    pub fn write_dashboard(&self, html: &str) -> Result<()> {
        fs::write(self.home_dir().join("sentinel-dashboard.html"), html)?;
        Ok(())
    }

    pub fn write_triage_script(&self, body: &str) -> Result<PathBuf> {
        let path = self.home_dir().join("sentinel-triage.sh");
        fs::write(&path, body)?;
        Ok(path)
    }
}

fn to_jsonl(records: &[Value]) -> Result<String> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    Ok(out)
}
