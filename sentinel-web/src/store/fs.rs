/**
 * FS STORE - Implémentation fichier du MonitorStore
 *
 * RÔLE :
 * Mappe chaque Resource sur un chemin fixe sous les dossiers logs/ et config/
 * de l'agent. Lecture fraîche à chaque appel, pas de cache mémoire.
 *
 * FICHIERS :
 * - logs/status.json      → Resource::Status
 * - logs/history.jsonl    → Resource::History
 * - logs/actions.jsonl    → Resource::Actions
 * - logs/alerts/ (fichiers .json et .txt)
 * - config/sentinel.conf  → Resource::Config
 */

use super::{AlertEntry, AlertKind, MonitorStore, Resource, StoreError};
use crate::config::WebConfig;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct FsStore {
    status: PathBuf,
    history: PathBuf,
    actions: PathBuf,
    config: PathBuf,
    alerts_dir: PathBuf,
}

impl FsStore {
    pub fn new(cfg: &WebConfig) -> Self {
        Self {
            status: cfg.status_path(),
            history: cfg.history_path(),
            actions: cfg.actions_path(),
            config: cfg.config_path(),
            alerts_dir: cfg.alerts_dir(),
        }
    }

    fn path(&self, resource: Resource) -> &Path {
        match resource {
            Resource::Status => &self.status,
            Resource::History => &self.history,
            Resource::Actions => &self.actions,
            Resource::Config => &self.config,
        }
    }

    /// Lecture texte ; fichier absent (ou pas un fichier) = NotFound
    fn read_existing(&self, resource: Resource) -> Result<String, StoreError> {
        let path = self.path(resource);
        if !path.is_file() {
            return Err(StoreError::NotFound(resource));
        }
        Ok(fs::read_to_string(path)?)
    }
}

impl MonitorStore for FsStore {
    fn read_json(&self, resource: Resource) -> Result<Value, StoreError> {
        let text = self.read_existing(resource)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn read_lines(&self, resource: Resource) -> Result<Vec<String>, StoreError> {
        let text = self.read_existing(resource)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn read_text(&self, resource: Resource) -> Result<String, StoreError> {
        self.read_existing(resource)
    }

    fn write_text(&self, resource: Resource, text: &str) -> Result<(), StoreError> {
        fs::write(self.path(resource), text)?;
        Ok(())
    }

    fn append_line(&self, resource: Resource, record: &Value) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(resource))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn list_alerts(&self) -> Result<Vec<AlertEntry>, StoreError> {
        if !self.alerts_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.alerts_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // mêmes règles qu'un glob shell : pas de fichiers cachés
            if name.starts_with('.') {
                continue;
            }
            let kind = if name.ends_with(".json") {
                AlertKind::Json
            } else if name.ends_with(".txt") {
                AlertKind::Text
            } else {
                continue;
            };
            let meta = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    debug!(file = %name, error = %e, "skipping unreadable alert entry");
                    continue;
                }
            };
            match meta.modified() {
                Ok(modified) => entries.push(AlertEntry { name, kind, modified }),
                Err(e) => debug!(file = %name, error = %e, "skipping alert without mtime"),
            }
        }
        Ok(entries)
    }

    fn read_alert(&self, entry: &AlertEntry) -> Result<String, StoreError> {
        Ok(fs::read_to_string(self.alerts_dir.join(&entry.name))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_in(dir: &Path) -> FsStore {
        FsStore {
            status: dir.join("status.json"),
            history: dir.join("history.jsonl"),
            actions: dir.join("actions.jsonl"),
            config: dir.join("sentinel.conf"),
            alerts_dir: dir.join("alerts"),
        }
    }

    #[test]
    fn test_missing_files_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(matches!(store.read_json(Resource::Status), Err(StoreError::NotFound(Resource::Status))));
        assert!(matches!(store.read_lines(Resource::History), Err(StoreError::NotFound(_))));
        assert!(matches!(store.read_text(Resource::Config), Err(StoreError::NotFound(_))));
        assert!(store.list_alerts().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_read_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.append_line(Resource::Actions, &json!({"action": "restart"})).unwrap();
        store.append_line(Resource::Actions, &json!({"action": "kill"})).unwrap();

        let lines = store.read_lines(Resource::Actions).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"action":"kill"}"#);
    }

    #[test]
    fn test_read_lines_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(dir.path().join("history.jsonl"), "{\"a\":1}\n\n   \n{\"a\":2}\n").unwrap();
        assert_eq!(store.read_lines(Resource::History).unwrap().len(), 2);
    }

    #[test]
    fn test_list_alerts_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let alerts = dir.path().join("alerts");
        fs::create_dir(&alerts).unwrap();
        fs::write(alerts.join("a.json"), "{}").unwrap();
        fs::write(alerts.join("b.txt"), "disk full").unwrap();
        fs::write(alerts.join("c.log"), "ignored").unwrap();
        fs::write(alerts.join(".hidden.json"), "{}").unwrap();
        fs::create_dir(alerts.join("nested.json")).unwrap();

        let store = store_in(dir.path());
        let mut names: Vec<_> = store.list_alerts().unwrap().into_iter().map(|e| (e.name, e.kind)).collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            names,
            vec![("a.json".to_string(), AlertKind::Json), ("b.txt".to_string(), AlertKind::Text)]
        );
    }

    #[test]
    fn test_write_text_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        store.write_text(Resource::Config, "A=\"1\"\n").unwrap();
        store.write_text(Resource::Config, "B=\"2\"\n").unwrap();
        assert_eq!(store.read_text(Resource::Config).unwrap(), "B=\"2\"\n");
    }
}
