//! Read-only snapshots of the agent's on-disk state
//!
//! Every call re-reads the store. Line-oriented logs never fail on a bad
//! record: malformed lines are skipped and logged at debug level.

use crate::error::ApiError;
use crate::store::{AlertEntry, AlertKind, MonitorStore, Resource, StoreError};
use serde_json::{json, Value};
use std::cmp::Reverse;
use std::time::SystemTime;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::debug;

/// Maximum number of alerts returned, newest first.
pub const ALERT_LIMIT: usize = 50;
/// History samples per hour (one per minute).
const SAMPLES_PER_HOUR: usize = 60;

pub fn status(store: &dyn MonitorStore) -> Result<Value, ApiError> {
    Ok(store.read_json(Resource::Status)?)
}

/// History records, optionally limited to the last `hours * 60` lines.
pub fn history(store: &dyn MonitorStore, hours: Option<usize>) -> Result<Vec<Value>, ApiError> {
    let mut lines = read_lines_or_empty(store, Resource::History)?;
    if let Some(hours) = hours {
        let keep = hours.saturating_mul(SAMPLES_PER_HOUR);
        if lines.len() > keep {
            lines.drain(..lines.len() - keep);
        }
    }
    Ok(parse_records(Resource::History, &lines))
}

pub fn actions(store: &dyn MonitorStore) -> Result<Vec<Value>, ApiError> {
    let lines = read_lines_or_empty(store, Resource::Actions)?;
    Ok(parse_records(Resource::Actions, &lines))
}

pub fn config(store: &dyn MonitorStore) -> Result<Value, ApiError> {
    let text = store.read_text(Resource::Config)?;
    Ok(json!({ "config": text }))
}

/// Up to [`ALERT_LIMIT`] alerts by modification time, newest first.
/// The cap applies before reading, so unreadable files shrink the result.
pub fn alerts(store: &dyn MonitorStore) -> Result<Vec<Value>, ApiError> {
    let mut entries = store.list_alerts()?;
    entries.sort_by_key(|entry| Reverse(entry.modified));
    entries.truncate(ALERT_LIMIT);

    let alerts = entries
        .iter()
        .filter_map(|entry| match read_alert(store, entry) {
            Ok(alert) => Some(alert),
            Err(e) => {
                debug!(file = %entry.name, error = %e, "skipping alert");
                None
            }
        })
        .collect();
    Ok(alerts)
}

fn read_alert(store: &dyn MonitorStore, entry: &AlertEntry) -> Result<Value, StoreError> {
    let content = store.read_alert(entry)?;
    match entry.kind {
        AlertKind::Json => Ok(serde_json::from_str(&content)?),
        AlertKind::Text => Ok(json!({
            "file": entry.name,
            "content": content,
            "timestamp": iso_utc(entry.modified),
        })),
    }
}

/// Parses a `hours` query value; anything but a positive integer is ignored.
pub fn parse_hours(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok().filter(|h| *h > 0)
}

fn read_lines_or_empty(store: &dyn MonitorStore, resource: Resource) -> Result<Vec<String>, ApiError> {
    match store.read_lines(resource) {
        Ok(lines) => Ok(lines),
        Err(StoreError::NotFound(_)) => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

fn parse_records(resource: Resource, lines: &[String]) -> Vec<Value> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| match serde_json::from_str(line) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(%resource, line = idx + 1, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

/// `YYYY-MM-DDTHH:MM:SSZ`
fn iso_utc(at: SystemTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
    OffsetDateTime::from(at).format(&format).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebConfig;
    use crate::store::FsStore;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    struct Fixture {
        _dir: tempfile::TempDir,
        logs: std::path::PathBuf,
        config: std::path::PathBuf,
        store: FsStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = dir.path().join("config");
        fs::create_dir_all(logs.join("alerts")).unwrap();
        fs::create_dir_all(&config).unwrap();
        let (l, c) = (logs.display().to_string(), config.display().to_string());
        let cfg = WebConfig::resolve(dir.path(), None, Path::new("none.yaml"), |key| match key {
            "SENTINEL_LOGS" => Some(l.clone()),
            "SENTINEL_CONFIG" => Some(c.clone()),
            _ => None,
        })
        .unwrap();
        Fixture {
            store: FsStore::new(&cfg),
            _dir: dir,
            logs,
            config,
        }
    }

    fn write_history(fx: &Fixture, n: usize) {
        let body: String = (0..n).map(|i| format!("{{\"seq\":{i}}}\n")).collect();
        fs::write(fx.logs.join("history.jsonl"), body).unwrap();
    }

    #[test]
    fn test_status_missing_and_malformed() {
        let fx = fixture();
        let err = status(&fx.store).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref m) if m == "no status data yet"));

        fs::write(fx.logs.join("status.json"), "{\"cpu\": ").unwrap();
        assert_eq!(status(&fx.store).unwrap_err().status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);

        fs::write(fx.logs.join("status.json"), "{\"cpu\": 12.5}").unwrap();
        assert_eq!(status(&fx.store).unwrap(), json!({"cpu": 12.5}));
    }

    #[test]
    fn test_history_hours_window() {
        let fx = fixture();
        write_history(&fx, 200);

        let last = history(&fx.store, Some(2)).unwrap();
        assert_eq!(last.len(), 120);
        assert_eq!(last[0]["seq"], 80);
        assert_eq!(last[119]["seq"], 199);

        assert_eq!(history(&fx.store, Some(5)).unwrap().len(), 200);
        assert_eq!(history(&fx.store, None).unwrap().len(), 200);
    }

    #[test]
    fn test_history_missing_is_empty() {
        let fx = fixture();
        assert!(history(&fx.store, Some(1)).unwrap().is_empty());
        assert!(actions(&fx.store).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_line_skipped() {
        let fx = fixture();
        fs::write(
            fx.logs.join("actions.jsonl"),
            "{\"action\":\"restart\"}\nnot json\n{\"action\":\"kill\"}\n",
        )
        .unwrap();
        let records = actions(&fx.store).unwrap();
        assert_eq!(records, vec![json!({"action": "restart"}), json!({"action": "kill"})]);
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse_hours(Some("2")), Some(2));
        assert_eq!(parse_hours(Some(" 3 ")), Some(3));
        assert_eq!(parse_hours(Some("0")), None);
        assert_eq!(parse_hours(Some("-1")), None);
        assert_eq!(parse_hours(Some("two")), None);
        assert_eq!(parse_hours(None), None);
    }

    #[test]
    fn test_alerts_newest_first_capped() {
        let fx = fixture();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        for i in 0..60u64 {
            let path = fx.logs.join("alerts").join(format!("alert-{i:02}.json"));
            fs::write(&path, format!("{{\"n\":{i}}}")).unwrap();
            let file = fs::File::options().write(true).open(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i * 60)).unwrap();
        }

        let list = alerts(&fx.store).unwrap();
        assert_eq!(list.len(), ALERT_LIMIT);
        assert_eq!(list[0]["n"], 59);
        assert_eq!(list[49]["n"], 10);
    }

    #[test]
    fn test_text_alert_wrapped() {
        let fx = fixture();
        let path = fx.logs.join("alerts").join("disk.txt");
        fs::write(&path, "disk almost full").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();
        fs::write(fx.logs.join("alerts").join("broken.json"), "{").unwrap();

        let list = alerts(&fx.store).unwrap();
        assert_eq!(
            list,
            vec![json!({
                "file": "disk.txt",
                "content": "disk almost full",
                "timestamp": "2023-11-14T22:13:20Z",
            })]
        );
    }

    #[test]
    fn test_config_wrapped() {
        let fx = fixture();
        assert!(matches!(config(&fx.store), Err(ApiError::NotFound(_))));
        fs::write(fx.config.join("sentinel.conf"), "CPU_LIMIT=\"80\"\n").unwrap();
        assert_eq!(config(&fx.store).unwrap(), json!({"config": "CPU_LIMIT=\"80\"\n"}));
    }
}
