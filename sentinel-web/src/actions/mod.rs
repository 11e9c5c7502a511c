//! Remediation actions
//!
//! Each POST body is validated into an [`ActionRequest`] before anything runs;
//! the [`ActionDispatcher`] then performs exactly one side effect:
//! - Restart: service supervisor restart primitive (argv template)
//! - Kill: `kill -TERM <pid>` or `pkill -f <name>`
//! - ConfigSet: read-modify-write of `sentinel.conf` (no lock, last writer wins)
//! - Triage: detached `bash sentinel-triage.sh --auto`, outcome not observable
//!
//! Restart and Kill run under the configured command timeout. A non-zero exit
//! is reported as `ok: false` data, not as an HTTP error.

pub mod exec;

use crate::config::{ConfigError, WebConfig, TRIAGE_SCRIPT};
use crate::error::ApiError;
use crate::store::{MonitorStore, Resource};
use exec::CommandOutput;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Restart,
    Kill,
    ConfigSet,
    Triage,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Restart => "restart",
            ActionKind::Kill => "kill",
            ActionKind::ConfigSet => "config",
            ActionKind::Triage => "triage",
        }
    }
}

/// Process to signal; `pid` wins when the body carries both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KillTarget {
    Pid(u32),
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Restart { service: String },
    Kill(KillTarget),
    ConfigSet { key: String, value: Value },
    Triage,
}

impl ActionRequest {
    /// Validates a decoded JSON body against the contract of `kind`.
    pub fn parse(kind: ActionKind, body: &Value) -> Result<Self, ApiError> {
        if kind == ActionKind::Triage {
            return Ok(Self::Triage);
        }
        let fields = body
            .as_object()
            .ok_or_else(|| ApiError::validation("request body must be a JSON object"))?;

        match kind {
            ActionKind::Restart => {
                let service = non_empty_str(fields, "service").ok_or_else(|| ApiError::validation("missing 'service' field"))?;
                Ok(Self::Restart { service: service.to_string() })
            }
            ActionKind::Kill => parse_kill(fields).map(Self::Kill),
            ActionKind::ConfigSet => parse_config_set(fields),
            ActionKind::Triage => Ok(Self::Triage),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Restart { .. } => ActionKind::Restart,
            Self::Kill(_) => ActionKind::Kill,
            Self::ConfigSet { .. } => ActionKind::ConfigSet,
            Self::Triage => ActionKind::Triage,
        }
    }
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn parse_kill(fields: &Map<String, Value>) -> Result<KillTarget, ApiError> {
    let pid = match fields.get("pid") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_i64()),
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().parse::<i64>().ok()),
        Some(_) => return Err(ApiError::validation("'pid' must be an integer")),
    };

    match pid {
        // 0 reads as "no pid", like null or ""
        None | Some(Some(0)) => {}
        Some(Some(pid)) => {
            return u32::try_from(pid)
                .map(KillTarget::Pid)
                .map_err(|_| ApiError::validation("'pid' must be a positive integer"));
        }
        Some(None) => return Err(ApiError::validation("'pid' must be an integer")),
    }

    non_empty_str(fields, "name")
        .map(|name| KillTarget::Name(name.to_string()))
        .ok_or_else(|| ApiError::validation("missing 'pid' or 'name' field"))
}

fn parse_config_set(fields: &Map<String, Value>) -> Result<ActionRequest, ApiError> {
    let key = non_empty_str(fields, "key");
    let value = fields.get("value").filter(|v| !v.is_null());
    let (Some(key), Some(value)) = (key, value) else {
        return Err(ApiError::validation("missing 'key' or 'value' field"));
    };

    // the rewrite is one assignment per line
    if key.contains(['\n', '\r']) || render_value(value).contains(['\n', '\r']) {
        return Err(ApiError::validation("'key' and 'value' may not contain line breaks"));
    }

    Ok(ActionRequest::ConfigSet {
        key: key.to_string(),
        value: value.clone(),
    })
}

/// Text written between the quotes of `key="..."`.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rewrites `key=...` / `key="..."` (first match, leading whitespace allowed)
/// or appends the assignment. Output always ends with exactly one newline.
pub fn apply_config_assignment(text: &str, key: &str, value: &str) -> (String, bool) {
    let assignment = format!("{key}=\"{value}\"");
    let bare = format!("{key}=");
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

    let updated = match lines.iter().position(|line| line.trim_start().starts_with(&bare)) {
        Some(idx) => {
            lines[idx] = assignment;
            true
        }
        None => {
            lines.push(assignment);
            false
        }
    };

    let mut out = lines.join("\n");
    out.push('\n');
    (out, updated)
}

/// Service restart argv template with `{service}` and `{uid}` placeholders.
#[derive(Debug, Clone)]
pub struct RestartCommand {
    argv: Vec<String>,
}

impl RestartCommand {
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let argv = shell_words::split(template).map_err(|e| ConfigError::Invalid {
            key: "restart_command",
            reason: e.to_string(),
        })?;
        if argv.is_empty() {
            return Err(ConfigError::Invalid {
                key: "restart_command",
                reason: "empty command".into(),
            });
        }
        Ok(Self { argv })
    }

    /// launchd on macOS, systemd user units elsewhere.
    pub fn platform_default() -> Self {
        let template: &[&str] = if cfg!(target_os = "macos") {
            &["launchctl", "kickstart", "-k", "gui/{uid}/{service}"]
        } else {
            &["systemctl", "--user", "restart", "{service}"]
        };
        Self {
            argv: template.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Substitutes per argument, after splitting.
    pub fn render(&self, service: &str, uid: u32) -> (String, Vec<String>) {
        let uid = uid.to_string();
        let mut argv = self
            .argv
            .iter()
            .map(|arg| arg.replace("{service}", service).replace("{uid}", &uid));
        let program = argv.next().unwrap_or_default();
        (program, argv.collect())
    }
}

#[derive(Debug, Serialize)]
pub struct RestartReport {
    pub ok: bool,
    pub service: String,
    #[serde(flatten)]
    pub output: CommandOutput,
}

#[derive(Debug, Serialize)]
pub struct KillReport {
    pub ok: bool,
    pub target: KillTarget,
    #[serde(flatten)]
    pub output: CommandOutput,
}

#[derive(Debug, Serialize)]
pub struct ConfigSetReport {
    pub ok: bool,
    pub key: String,
    pub value: Value,
    pub updated: bool,
}

#[derive(Debug, Serialize)]
pub struct TriageAck {
    pub ok: bool,
    pub message: &'static str,
}

/// Outcome of a dispatched action, serialized as the response body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ActionResult {
    Restart(RestartReport),
    Kill(KillReport),
    ConfigSet(ConfigSetReport),
    Triage(TriageAck),
}

pub struct ActionDispatcher {
    store: Arc<dyn MonitorStore>,
    restart: RestartCommand,
    timeout: Duration,
    triage_candidates: Vec<PathBuf>,
}

impl ActionDispatcher {
    pub fn new(cfg: &WebConfig, store: Arc<dyn MonitorStore>) -> Result<Self, ConfigError> {
        let restart = match &cfg.restart_command {
            Some(template) => RestartCommand::parse(template)?,
            None => RestartCommand::platform_default(),
        };
        Ok(Self {
            store,
            restart,
            timeout: cfg.command_timeout,
            triage_candidates: cfg.asset_dirs().into_iter().map(|dir| dir.join(TRIAGE_SCRIPT)).collect(),
        })
    }

    pub async fn dispatch(&self, request: ActionRequest) -> Result<ActionResult, ApiError> {
        debug!(action = request.kind().as_str(), "dispatching action");
        match request {
            ActionRequest::Restart { service } => self.restart(service).await.map(ActionResult::Restart),
            ActionRequest::Kill(target) => self.kill(target).await.map(ActionResult::Kill),
            ActionRequest::ConfigSet { key, value } => self.set_config(key, value).map(ActionResult::ConfigSet),
            ActionRequest::Triage => self.triage().map(ActionResult::Triage),
        }
    }

    async fn restart(&self, service: String) -> Result<RestartReport, ApiError> {
        let (program, args) = self.restart.render(&service, current_uid());
        info!(%service, %program, "restarting service");

        let output = exec::run_with_timeout(&program, &args, self.timeout).await?;
        if !output.success() {
            warn!(%service, returncode = output.returncode, stderr = %output.stderr, "restart failed");
        }
        Ok(RestartReport {
            ok: output.success(),
            service,
            output,
        })
    }

    async fn kill(&self, target: KillTarget) -> Result<KillReport, ApiError> {
        let (program, args) = match &target {
            KillTarget::Pid(pid) => ("kill", vec!["-TERM".to_string(), pid.to_string()]),
            KillTarget::Name(name) => ("pkill", vec!["-f".to_string(), name.clone()]),
        };
        info!(?target, "signalling process");

        let output = exec::run_with_timeout(program, &args, self.timeout).await?;
        if !output.success() {
            warn!(?target, returncode = output.returncode, stderr = %output.stderr, "kill failed");
        }
        Ok(KillReport {
            ok: output.success(),
            target,
            output,
        })
    }

    fn set_config(&self, key: String, value: Value) -> Result<ConfigSetReport, ApiError> {
        let text = self.store.read_text(Resource::Config)?;
        let (rewritten, updated) = apply_config_assignment(&text, &key, &render_value(&value));
        self.store.write_text(Resource::Config, &rewritten)?;

        info!(%key, updated, "config key written");
        Ok(ConfigSetReport {
            ok: true,
            key,
            value,
            updated,
        })
    }

    fn triage(&self) -> Result<TriageAck, ApiError> {
        let script = self
            .triage_candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ApiError::not_found("triage script not found"))?;

        let args = vec![script.display().to_string(), "--auto".to_string()];
        exec::spawn_detached("bash", &args)?;
        Ok(TriageAck {
            ok: true,
            message: "triage started in background",
        })
    }
}

fn current_uid() -> u32 {
    nix::unistd::getuid().as_raw()
}
