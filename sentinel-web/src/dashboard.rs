//! Dashboard page served at `/`

use crate::config::{WebConfig, DASHBOARD_FILE};
use crate::credential::Credential;
use crate::error::ApiError;
use std::fs;

const TOKEN_PLACEHOLDER: &str = "{{AUTH_TOKEN}}";
const PORT_PLACEHOLDER: &str = "{{WEB_PORT}}";

/// Reads the template from the asset directories and fills in the token and port.
pub fn render(cfg: &WebConfig, credential: &Credential) -> Result<String, ApiError> {
    let path = cfg
        .find_asset(DASHBOARD_FILE)
        .ok_or_else(|| ApiError::not_found("dashboard HTML not found"))?;
    let template = fs::read_to_string(&path)?;
    Ok(fill(&template, credential.token().unwrap_or_default(), cfg.port))
}

fn fill(template: &str, token: &str, port: u16) -> String {
    template
        .replace(TOKEN_PLACEHOLDER, token)
        .replace(PORT_PLACEHOLDER, &port.to_string())
}
