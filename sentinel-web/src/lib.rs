//! Sentinel web control plane: read-only views of the monitoring agent's
//! files plus token- and subnet-gated remediation actions.

pub mod access;
pub mod actions;
pub mod config;
pub mod credential;
pub mod dashboard;
pub mod error;
pub mod http;
pub mod resources;
pub mod store;

pub use config::WebConfig;
pub use credential::Credential;
pub use http::{build_app, AppState};
