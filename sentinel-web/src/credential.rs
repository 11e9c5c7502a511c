//! Shared secret loaded once at startup.

use std::path::Path;
use tracing::{info, warn};

/// The token expected in `X-Sentinel-Token`. `None` disables token checks.
#[derive(Clone, Default)]
pub struct Credential(Option<String>);

impl Credential {
    /// Reads and trims the token file. A missing, empty or unreadable file
    /// yields a disabled credential.
    pub fn load(path: &Path) -> Self {
        if !path.is_file() {
            warn!(?path, "no token file, action endpoints rely on the subnet check only");
            return Self(None);
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let token = raw.trim();
                if token.is_empty() {
                    warn!(?path, "token file is empty, token check disabled");
                    Self(None)
                } else {
                    info!(?path, "token authentication enabled");
                    Self(Some(token.to_string()))
                }
            }
            Err(e) => {
                warn!(?path, error = %e, "failed to read token file, token check disabled");
                Self(None)
            }
        }
    }

    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Constant-time comparison against the configured token.
    pub fn matches(&self, presented: Option<&str>) -> bool {
        match (&self.0, presented) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(expected), Some(given)) => constant_time_eq(expected.as_bytes(), given.as_bytes()),
        }
    }
}

// never print the secret
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential")
            .field(&self.0.as_ref().map(|_| "***"))
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
