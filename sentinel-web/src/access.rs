//! Access policy for state-mutating routes
//!
//! Two rules, evaluated in order:
//! - presented token must match the configured credential (401 otherwise)
//! - client address must be loopback or inside a trusted private range (403 otherwise)
//!
//! A token failure short-circuits: the locality check is never reached.

use crate::credential::Credential;
use axum::http::{HeaderMap, Method, StatusCode};
use std::net::{IpAddr, Ipv4Addr};

pub const TOKEN_HEADER: &str = "x-sentinel-token";

/// Trusted IPv4 ranges as (network, prefix length).
const TRUSTED_V4: [(Ipv4Addr, u8); 4] = [
    (Ipv4Addr::new(127, 0, 0, 0), 8),
    (Ipv4Addr::new(10, 0, 0, 0), 8),
    (Ipv4Addr::new(192, 168, 0, 0), 16),
    (Ipv4Addr::new(100, 64, 0, 0), 10), // CGNAT / Tailscale
];

/// Per-request facts the policy looks at.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub peer: Option<IpAddr>,
    pub token: Option<String>,
}

impl RequestContext {
    pub fn new(method: Method, path: &str, query: Option<&str>, peer: Option<IpAddr>, headers: &HeaderMap) -> Self {
        let token = headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            method,
            path: path.to_string(),
            query: query.map(str::to_string),
            peer,
            token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// 401: wrong or missing token
    BadToken,
    /// 403: request from outside the trusted subnets
    NonLocal,
}

impl Denial {
    pub fn status(self) -> StatusCode {
        match self {
            Denial::BadToken => StatusCode::UNAUTHORIZED,
            Denial::NonLocal => StatusCode::FORBIDDEN,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Denial::BadToken => "invalid or missing token",
            Denial::NonLocal => "non-local request",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    credential: Credential,
}

impl AccessPolicy {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn authorize(&self, ctx: &RequestContext) -> Decision {
        if !self.credential.matches(ctx.token.as_deref()) {
            return Decision::Deny(Denial::BadToken);
        }
        match ctx.peer {
            Some(ip) if is_trusted(ip) => Decision::Allow,
            _ => Decision::Deny(Denial::NonLocal),
        }
    }
}

/// Loopback, RFC1918 10/8 and 192.168/16, CGNAT 100.64/10, and `::1`.
/// IPv4-mapped IPv6 addresses are checked as their IPv4 form.
pub fn is_trusted(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => TRUSTED_V4.iter().any(|&(net, prefix)| in_range(v4, net, prefix)),
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}

fn in_range(ip: Ipv4Addr, net: Ipv4Addr, prefix: u8) -> bool {
    let mask = u32::MAX << (32 - u32::from(prefix));
    u32::from(ip) & mask == u32::from(net) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(peer: &str, token: Option<&str>) -> RequestContext {
        RequestContext {
            method: Method::POST,
            path: "/api/action/restart".into(),
            query: None,
            peer: Some(peer.parse().unwrap()),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_trusted_ranges() {
        for ip in ["127.0.0.1", "127.8.9.10", "10.1.2.3", "192.168.1.20", "100.64.0.1", "100.127.255.254", "::1", "::ffff:192.168.0.4"] {
            assert!(is_trusted(ip.parse().unwrap()), "{ip} should be trusted");
        }
        for ip in ["8.8.8.8", "172.16.0.1", "100.128.0.1", "100.63.255.255", "192.169.0.1", "fe80::1", "2001:db8::1"] {
            assert!(!is_trusted(ip.parse().unwrap()), "{ip} should not be trusted");
        }
    }

    #[test]
    fn test_token_checked_before_subnet() {
        let policy = AccessPolicy::new(Credential::new("tok"));
        // off-subnet with a bad token still gets 401
        assert_eq!(policy.authorize(&ctx("8.8.8.8", Some("nope"))), Decision::Deny(Denial::BadToken));
        assert_eq!(policy.authorize(&ctx("8.8.8.8", None)), Decision::Deny(Denial::BadToken));
        assert_eq!(policy.authorize(&ctx("8.8.8.8", Some("tok"))), Decision::Deny(Denial::NonLocal));
        assert_eq!(policy.authorize(&ctx("192.168.1.5", Some("tok"))), Decision::Allow);
        assert_eq!(policy.authorize(&ctx("192.168.1.5", None)), Decision::Deny(Denial::BadToken));
    }

    #[test]
    fn test_no_credential_only_checks_subnet() {
        let policy = AccessPolicy::new(Credential::disabled());
        assert_eq!(policy.authorize(&ctx("127.0.0.1", None)), Decision::Allow);
        assert_eq!(policy.authorize(&ctx("127.0.0.1", Some("anything"))), Decision::Allow);
        assert_eq!(policy.authorize(&ctx("203.0.113.9", None)), Decision::Deny(Denial::NonLocal));
    }

    #[test]
    fn test_unknown_peer_is_not_local() {
        let policy = AccessPolicy::default();
        let mut c = ctx("127.0.0.1", None);
        c.peer = None;
        assert_eq!(policy.authorize(&c), Decision::Deny(Denial::NonLocal));
    }

    #[test]
    fn test_context_reads_token_header() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, "abc".parse().unwrap());
        let c = RequestContext::new(Method::POST, "/api/action/kill", Some("x=1"), None, &headers);
        assert_eq!(c.token.as_deref(), Some("abc"));
        assert_eq!(c.query.as_deref(), Some("x=1"));
    }
}
