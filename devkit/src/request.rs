/*!
Requêtes en mémoire contre un Router axum

`TestRequest` construit la requête (méthode, chemin, token, corps, adresse
client) et l'envoie via `tower::ServiceExt::oneshot`. L'adresse client est
ajoutée comme extension `ConnectInfo<SocketAddr>`, comme le fait le serveur
réel avec `into_make_service_with_connect_info`.
*/

use anyhow::Result;
use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tower::ServiceExt;

pub const TOKEN_HEADER: &str = "x-sentinel-token";

#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    uri: String,
    peer: Option<SocketAddr>,
    token: Option<String>,
    content_type: Option<&'static str>,
    body: Vec<u8>,
}

impl TestRequest {
    /// Defaults to a loopback client with no token and an empty body.
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            peer: Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 54321)),
            token: None,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn options(uri: &str) -> Self {
        Self::new(Method::OPTIONS, uri)
    }

    pub fn peer(mut self, ip: impl Into<IpAddr>) -> Self {
        self.peer = Some(SocketAddr::new(ip.into(), 54321));
        self
    }

    /// No `ConnectInfo` at all, as if the address were unknown.
    pub fn without_peer(mut self) -> Self {
        self.peer = None;
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn json(mut self, body: &Value) -> Self {
        self.content_type = Some("application/json");
        self.body = body.to_string().into_bytes();
        self
    }

    pub fn raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub async fn send(self, app: &Router) -> Result<TestResponse> {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        if let Some(token) = &self.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        if let Some(content_type) = self.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let mut req = builder.body(Body::from(self.body))?;
        if let Some(peer) = self.peer {
            req.extensions_mut().insert(ConnectInfo(peer));
        }

        let resp = app.clone().oneshot(req).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
        Ok(TestResponse { status, headers, body })
    }
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use serde_json::json;

    fn echo_router() -> Router {
        Router::new()
            .route(
                "/peer",
                get(|ConnectInfo(addr): ConnectInfo<SocketAddr>| async move { addr.ip().to_string() }),
            )
            .route(
                "/echo",
                post(|headers: HeaderMap, body: Bytes| async move {
                    let token = headers
                        .get(TOKEN_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    axum::Json(json!({ "token": token, "len": body.len() }))
                }),
            )
    }

    #[tokio::test]
    async fn test_peer_injected() {
        let app = echo_router();
        let resp = TestRequest::get("/peer").send(&app).await.unwrap();
        assert_eq!(resp.text(), "127.0.0.1");

        let resp = TestRequest::get("/peer").peer([203, 0, 113, 9]).send(&app).await.unwrap();
        assert_eq!(resp.text(), "203.0.113.9");
    }

    #[tokio::test]
    async fn test_token_and_body_forwarded() {
        let app = echo_router();
        let resp = TestRequest::post("/echo")
            .token("abc")
            .json(&json!({"k": "v"}))
            .send(&app)
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.json().unwrap(), json!({"token": "abc", "len": 9}));
    }
}
