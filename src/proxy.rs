//! Reverse proxy to the routed backend
//!
//! Handles request forwarding with:
//! - Connection pooling per backend
//! - URI rewriting onto the backend's scheme and authority
//! - X-Forwarded-For chain preservation plus our own hop

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue, Uri},
    response::{IntoResponse, Response},
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::time::Duration;

use crate::client_ip::cut_port;
use crate::error::{GatewayError, Result};
use crate::router::Forwarder;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Proxy transport configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub keepalive: Duration,
    pub idle_timeout: Duration,
    pub max_idle_per_host: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(15),
            max_idle_per_host: 10,
        }
    }
}

impl ProxyConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Pooled HTTP/1 reverse proxy
pub struct ReverseProxy {
    config: ProxyConfig,
    client: Client<HttpConnector, Body>,
}

impl ReverseProxy {
    pub fn new(config: ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_keepalive(Some(config.keepalive));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(connector);

        Self { config, client }
    }
}

#[async_trait]
impl Forwarder for ReverseProxy {
    async fn forward(
        &self,
        mut req: Request,
        backend: &Uri,
        remote: Option<SocketAddr>,
    ) -> Result<Response> {
        *req.uri_mut() = upstream_uri(backend, req.uri())?;

        let inbound_host = req
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        rewrite_headers(req.headers_mut(), backend, inbound_host.as_deref(), remote);

        let response = tokio::time::timeout(self.config.request_timeout, self.client.request(req))
            .await
            .map_err(|_| GatewayError::Upstream("Upstream request timeout".to_string()))?
            .map_err(|e| GatewayError::Upstream(format!("Upstream request failed: {}", e)))?;

        Ok(response.map(Body::new).into_response())
    }
}

/// Join the backend's scheme and authority with the inbound path and query.
fn upstream_uri(backend: &Uri, inbound: &Uri) -> Result<Uri> {
    let path_and_query = inbound
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let uri = format!(
        "{}://{}{}",
        backend.scheme_str().unwrap_or("http"),
        backend
            .authority()
            .map(|a| a.as_str())
            .unwrap_or("localhost"),
        path_and_query
    );

    uri.parse()
        .map_err(|e| GatewayError::Upstream(format!("Failed to parse upstream URI: {}", e)))
}

/// Rewrite request headers for the backend hop.
///
/// Every inbound X-Forwarded-For line is kept, joined with `", "`, byte for
/// byte, and the connection's peer address is appended to the chain.
fn rewrite_headers(
    headers: &mut HeaderMap,
    backend: &Uri,
    inbound_host: Option<&str>,
    remote: Option<SocketAddr>,
) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    if let Some(addr) = remote {
        let mut chain: Vec<u8> = Vec::new();
        for value in headers.get_all("x-forwarded-for") {
            let hop = value.as_bytes().trim_ascii();
            if hop.is_empty() {
                continue;
            }
            chain.extend_from_slice(hop);
            chain.extend_from_slice(b", ");
        }
        chain.extend_from_slice(addr.ip().to_string().as_bytes());

        if let Ok(value) = HeaderValue::from_bytes(&chain) {
            headers.insert("x-forwarded-for", value);
        }
    }

    if let Some(host) = inbound_host {
        if let Ok(value) = HeaderValue::from_str(cut_port(host)) {
            headers.insert("x-forwarded-host", value);
        }
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));

    if let Some(authority) = backend.authority() {
        if let Ok(value) = HeaderValue::from_str(authority.as_str()) {
            headers.insert(header::HOST, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> Uri {
        "http://10.1.0.5:8080".parse().unwrap()
    }

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let inbound: Uri = "/photos/1?size=large".parse().unwrap();
        let uri = upstream_uri(&backend(), &inbound).unwrap();
        assert_eq!(uri.to_string(), "http://10.1.0.5:8080/photos/1?size=large");
    }

    #[test]
    fn test_upstream_uri_defaults_to_root() {
        let inbound: Uri = "http://app.example.com".parse().unwrap();
        let uri = upstream_uri(&backend(), &inbound).unwrap();
        assert_eq!(uri.path(), "/");
        assert_eq!(uri.authority().unwrap().as_str(), "10.1.0.5:8080");
    }

    #[test]
    fn test_forwarded_chain_is_extended() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.0.2.10, 172.16.0.1"),
        );
        headers.insert("connection", HeaderValue::from_static("keep-alive"));

        rewrite_headers(
            &mut headers,
            &backend(),
            Some("app.example.com:443"),
            Some("10.0.0.2:5555".parse().unwrap()),
        );

        assert_eq!(
            headers.get("x-forwarded-for").unwrap(),
            "192.0.2.10, 172.16.0.1, 10.0.0.2"
        );
        assert_eq!(headers.get("x-forwarded-host").unwrap(), "app.example.com");
        assert_eq!(headers.get(header::HOST).unwrap(), "10.1.0.5:8080");
        assert!(headers.get("connection").is_none());
    }

    #[test]
    fn test_forwarded_chain_joins_every_header_line() {
        let mut headers = HeaderMap::new();
        headers.append("x-forwarded-for", HeaderValue::from_static("192.0.2.10"));
        headers.append("x-forwarded-for", HeaderValue::from_static("172.16.0.1"));

        rewrite_headers(
            &mut headers,
            &backend(),
            None,
            Some("10.0.0.2:5555".parse().unwrap()),
        );

        let chain: Vec<_> = headers.get_all("x-forwarded-for").iter().collect();
        assert_eq!(chain, vec!["192.0.2.10, 172.16.0.1, 10.0.0.2"]);
    }

    #[test]
    fn test_forwarded_chain_keeps_opaque_bytes() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_bytes(b"proxy-\xe9").unwrap(),
        );

        rewrite_headers(
            &mut headers,
            &backend(),
            None,
            Some("10.0.0.2:5555".parse().unwrap()),
        );

        assert_eq!(
            headers.get("x-forwarded-for").unwrap().as_bytes(),
            b"proxy-\xe9, 10.0.0.2"
        );
    }

    #[test]
    fn test_forwarded_chain_starts_with_peer() {
        let mut headers = HeaderMap::new();
        rewrite_headers(
            &mut headers,
            &backend(),
            None,
            Some("10.0.0.2:5555".parse().unwrap()),
        );
        assert_eq!(headers.get("x-forwarded-for").unwrap(), "10.0.0.2");
    }

    #[test]
    fn test_proxy_config_builder() {
        let config = ProxyConfig::default()
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_secs(10));

        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_idle_per_host, 10);
    }
}
