//! Client identity and host extraction.

use axum::http::{header, HeaderMap, Uri};
use std::net::SocketAddr;

/// Derive the client IP for blocklist accounting.
///
/// The first `X-Forwarded-For` entry wins, then `X-Real-Ip`, then the
/// connection's remote address without its port.
pub fn extract_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    if let Some(forwarded) = non_empty_header(headers, "x-forwarded-for") {
        if let Some(first_ip) = forwarded.split(',').next() {
            return first_ip.trim().to_string();
        }
    }

    if let Some(real_ip) = non_empty_header(headers, "x-real-ip") {
        return real_ip.trim().to_string();
    }

    match remote {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// The request host with any `:port` suffix removed.
pub fn request_host(headers: &HeaderMap, uri: &Uri) -> String {
    let raw = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default();
    cut_port(raw).to_string()
}

/// Strip everything from the last `:` onwards.
pub fn cut_port(host: &str) -> &str {
    match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host,
    }
}

fn non_empty_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}
