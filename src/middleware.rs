use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use tracing::info;

use crate::client_ip::{extract_client_ip, request_host};

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = extract_client_ip(request.headers(), remote);
    let host = request_host(request.headers(), &uri);

    info!(
        target: "ingress_gate::middleware",
        method = %method,
        host = %host,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    info!(
        target: "ingress_gate::middleware",
        method = %method,
        host = %host,
        uri = %uri,
        status = %response.status(),
        "Request completed"
    );

    response
}
