//! Admission pipeline for the ingress listener.
//!
//! Flow:
//! 1. Derive the client IP
//! 2. Reject clients already on the blocklist (adding another strike)
//! 3. Reject when the global token bucket is empty
//! 4. Reject hosts missing from the route table with 404
//! 5. Forward to the backend and turn any status above 399 into a strike

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use crate::client_ip::{extract_client_ip, request_host};
use crate::error::Result;
use crate::filter::{Bucket, ClientFilter};
use crate::metrics::{BlockReason, Metrics};
use crate::routes::RouteTable;

/// Reverse-proxy collaborator that carries an admitted request to its backend.
///
/// Implementations must keep the inbound `X-Forwarded-For` chain and append
/// their own hop rather than replacing it.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        req: Request,
        backend: &Uri,
        remote: Option<SocketAddr>,
    ) -> Result<Response>;
}

/// Gates every inbound request and forwards the admitted ones.
pub struct Dispatcher {
    bucket: Arc<dyn Bucket>,
    filter: Arc<dyn ClientFilter>,
    routes: Arc<RouteTable>,
    forwarder: Arc<dyn Forwarder>,
    metrics: Metrics,
    reject_status: StatusCode,
}

impl Dispatcher {
    pub fn new(
        bucket: Arc<dyn Bucket>,
        filter: Arc<dyn ClientFilter>,
        routes: Arc<RouteTable>,
        forwarder: Arc<dyn Forwarder>,
        metrics: Metrics,
    ) -> Self {
        Self {
            bucket,
            filter,
            routes,
            forwarder,
            metrics,
            reject_status: StatusCode::URI_TOO_LONG,
        }
    }

    /// Status sent to blocked and rate-limited clients.
    pub fn with_reject_status(mut self, status: StatusCode) -> Self {
        self.reject_status = status;
        self
    }

    pub async fn dispatch(&self, req: Request, remote: Option<SocketAddr>) -> Response {
        let ip = extract_client_ip(req.headers(), remote);
        let host = request_host(req.headers(), req.uri());

        if self.filter.check_blocked(&ip) {
            self.filter.notify_failure(&ip);
            error!(ip = %ip, host = %host, "blocked ip");
            self.metrics
                .blocked(BlockReason::Ip, &ip, &host, self.reject_status.as_u16())
                .await;
            return self.reject_status.into_response();
        }

        if !self.bucket.get_token() {
            error!(ip = %ip, host = %host, "rate limited");
            self.metrics
                .blocked(BlockReason::RateLimit, &ip, &host, self.reject_status.as_u16())
                .await;
            return self.reject_status.into_response();
        }

        let Some(backend) = self.routes.get(&host) else {
            error!(host = %host, "routing not found");
            self.metrics
                .blocked(
                    BlockReason::NotRouted,
                    &ip,
                    &host,
                    StatusCode::NOT_FOUND.as_u16(),
                )
                .await;
            return StatusCode::NOT_FOUND.into_response();
        };

        let response = match self.forwarder.forward(req, backend, remote).await {
            Ok(response) => response,
            Err(e) => {
                error!(host = %host, backend = %backend, error = %e, "Proxy forward failed");
                Response::builder()
                    .status(StatusCode::BAD_GATEWAY)
                    .body(Body::from("Bad Gateway"))
                    .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
            }
        };

        StatusInterceptor {
            filter: self.filter.as_ref(),
            metrics: &self.metrics,
            ip: &ip,
            host: &host,
        }
        .observe(response.status())
        .await;

        response
    }
}

/// Watches the status a backend wrote and feeds it back into the blocklist
/// and metrics.
struct StatusInterceptor<'a> {
    filter: &'a dyn ClientFilter,
    metrics: &'a Metrics,
    ip: &'a str,
    host: &'a str,
}

impl StatusInterceptor<'_> {
    async fn observe(&self, status: StatusCode) {
        if status.as_u16() > 399 {
            warn!(code = status.as_u16(), ip = %self.ip, "User got blocked");
            self.metrics
                .blocked(BlockReason::Ip, self.ip, self.host, status.as_u16())
                .await;
            self.filter.notify_failure(self.ip);
        } else {
            self.metrics.record_request(self.host, status.as_u16()).await;
        }
    }
}

/// Fallback handler that hands every ingress request to the dispatcher.
pub async fn ingress_handler(
    State(dispatcher): State<Arc<Dispatcher>>,
    req: Request,
) -> Response {
    let remote = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    dispatcher.dispatch(req, remote).await
}
