use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::admin::{admin_router, AdminState};
use crate::config::Config;
use crate::config_validator::ConfigValidator;
use crate::error::{GatewayError, Result};
use crate::graceful::{shutdown_signal, GracefulHook, ShutdownReport};
use crate::ip_blocker::IpBlocker;
use crate::metrics::Metrics;
use crate::middleware::logging_middleware;
use crate::proxy::ReverseProxy;
use crate::router::{ingress_handler, Dispatcher};
use crate::routes::RouteTable;
use crate::token_bucket::TokenBucket;

/// Every request, whatever its path, goes through the dispatcher.
pub fn ingress_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(ingress_handler)
        .with_state(dispatcher)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(logging_middleware)),
        )
}

enum Listen {
    Addr(SocketAddr),
    Bound(TcpListener),
}

pub struct Server {
    ingress_addr: SocketAddr,
    admin_addr: SocketAddr,
    shutdown_timeout: Duration,
    ingress: Router,
    admin: Router,
}

impl Server {
    pub fn new(config: Config, routes: RouteTable) -> Result<Self> {
        config.validate()?;
        let reject_status = ConfigValidator::validate_reject_status(config.reject_status)?;

        if routes.is_empty() {
            tracing::warn!(prefix = %config.route_prefix, "No routes configured, every request will get 404");
        }

        let blocker = Arc::new(IpBlocker::new(config.ip_limit, config.ip_duration));
        let bucket = Arc::new(TokenBucket::new(config.bucket_limit, config.bucket_rate));
        let proxy = Arc::new(ReverseProxy::new(config.proxy_config()));
        let metrics = Metrics::new();
        let route_count = routes.len();

        let dispatcher = Dispatcher::new(
            bucket,
            blocker.clone(),
            Arc::new(routes),
            proxy,
            metrics.clone(),
        )
        .with_reject_status(reject_status);

        let admin = admin_router(AdminState {
            blocker,
            metrics,
            routes: route_count,
            started: Instant::now(),
        });

        Ok(Self {
            ingress_addr: config.ingress_addr,
            admin_addr: config.admin_addr,
            shutdown_timeout: config.shutdown_timeout,
            ingress: ingress_router(Arc::new(dispatcher)),
            admin,
        })
    }

    /// Start both listeners on their configured addresses.
    ///
    /// The admin listener is registered first so the ingress is torn down
    /// before it.
    pub fn register(self, hook: &mut GracefulHook) {
        let (ingress, admin) = (Listen::Addr(self.ingress_addr), Listen::Addr(self.admin_addr));
        self.register_listeners(hook, ingress, admin);
    }

    /// Start both listeners on sockets the caller already bound.
    pub fn register_with_listeners(
        self,
        hook: &mut GracefulHook,
        ingress: TcpListener,
        admin: TcpListener,
    ) {
        self.register_listeners(hook, Listen::Bound(ingress), Listen::Bound(admin));
    }

    /// Serve until Ctrl+C, SIGTERM or a listener failure, then tear down.
    pub async fn run(self) -> ShutdownReport {
        let mut hook = GracefulHook::new(shutdown_signal());
        self.register(&mut hook);
        hook.wait().await
    }

    fn register_listeners(self, hook: &mut GracefulHook, ingress: Listen, admin: Listen) {
        register_listener(hook, "admin", admin, self.admin, self.shutdown_timeout);
        register_listener(hook, "ingress", ingress, self.ingress, self.shutdown_timeout);
    }
}

fn register_listener(
    hook: &mut GracefulHook,
    name: &'static str,
    listen: Listen,
    app: Router,
    timeout: Duration,
) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel::<()>();

    hook.register_shutdown_with_startup(
        async move {
            let result = serve(name, listen, app, stop_rx).await;
            let _ = done_tx.send(());
            result
        },
        move || async move {
            info!(listener = name, "Stopping listener");
            let _ = stop_tx.send(());
            let _ = done_rx.await;
            info!(listener = name, "Listener stopped");
        },
        Some(timeout),
    );
}

async fn serve(
    name: &'static str,
    listen: Listen,
    app: Router,
    stop: oneshot::Receiver<()>,
) -> Result<()> {
    let listener = match listen {
        Listen::Bound(listener) => listener,
        Listen::Addr(addr) => TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?,
    };

    info!(listener = name, addr = %listener.local_addr()?, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = stop.await;
    })
    .await?;

    Ok(())
}
