pub mod admin;
pub mod client_ip;
pub mod config;
pub mod config_validator;
pub mod error;
pub mod filter;
pub mod graceful;
pub mod ip_blocker;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod router;
pub mod routes;
pub mod server;
pub mod token_bucket;

pub use config::Config;
pub use error::{GatewayError, HookError, Result};
pub use filter::{Bucket, ClientFilter};
pub use graceful::{GracefulHook, ShutdownCause, ShutdownReport};
pub use ip_blocker::IpBlocker;
pub use router::{Dispatcher, Forwarder};
pub use server::Server;
pub use token_bucket::TokenBucket;
