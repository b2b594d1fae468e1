use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config_validator::ConfigValidator;
use crate::error::Result;
use crate::proxy::ProxyConfig;

/// Runtime settings, read from flags or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "ingress-gate", about = "Virtual-host ingress with rate limiting and an IP blocklist")]
pub struct Config {
    /// Ingress listener address
    #[arg(long, env = "INGRESS_ADDR", default_value = "0.0.0.0:80")]
    pub ingress_addr: SocketAddr,

    /// Operator listener address (/metrics, /clearip, /health)
    #[arg(long, env = "ADMIN_ADDR", default_value = "0.0.0.0:8080")]
    pub admin_addr: SocketAddr,

    /// Token bucket capacity, also the initial allowance
    #[arg(long, env = "BUCKET_LIMIT", default_value_t = 10)]
    pub bucket_limit: u32,

    /// Tokens added per second
    #[arg(long, env = "BUCKET_RATE", default_value_t = 2)]
    pub bucket_rate: u32,

    /// Failures tolerated per client before it is blocked
    #[arg(long, env = "IP_LIMIT", default_value_t = 4)]
    pub ip_limit: u32,

    /// Quiet period after which a client's failure count starts over
    #[arg(long, env = "IP_DURATION", default_value = "2h", value_parser = humantime::parse_duration)]
    pub ip_duration: Duration,

    /// Status sent to blocked and rate-limited clients
    #[arg(long, env = "REJECT_STATUS", default_value_t = 414)]
    pub reject_status: u16,

    /// Environment variable prefix for route definitions
    #[arg(long, env = "ROUTE_PREFIX", default_value = "RO_")]
    pub route_prefix: String,

    /// Upper bound for each listener's graceful shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub shutdown_timeout: Duration,

    /// Backend connect timeout
    #[arg(long, env = "PROXY_CONNECT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub proxy_connect_timeout: Duration,

    /// Backend request timeout
    #[arg(long, env = "PROXY_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pub proxy_timeout: Duration,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from the command line and environment
    pub fn load() -> Result<Self> {
        let config = Config::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ConfigValidator::validate_rate_limit(self.bucket_limit, self.bucket_rate)?;
        ConfigValidator::validate_reject_status(self.reject_status)?;
        ConfigValidator::validate_route_prefix(&self.route_prefix)?;
        ConfigValidator::validate_listeners(self.ingress_addr, self.admin_addr)?;
        Ok(())
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig::default()
            .with_connect_timeout(self.proxy_connect_timeout)
            .with_request_timeout(self.proxy_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["ingress-gate"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.bucket_limit, 10);
        assert_eq!(config.bucket_rate, 2);
        assert_eq!(config.ip_limit, 4);
        assert_eq!(config.ip_duration, Duration::from_secs(2 * 60 * 60));
        assert_eq!(config.reject_status, 414);
        assert_eq!(config.route_prefix, "RO_");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_humantime_durations() {
        let config = parse(&["--ip-duration", "15m", "--shutdown-timeout", "250ms"]);
        assert_eq!(config.ip_duration, Duration::from_secs(900));
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        assert!(Config::try_parse_from(["ingress-gate", "--ip-duration", "soon"]).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = parse(&["--bucket-limit", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_config_follows_settings() {
        let config = parse(&["--proxy-timeout", "3s"]);
        assert_eq!(config.proxy_config().request_timeout, Duration::from_secs(3));
    }
}
