use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Why a request was counted as blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Ip,
    RateLimit,
    NotRouted,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::Ip => "ip",
            BlockReason::RateLimit => "ratelimit",
            BlockReason::NotRouted => "notrouted",
        }
    }
}

/// In-process counter registry rendered in the Prometheus text format.
///
/// `http_requests_total` is labeled by (domain, status) and
/// `blocked_clients_total` by (type, ip).
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    requests_total: Arc<RwLock<BTreeMap<(String, String), u64>>>,
    blocked_total: Arc<RwLock<BTreeMap<(String, String), u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a normally served request.
    pub async fn record_request(&self, host: &str, status: u16) {
        let mut requests = self.requests_total.write().await;
        *requests
            .entry((host.to_string(), status.to_string()))
            .or_default() += 1;
    }

    /// Count a blocked request against both the block and request counters.
    pub async fn blocked(&self, reason: BlockReason, ip: &str, host: &str, status: u16) {
        {
            let mut blocked = self.blocked_total.write().await;
            *blocked
                .entry((reason.as_str().to_string(), ip.to_string()))
                .or_default() += 1;
        }
        self.record_request(host, status).await;
    }

    pub async fn requests(&self, host: &str, status: u16) -> u64 {
        let requests = self.requests_total.read().await;
        requests
            .get(&(host.to_string(), status.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub async fn blocked_count(&self, reason: BlockReason, ip: &str) -> u64 {
        let blocked = self.blocked_total.read().await;
        blocked
            .get(&(reason.as_str().to_string(), ip.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Render every counter for a `/metrics` scrape.
    pub async fn render(&self) -> String {
        let mut output = String::with_capacity(1024);

        output.push_str(
            "# HELP http_requests_total Total number of HTTP requests handled, labeled by domain and status.\n",
        );
        output.push_str("# TYPE http_requests_total counter\n");
        for ((domain, status), count) in self.requests_total.read().await.iter() {
            let _ = writeln!(
                output,
                "http_requests_total{{domain=\"{}\",status=\"{}\"}} {}",
                escape_label(domain),
                status,
                count
            );
        }

        output.push_str("# HELP blocked_clients_total Blocked ips and type of block\n");
        output.push_str("# TYPE blocked_clients_total counter\n");
        for ((kind, ip), count) in self.blocked_total.read().await.iter() {
            let _ = writeln!(
                output,
                "blocked_clients_total{{type=\"{}\",ip=\"{}\"}} {}",
                kind,
                escape_label(ip),
                count
            );
        }

        output
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
