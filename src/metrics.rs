//! Prometheus-compatible metrics endpoint
//!
//! Counters for the simulation and replication loops of one process.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the session
#[derive(Debug)]
pub struct Metrics {
    // Participants and entities
    pub participants: AtomicU64,
    pub entities_spawned: AtomicU64,
    pub entities_despawned: AtomicU64,

    // Tick store
    pub snapshots_written: AtomicU64,
    pub snapshots_applied: AtomicU64,
    pub snapshots_stale: AtomicU64,

    // Interpolation
    pub interpolation_collapses: AtomicU64,

    // Goals
    pub goals_raised: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Replication
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub decode_errors: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation (VecDeque for O(1) pop_front)
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            participants: AtomicU64::new(0),
            entities_spawned: AtomicU64::new(0),
            entities_despawned: AtomicU64::new(0),
            snapshots_written: AtomicU64::new(0),
            snapshots_applied: AtomicU64::new(0),
            snapshots_stale: AtomicU64::new(0),
            interpolation_collapses: AtomicU64::new(0),
            goals_raised: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Add `n` to a counter
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);

        // Keep last 1000 samples
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("netball_participants", "Connected participants", "gauge",
            self.participants.load(Ordering::Relaxed));
        metric!("netball_entities_spawned_total", "Entities spawned", "counter",
            self.entities_spawned.load(Ordering::Relaxed));
        metric!("netball_entities_despawned_total", "Entities despawned", "counter",
            self.entities_despawned.load(Ordering::Relaxed));

        metric!("netball_snapshots_written_total", "Authoritative snapshots written", "counter",
            self.snapshots_written.load(Ordering::Relaxed));
        metric!("netball_snapshots_applied_total", "Replicated snapshots applied", "counter",
            self.snapshots_applied.load(Ordering::Relaxed));
        metric!("netball_snapshots_stale_total", "Replicated snapshots ignored as stale", "counter",
            self.snapshots_stale.load(Ordering::Relaxed));
        metric!("netball_interpolation_collapses_total", "Interpolation windows collapsed after a full tick", "counter",
            self.interpolation_collapses.load(Ordering::Relaxed));
        metric!("netball_goals_total", "Goal events raised", "counter",
            self.goals_raised.load(Ordering::Relaxed));

        metric!("netball_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("netball_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("netball_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("netball_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("netball_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("netball_messages_sent_total", "Replication messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("netball_messages_received_total", "Replication messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("netball_messages_dropped_total", "Replication messages dropped on full channels", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("netball_bytes_sent_total", "Replication bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("netball_decode_errors_total", "Replication messages that failed to decode", "counter",
            self.decode_errors.load(Ordering::Relaxed));
        metric!("netball_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        let value = serde_json::json!({
            "entities": {
                "participants": self.participants.load(Ordering::Relaxed),
                "spawned": self.entities_spawned.load(Ordering::Relaxed),
                "despawned": self.entities_despawned.load(Ordering::Relaxed),
            },
            "simulation": {
                "snapshots_written": self.snapshots_written.load(Ordering::Relaxed),
                "snapshots_applied": self.snapshots_applied.load(Ordering::Relaxed),
                "snapshots_stale": self.snapshots_stale.load(Ordering::Relaxed),
                "interpolation_collapses": self.interpolation_collapses.load(Ordering::Relaxed),
                "goals": self.goals_raised.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
            },
            "replication": {
                "messages_sent": self.messages_sent.load(Ordering::Relaxed),
                "messages_received": self.messages_received.load(Ordering::Relaxed),
                "messages_dropped": self.messages_dropped.load(Ordering::Relaxed),
                "bytes_sent": self.bytes_sent.load(Ordering::Relaxed),
                "decode_errors": self.decode_errors.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        });
        value.to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = http_response(&metrics, &request);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

/// Build the HTTP response for one request line
fn http_response(metrics: &Metrics, request: &str) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };

    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshots_written.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        Metrics::add(&metrics.goals_raised, 3);
        metrics.participants.store(2, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("netball_goals_total 3"));
        assert!(output.contains("netball_participants 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        Metrics::add(&metrics.snapshots_written, 12);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["simulation"]["snapshots_written"], 12);
    }

    #[test]
    fn test_http_routes() {
        let metrics = Metrics::new();
        assert!(http_response(&metrics, "GET /metrics HTTP/1.1").contains("netball_tick_count"));
        assert!(http_response(&metrics, "GET /metrics/json HTTP/1.1").contains("application/json"));
        assert!(http_response(&metrics, "GET /health HTTP/1.1").ends_with("OK"));
        assert!(http_response(&metrics, "GET /nope HTTP/1.1").starts_with("HTTP/1.1 404"));
    }
}
