// ===============================
// src/metrics.rs
// ===============================
//
// Tidak ada global registry: `Metrics` dibuat sekali di main lalu di-pass
// (Arc) ke task yang membutuhkan. Test bisa bikin instance sendiri.
//
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info};

use crate::domain::PositionSnapshot;

/// Dev-time timing of named operations, backed by one histogram.
pub struct PerfMonitor {
    durations: HistogramVec,
}

impl PerfMonitor {
    fn new() -> Result<Self, prometheus::Error> {
        let durations = HistogramVec::new(
            HistogramOpts::new("op_duration_seconds", "duration of timed operations (label: op)")
                .buckets(vec![1e-6, 1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1.0]),
            &["op"],
        )?;
        Ok(Self { durations })
    }

    pub fn time<T>(&self, op: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.durations.with_label_values(&[op]).observe(start.elapsed().as_secs_f64());
        out
    }

    pub fn count(&self, op: &str) -> u64 {
        self.durations.with_label_values(&[op]).get_sample_count()
    }
}

pub struct Metrics {
    registry: Registry,
    pub bets_received: IntCounter,
    pub bets_rejected: IntCounterVec,
    pub feed_errors: IntCounter,
    pub position: GaugeVec,
    pub worst_case: Gauge,
    pub perf: PerfMonitor,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bets_received = IntCounter::new("bets_received_total", "bets received from the feed")?;
        let bets_rejected = IntCounterVec::new(
            Opts::new("bets_rejected_total", "bets rejected by validation (label: reason)"),
            &["reason"],
        )?;
        let feed_errors = IntCounter::new("feed_errors_total", "failed feed reads/parses")?;
        let position = GaugeVec::new(
            Opts::new("position", "net position if selection wins"),
            &["market", "selection"],
        )?;
        let worst_case = Gauge::new("position_worst_case", "lowest position across selections")?;
        let perf = PerfMonitor::new()?;

        registry.register(Box::new(bets_received.clone()))?;
        registry.register(Box::new(bets_rejected.clone()))?;
        registry.register(Box::new(feed_errors.clone()))?;
        registry.register(Box::new(position.clone()))?;
        registry.register(Box::new(worst_case.clone()))?;
        registry.register(Box::new(perf.durations.clone()))?;

        Ok(Self { registry, bets_received, bets_rejected, feed_errors, position, worst_case, perf })
    }

    pub fn reject(&self, reason: &str) {
        self.bets_rejected.with_label_values(&[reason]).inc();
    }

    pub fn observe_snapshot(&self, snap: &PositionSnapshot) {
        for (sel, pos) in &snap.positions {
            self.position.with_label_values(&[&snap.market_id, sel]).set(*pos);
        }
        self.worst_case.set(snap.worst_case.unwrap_or(0.0));
    }

    // Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
            buf.extend_from_slice(b"# no metrics\n");
        }
        buf
    }
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream, metrics: &Metrics) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = metrics.encode();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub fn serve_metrics(metrics: Arc<Metrics>, port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, %addr, "metrics bind failed, metrics endpoint disabled");
                return;
            }
        };
        info!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream, &metrics),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
