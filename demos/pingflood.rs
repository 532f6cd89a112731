//! Latency flood: hammers a JSON-RPC server with `system.ping` requests
//! over TCP and prints throughput and round-trip statistics once a second.
//!
//! Uses the tagged vendor dialect, so every call passes a null tag list as
//! its first parameter.
//!
//! ```text
//! cargo run --example pingflood -- <host:port>
//! ```

use std::process;
use std::sync::Arc;
use std::time::Duration;

use jsonrpc_mux::{Connection, PendingReply, TaggedDialect};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One in-flight ping and the moment it was sent.
struct Ping {
    reply: PendingReply,
    sent: Instant,
}

/// Round-trip stats for the current one-second window, plus the running
/// reply total used to compute the outstanding count.
#[derive(Default)]
struct Stats {
    replies: u64,
    replies_total: u64,
    min_rtt: Option<Duration>,
    max_rtt: Duration,
    total_rtt: Duration,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let Some(addr) = std::env::args().nth(1) else {
        eprintln!("Usage:\n  pingflood <host:port>");
        process::exit(2);
    };

    let stream = TcpStream::connect(&addr).await?;
    let conn = Connection::new(stream, TaggedDialect);
    let ping = conn.request("system.ping");

    let stats = Arc::new(Mutex::new(Stats::default()));
    let (tx, mut rx) = mpsc::channel::<Ping>(10_000);

    // Collector: awaits each reply in send order and folds in its rtt.
    let collector_stats = stats.clone();
    tokio::spawn(async move {
        while let Some(ping) = rx.recv().await {
            if ping.reply.await.is_err() {
                return;
            }
            let rtt = ping.sent.elapsed();

            let mut stats = collector_stats.lock();
            stats.replies += 1;
            stats.replies_total += 1;
            stats.total_rtt += rtt;
            stats.max_rtt = stats.max_rtt.max(rtt);
            stats.min_rtt = Some(stats.min_rtt.map_or(rtt, |min| min.min(rtt)));
        }
    });

    let mut sent_total: u64 = 0;
    let mut window_sent: u64 = 0;
    let mut window_start = Instant::now();

    loop {
        let reply = ping.call(vec![Value::Null]).await?;
        if tx
            .send(Ping {
                reply,
                sent: Instant::now(),
            })
            .await
            .is_err()
        {
            break;
        }
        sent_total += 1;
        window_sent += 1;

        let elapsed = window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let (replies_total, min, avg, max) = {
                let mut stats = stats.lock();
                let avg = if stats.replies > 0 {
                    stats.total_rtt / stats.replies as u32
                } else {
                    Duration::ZERO
                };
                let summary = (
                    stats.replies_total,
                    stats.min_rtt.unwrap_or_default(),
                    avg,
                    stats.max_rtt,
                );
                stats.replies = 0;
                stats.min_rtt = None;
                stats.max_rtt = Duration::ZERO;
                stats.total_rtt = Duration::ZERO;
                summary
            };

            println!(
                "{} requests in {:.1} ms; {:.1} reqs/s; {} requests outstanding; rtt min/avg/max {:.1}/{:.1}/{:.1} ms",
                window_sent,
                elapsed.as_secs_f64() * 1000.0,
                window_sent as f64 / elapsed.as_secs_f64(),
                sent_total - replies_total,
                min.as_secs_f64() * 1000.0,
                avg.as_secs_f64() * 1000.0,
                max.as_secs_f64() * 1000.0,
            );

            window_sent = 0;
            window_start = Instant::now();
        }
    }

    Ok(())
}
