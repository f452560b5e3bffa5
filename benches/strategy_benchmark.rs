//! Strategy Benchmark
//!
//! Compares connection resolvers and RTT matchers on synthetic traffic.
//! Packets are generated here, all processing happens in src/.

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use clap::Parser;

use connscope::analysis::{build_matcher, RttAccumulator};
use connscope::config::{ResolverKind, RttMatcherKind};
use connscope::core::flow::Connection;
use connscope::core::packet::{Endpoint, Packet, TcpFlags};
use connscope::flow::FlowTracker;

#[derive(Parser, Debug)]
#[command(name = "strategy_benchmark")]
#[command(about = "Compare connection resolvers and RTT matchers")]
struct Args {
    /// Number of concurrent connections
    #[arg(short, long, default_value = "2000")]
    connections: usize,

    /// Packets per connection
    #[arg(short, long, default_value = "40")]
    packets: usize,

    /// Measured iterations per strategy
    #[arg(short, long, default_value = "3")]
    iterations: usize,

    // cargo bench passes --bench to every target
    #[arg(long, hide = true)]
    bench: bool,
}

struct BenchResult {
    name: String,
    operations: u64,
    best: Duration,
}

impl BenchResult {
    fn ops_per_second(&self) -> f64 {
        self.operations as f64 / self.best.as_secs_f64().max(1e-9)
    }
}

/// Interleaved request/response exchanges, connection `i` on port 10000+i
fn synth_packets(connections: usize, per_connection: usize) -> Vec<Packet> {
    let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    let server = Endpoint::new(Ipv4Addr::new(192, 168, 0, 1), 443);
    let mut packets = Vec::with_capacity(connections * per_connection);

    for round in 0..per_connection {
        for i in 0..connections {
            let client = Endpoint::new(Ipv4Addr::new(10, (i >> 8) as u8, i as u8, 2), 10000 + (i % 50000) as u16);
            let ts = base + TimeDelta::microseconds((round * connections + i) as i64);
            let outbound = round % 2 == 0;
            let (src, dst) = if outbound { (client, server) } else { (server, client) };

            let mut pkt = Packet::new(ts, src, dst);
            let step = (round / 2) as u32 * 100;
            if outbound {
                pkt.seq = 1000 + step;
                pkt.ack = 5000 + step;
            } else {
                pkt.seq = 5000 + step + 100;
                pkt.ack = 1000 + step;
            }
            pkt.datalen = 100;
            pkt.window = 8192;
            pkt.flags = TcpFlags {
                syn: round < 2,
                fin: round + 2 >= per_connection,
                ack: round > 0,
                ..Default::default()
            };
            packets.push(pkt);
        }
    }
    packets
}

fn bench_resolver(kind: ResolverKind, packets: &[Packet], iterations: usize) -> (BenchResult, Vec<Connection>) {
    let mut best = Duration::MAX;
    let mut connections = Vec::new();

    for _ in 0..iterations.max(1) {
        let mut tracker = FlowTracker::with_resolver(kind);
        let start = Instant::now();
        for pkt in packets {
            if let Err(e) = tracker.process(pkt.clone()) {
                eprintln!("tracker error: {}", e);
                break;
            }
        }
        best = best.min(start.elapsed());
        connections = tracker.into_connections();
    }

    let result = BenchResult {
        name: format!("resolver/{:?}", kind),
        operations: packets.len() as u64,
        best,
    };
    (result, connections)
}

fn bench_matcher(kind: RttMatcherKind, connections: &[Connection], iterations: usize) -> (BenchResult, RttAccumulator) {
    let matcher = build_matcher(kind);
    let mut best = Duration::MAX;
    let mut acc = RttAccumulator::new();

    for _ in 0..iterations.max(1) {
        acc = RttAccumulator::new();
        let start = Instant::now();
        for con in connections {
            acc.accumulate(con, matcher.as_ref());
        }
        best = best.min(start.elapsed());
    }

    let result = BenchResult {
        name: format!("rtt/{}", matcher.name()),
        operations: connections.iter().map(|c| c.packet_count() as u64).sum(),
        best,
    };
    (result, acc)
}

fn print_results(results: &[BenchResult]) {
    println!("\n{:24} │ {:>10} │ {:>12} │ {:>14}", "Strategy", "Packets", "Best", "Packets/sec");
    println!("{}", "─".repeat(70));
    for r in results {
        println!(
            "{:24} │ {:>10} │ {:>10.2}ms │ {:>14.0}",
            r.name,
            r.operations,
            r.best.as_secs_f64() * 1000.0,
            r.ops_per_second()
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("Strategy Benchmark");
    println!("==================");
    println!(
        "{} connections x {} packets, {} iterations",
        args.connections, args.packets, args.iterations
    );

    let packets = synth_packets(args.connections, args.packets);
    let mut results = Vec::new();

    let (linear, linear_cons) = bench_resolver(ResolverKind::Linear, &packets, args.iterations);
    let (hashed, hashed_cons) = bench_resolver(ResolverKind::Hashed, &packets, args.iterations);
    anyhow::ensure!(
        linear_cons.len() == hashed_cons.len(),
        "resolvers disagree: {} vs {} connections",
        linear_cons.len(),
        hashed_cons.len()
    );
    results.push(linear);
    results.push(hashed);

    let (nested, nested_acc) = bench_matcher(RttMatcherKind::NestedScan, &hashed_cons, args.iterations);
    let (indexed, indexed_acc) = bench_matcher(RttMatcherKind::SeqIndex, &hashed_cons, args.iterations);
    anyhow::ensure!(nested_acc == indexed_acc, "RTT matchers disagree");
    results.push(nested);
    results.push(indexed);

    print_results(&results);
    println!("\nConnections: {}, RTT samples: {}", hashed_cons.len(), indexed_acc.samples);
    Ok(())
}
