//! CLI demo: builds a scheduler from config, feeds synthetic traffic into a
//! handful of classes, drains it through [`QfqRl::dispatch_tick`], and prints
//! the resulting per-class byte counts (SPEC_FULL.md §4.10).
//!
//! Mirrors spec §8 scenario S1: N classes of varying weight, all backlogged
//! with same-length packets, to show long-run byte ratios track weight
//! ratios within about one packet.

use clap::Parser;

use qfq_core::class::ClassId;
use qfq_core::packet::Packet;
use qfq_qdisc::{ClassConfig, QdiscHost, QfqRl, SchedulerConfig};

#[derive(Parser, Debug)]
#[command(name = "qfqrl-demo", about = "Synthetic-traffic demo for the QFQ-RL scheduler core")]
struct Args {
    /// Comma-separated class weights, e.g. "1,2,1" (spec §8 scenario S1).
    #[arg(long, value_delimiter = ',', default_value = "1,2,1")]
    weights: Vec<u32>,

    /// Packet length charged to every class (bytes).
    #[arg(long, default_value_t = 1500)]
    packet_len: u32,

    /// Number of packets enqueued per class before draining.
    #[arg(long, default_value_t = 1000)]
    packets_per_class: u32,

    /// Link speed in Mbps (spec §6 `LINK_SPEED`, default 9800).
    #[arg(long, default_value_t = 9800)]
    link_speed_mbps: u64,

    /// Simulated nanoseconds advanced between dispatcher ticks.
    #[arg(long, default_value_t = 1_000)]
    tick_ns: u64,
}

fn main() {
    env_logger_init();
    let args = Args::parse();

    let config = SchedulerConfig {
        link_speed_mbps: args.link_speed_mbps,
        ..SchedulerConfig::default()
    };

    let mut host = QfqRl::new(config, |_class: ClassId, _pkt: Packet| {}, 0)
        .expect("default scheduler config always validates");

    let class_ids: Vec<ClassId> = (0..args.weights.len() as u32).map(ClassId::new).collect();
    for (&weight, &id) in args.weights.iter().zip(class_ids.iter()) {
        host.create_class(
            id,
            ClassConfig {
                weight,
                lmax: args.packet_len.clamp(1, qfq_core::fixed::LMAX),
            },
        )
        .expect("CLI-provided weight/lmax should validate — pass a smaller weight/lmax otherwise");
        host.bind_priority(id.get() as u8, id)
            .expect("class was just created above");
    }

    for &id in &class_ids {
        for _ in 0..args.packets_per_class {
            host.enqueue(Packet::new(args.packet_len, id.get() as u8))
                .expect("synthetic traffic should never be classify-dropped");
        }
    }

    let mut now_ns = 0u64;
    let mut ticks_without_work = 0u32;
    while ticks_without_work < 64 {
        now_ns += args.tick_ns;
        if host.dispatch_tick(now_ns) {
            ticks_without_work = 0;
        } else {
            ticks_without_work += 1;
        }
    }

    println!("qfqrl-demo: drained {} class(es)", class_ids.len());
    for (&weight, &id) in args.weights.iter().zip(class_ids.iter()) {
        let stats = host.dump_class(id).unwrap_or_default();
        println!(
            "  class {:>2} weight={:<4} packets={:<6} bytes={:<9} rate={:.0} B/s",
            id.get(),
            weight,
            stats.packets,
            stats.bytes,
            stats.rate_bps
        );
    }
    let sched_stats = host.dump_scheduler();
    println!(
        "scheduler: wsum={} wsum_active={} total_bytes={} v={:#x}",
        sched_stats.wsum,
        sched_stats.wsum_active,
        sched_stats.total_bytes,
        host.v().raw()
    );
}

fn env_logger_init() {
    let _ = env_logger::try_init();
}
