use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use slotguard::notify::NotifyHub;
use slotguard::{Engine, EngineError, Interval, Ms};
use ulid::Ulid;

const T0: Ms = 1_768_435_200_000; // 2026-01-15T00:00:00Z
const HOUR: Ms = 3_600_000; // 1 hour in ms

fn bench_dir() -> PathBuf {
    let dir = std::env::var("SLOTGUARD_BENCH_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
        .join(format!("slotguard_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    dir
}

fn open_engine(dir: &std::path::Path, name: &str) -> Arc<Engine> {
    let engine = Engine::new(dir.join(name), Arc::new(NotifyHub::new())).expect("open engine");
    Arc::new(engine)
}

fn slot(i: i64) -> Interval {
    let s = T0 + i * HOUR;
    Interval::new(s, s + HOUR).expect("valid slot")
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(dir: &std::path::Path) {
    let engine = open_engine(dir, "sequential.wal");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        engine
            .try_reserve("room-1", "alice", slot(i as i64))
            .await
            .expect("sequential slots never collide");
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} reservations in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_concurrent_resources(dir: &std::path::Path) {
    let engine = open_engine(dir, "concurrent.wal");
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let resource = format!("room-{t}");
            for j in 0..n_per_task {
                engine
                    .try_reserve(&resource, "alice", slot(j))
                    .await
                    .expect("own resource, disjoint slots");
            }
        }));
    }
    for h in handles {
        h.await.expect("writer task");
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} reservations = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

async fn phase3_contention(dir: &std::path::Path) {
    let engine = open_engine(dir, "contention.wal");
    let n_tasks = 50;
    let slots = 100;
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for t in 0..n_tasks {
        let engine = engine.clone();
        let wins = wins.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let owner = format!("user-{t}");
            let mut latencies = Vec::with_capacity(slots);
            for j in 0..slots {
                let t = Instant::now();
                match engine.try_reserve("hot-room", &owner, slot(j as i64)).await {
                    Ok(_) => wins.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict { .. }) => conflicts.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }
    let mut all_latencies = Vec::new();
    for h in handles {
        all_latencies.extend(h.await.expect("contender task"));
    }

    let elapsed = start.elapsed();
    let wins = wins.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks racing for {slots} slots: {wins} won, {} conflicted in {:.2}s",
        conflicts.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
    assert_eq!(wins, slots, "every slot has exactly one winner");
    print_latency("contended write latency", &mut all_latencies);
}

async fn phase4_read_under_load(dir: &std::path::Path) {
    let engine = open_engine(dir, "reads.wal");
    for i in 0..200 {
        engine
            .try_reserve("room-1", "seed", slot(i))
            .await
            .expect("prefill");
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let resource = format!("busy-{w}");
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine.try_reserve(&resource, "writer", slot(i % 8000)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for q in 0..reads_per_reader {
                let from = ((r * reads_per_reader + q) % 190) as i64;
                let window = Interval::new(T0 + from * HOUR, T0 + (from + 10) * HOUR)
                    .expect("valid window");
                let t = Instant::now();
                let _ = engine.find_overlapping("room-1", window, None).await;
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.expect("reader task"));
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("overlap query", &mut all_latencies);
}

async fn phase5_compaction(dir: &std::path::Path) {
    let engine = open_engine(dir, "compaction.wal");
    for i in 0..5000 {
        let r = engine
            .try_reserve("room-1", "churn", slot(i % 100))
            .await
            .expect("slot freed by previous cancel");
        engine.cancel(r.id, "churn").await.expect("cancel");
    }

    let t = Instant::now();
    let stats = engine.compact_wal(0).await.expect("compact");
    println!(
        "  compacted {} appends into {} record(s), pruned {} in {:.2}ms",
        10_000,
        stats.records,
        stats.pruned,
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    let dir = bench_dir();
    println!("=== slotguard stress benchmark ===");
    println!("journal dir: {}\n", dir.display());

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&dir).await;

    println!("\n[phase 2] concurrent writes, one resource per task");
    phase2_concurrent_resources(&dir).await;

    println!("\n[phase 3] contention on a single resource");
    phase3_contention(&dir).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&dir).await;

    println!("\n[phase 5] journal compaction");
    phase5_compaction(&dir).await;

    let _ = std::fs::remove_dir_all(&dir);
    println!("\n=== benchmark complete ===");
}
