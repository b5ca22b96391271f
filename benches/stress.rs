use std::sync::Arc;
use std::time::{Duration, Instant};

use ulid::Ulid;

use fitclub_sched::directory::StaticDirectory;
use fitclub_sched::model::{ResourceRef, Span};
use fitclub_sched::{EngineError, Scheduler};

const HOUR: i64 = 3_600_000; // 1 hour in ms
/// 2026-01-01T00:00:00Z
const BASE: i64 = 1_767_225_600_000;

const MEMBERS: u64 = 2000;
const TRAINERS: u64 = 50;
const ROOMS: u64 = 50;

fn directory() -> Arc<StaticDirectory> {
    let dir = StaticDirectory::new();
    for id in 1..=MEMBERS {
        dir.add_member(id);
    }
    for id in 1..=TRAINERS {
        dir.add_trainer(id);
    }
    for id in 1..=ROOMS {
        dir.add_room(id);
    }
    Arc::new(dir)
}

/// Fresh scheduler on its own WAL so phases don't interfere.
fn open(phase: &str) -> Arc<Scheduler> {
    let dir = std::env::var("FITCLUB_BENCH_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("fitclub_bench"));
    std::fs::create_dir_all(&dir).expect("create bench dir");
    let path = dir.join(format!("{phase}_{}.wal", Ulid::new()));
    Arc::new(Scheduler::open(path, directory()).expect("open scheduler"))
}

fn hour_slot(i: i64) -> Span {
    Span::new(BASE + i * HOUR, BASE + (i + 1) * HOUR)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
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
        latencies.last().map_or(0.0, |d| d.as_secs_f64() * 1000.0),
    );
}

async fn phase1_sequential() {
    let s = open("sequential");
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        s.book_pt_session(1 + (i as u64 % MEMBERS), 1, 1, hour_slot(i as i64))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} bookings in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
    s.shutdown().await.unwrap();
}

/// Disjoint trainer/room pairs: no lock contention, only WAL group commit.
async fn phase2_concurrent_disjoint() {
    let s = open("disjoint");
    let n_tasks = 20u64;
    let n_per_task = 200i64;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let s = s.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                s.book_pt_session(1 + task, 1 + task, 1 + task, hour_slot(j))
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks as i64 * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} bookings = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
    s.shutdown().await.unwrap();
}

/// Every task fights over two trainers and two rooms for the same slots.
async fn phase3_contended() {
    let s = open("contended");
    let n_tasks = 64u64;
    let n_slots = 50i64;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let s = s.clone();
        handles.push(tokio::spawn(async move {
            let (mut won, mut lost) = (0u32, 0u32);
            for slot in 0..n_slots {
                let trainer = 1 + (task + slot as u64) % 2;
                let room = 1 + task % 2;
                match s
                    .book_pt_session(1 + task, trainer, room, hour_slot(slot))
                    .await
                {
                    Ok(_) => won += 1,
                    Err(e) if e.is_conflict() => lost += 1,
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            (won, lost)
        }));
    }

    let (mut won, mut lost) = (0, 0);
    for h in handles {
        let (w, l) = h.await.unwrap();
        won += w;
        lost += l;
    }
    let elapsed = start.elapsed();
    println!(
        "  {} attempts in {:.2}s: {won} committed, {lost} conflicts",
        n_tasks as i64 * n_slots,
        elapsed.as_secs_f64()
    );
    // At most one winner per (room, slot), and rooms bound it.
    assert!(won as i64 <= 2 * n_slots, "double booking detected");
    s.shutdown().await.unwrap();
}

async fn phase4_read_under_load() {
    let s = open("read_under_load");
    for i in 0..500 {
        s.book_pt_session(1, 1, 1, hour_slot(2 * i)).await.unwrap();
    }

    let writer = {
        let s = s.clone();
        tokio::spawn(async move {
            for i in 0..2000 {
                s.book_pt_session(2, 2, 2, hour_slot(i)).await.unwrap();
            }
        })
    };

    let mut latencies = Vec::with_capacity(2000);
    let window = Span::new(BASE, BASE + 1000 * HOUR);
    for _ in 0..2000 {
        let t = Instant::now();
        let entries = s.query(ResourceRef::trainer(1), window).await.unwrap();
        latencies.push(t.elapsed());
        assert_eq!(entries.len(), 500);
    }
    writer.await.unwrap();

    print_latency("query latency", &mut latencies);
    s.shutdown().await.unwrap();
}

async fn phase5_enrollment_storm() {
    let s = open("enrollment_storm");
    let capacity = 25u32;
    let class = s
        .create_group_class("Storm", 1, 1, hour_slot(0), capacity)
        .await
        .unwrap();

    let start = Instant::now();
    let handles: Vec<_> = (1..=MEMBERS)
        .map(|member| {
            let s = s.clone();
            tokio::spawn(async move { s.enroll(class, member).await })
        })
        .collect();

    let mut admitted = 0;
    let mut full = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(()) => admitted += 1,
            Err(EngineError::ClassFull { .. }) => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    let elapsed = start.elapsed();
    println!(
        "  {MEMBERS} members for {capacity} seats in {:.2}s: {admitted} admitted, {full} turned away",
        elapsed.as_secs_f64()
    );
    assert_eq!(admitted, capacity);
    s.shutdown().await.unwrap();
}

#[tokio::main]
async fn main() {
    println!("=== fitclub scheduler stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent bookings on disjoint resources");
    phase2_concurrent_disjoint().await;

    println!("\n[phase 3] contended bookings");
    phase3_contended().await;

    println!("\n[phase 4] query latency under write load");
    phase4_read_under_load().await;

    println!("\n[phase 5] enrollment storm");
    phase5_enrollment_storm().await;

    println!("\n=== benchmark complete ===");
}
