use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, NaiveTime};
use ulid::Ulid;

use classd::engine::Engine;
use classd::model::{Resource, ScheduleRequest};
use classd::store::MemoryStore;

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

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// The `i`th one-hour slot, 24 per day starting from `base_date`.
fn hourly_slot(i: u64) -> (NaiveDate, NaiveTime, NaiveTime) {
    let date = base_date() + Days::new(i / 24);
    let hour = (i % 24) as u32;
    let start = NaiveTime::from_hms_opt(hour, 0, 0).unwrap();
    let end = NaiveTime::from_hms_opt(hour, 59, 0).unwrap();
    (date, start, end)
}

fn open_engine(label: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("classd_bench_{label}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(MemoryStore::open(&dir.join("classd.wal")).unwrap());
    Arc::new(Engine::with_store(store))
}

async fn add_resource(engine: &Engine, owner: &str) -> Ulid {
    let id = Ulid::new();
    engine
        .register_resource(Resource {
            id,
            owner: owner.to_string(),
            active: true,
            name: None,
        })
        .await
        .unwrap();
    id
}

async fn phase1_sequential() {
    let engine = open_engine("sequential");
    let rid = add_resource(&engine, "owner-seq").await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n as usize);
    let start = Instant::now();

    for i in 0..n {
        let (date, s, e) = hourly_slot(i);
        let t = Instant::now();
        engine
            .create_schedule(ScheduleRequest {
                resource_id: rid,
                date,
                start: s,
                end: e,
            })
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} schedules in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

async fn phase2_parallel_owners() {
    let engine = open_engine("parallel");
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();

    for t in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let rid = add_resource(&engine, &format!("owner-{t}")).await;
            for i in 0..n_per_task {
                let (date, s, e) = hourly_slot(i);
                engine
                    .create_schedule(ScheduleRequest {
                        resource_id: rid,
                        date,
                        start: s,
                        end: e,
                    })
                    .await
                    .unwrap();
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} owners x {n_per_task} schedules = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Many resources of one owner racing for the same slots.
async fn phase3_contention() {
    let engine = open_engine("contention");
    let n_tasks = 20;
    let n_slots = 100;

    let mut resources = Vec::new();
    for _ in 0..n_tasks {
        resources.push(add_resource(&engine, "owner-busy").await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for rid in resources {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut won = 0u64;
            for i in 0..n_slots {
                let (date, s, e) = hourly_slot(i);
                let request = ScheduleRequest {
                    resource_id: rid,
                    date,
                    start: s,
                    end: e,
                };
                if engine.create_schedule(request).await.is_ok() {
                    won += 1;
                }
            }
            won
        }));
    }

    let mut won = 0;
    for h in handles {
        won += h.await.unwrap();
    }
    println!(
        "  {n_tasks} resources racing for {n_slots} slots: {won} booked in {:.2}s ({})",
        start.elapsed().as_secs_f64(),
        if won == n_slots { "no double bookings" } else { "MISMATCH" }
    );
}

async fn phase4_read_under_load() {
    let engine = open_engine("reads");
    let rid = add_resource(&engine, "owner-read").await;
    for i in 0..20 {
        let (date, s, e) = hourly_slot(i);
        engine
            .create_schedule(ScheduleRequest {
                resource_id: rid,
                date,
                start: s,
                end: e,
            })
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let wrid = add_resource(&engine, &format!("writer-{w}")).await;
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) && i < 10_000 {
                let (date, s, e) = hourly_slot(i);
                let _ = engine
                    .create_schedule(ScheduleRequest {
                        resource_id: wrid,
                        date,
                        start: s,
                        end: e,
                    })
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for _ in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.list_schedules("owner-read", base_date()).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("owner-day listing", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== classd stress benchmark ===\n");

    println!("[phase 1] sequential create throughput");
    phase1_sequential().await;

    println!("\n[phase 2] parallel owners");
    phase2_parallel_owners().await;

    println!("\n[phase 3] same-owner contention");
    phase3_contention().await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load().await;

    println!("\ndone.");
}
