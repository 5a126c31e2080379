use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use ulid::Ulid;

use innkeep::engine::{Engine, EngineError};
use innkeep::model::{DAY_MS, NewBooking, NewUser, Role, RoomSpec, TaxRates};
use innkeep::notify::Outbox;

/// 2030-01-01T00:00:00Z
const BASE: i64 = 1_893_456_000_000;

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
    let avg = total / latencies.len().max(1) as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().copied().unwrap_or_default().as_secs_f64() * 1000.0,
    );
}

fn spec(slots: u32) -> RoomSpec {
    RoomSpec {
        name: format!("Bench {slots}"),
        price_per_night: Decimal::from(120),
        discounted_price: Decimal::ZERO,
        max_occupancy: 4,
        taxes: TaxRates {
            vat: Decimal::from(8),
            ..TaxRates::default()
        },
        total_slots: slots,
    }
}

async fn guest(engine: &Engine, n: usize) -> Ulid {
    engine
        .register_user(NewUser {
            name: format!("guest {n}"),
            email: format!("guest{n}@bench.local"),
            role: Role::Standard,
        })
        .await
        .unwrap()
        .id
}

fn night(room_id: Ulid, user_id: Ulid, day: i64) -> NewBooking {
    NewBooking {
        user_id,
        room_id,
        check_in: BASE + day * DAY_MS,
        check_out: BASE + (day + 1) * DAY_MS,
        guests: 1,
        room_count: 1,
    }
}

fn fresh_engine(label: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join(format!("innkeep_bench_{label}_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let (outbox, mut rx) = Outbox::new();
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    Arc::new(Engine::new(dir.join("innkeep.wal"), outbox).unwrap())
}

async fn phase1_sequential() {
    let engine = fresh_engine("seq");
    let room = engine.create_room(spec(4000)).await.unwrap().id;
    let user = guest(&engine, 0).await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for day in 0..n as i64 {
        let t = Instant::now();
        engine.create_booking(night(room, user, day % 365)).await.ok();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} booking attempts in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many guests race for the same nights on a small room; the engine must
/// hand out exactly one booking per night.
async fn phase2_contention() {
    let engine = fresh_engine("race");
    let room = engine.create_room(spec(64)).await.unwrap().id;
    let n_tasks = 32;
    let nights = 30;

    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();
    for i in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            let user = guest(&engine, i).await;
            for day in 0..nights {
                match engine.create_booking(night(room, user, day)).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let won = won.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} guests x {nights} nights: {won} booked, {} conflicts in {:.2}s",
        lost.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
    assert_eq!(won, nights as usize, "each night must be sold exactly once");
}

async fn phase3_read_under_load() {
    let engine = fresh_engine("read");
    let mut rooms = Vec::new();
    for slots in [500, 1000, 5000, 10000] {
        rooms.push(engine.create_room(spec(slots)).await.unwrap().id);
    }
    let user = guest(&engine, 0).await;
    for (i, room) in rooms.iter().enumerate() {
        for day in 0..50 {
            engine.create_booking(night(*room, user, day * 2 + i as i64)).await.ok();
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..4 {
        let engine = engine.clone();
        let stop = stop.clone();
        let room = rooms[w % rooms.len()];
        writers.push(tokio::spawn(async move {
            let user = guest(&engine, 100 + w).await;
            let mut day = 1_000 * (w as i64 + 1);
            while !stop.load(Ordering::Relaxed) {
                engine.create_booking(night(room, user, day)).await.ok();
                day += 1;
            }
        }));
    }

    let n_readers = 8;
    let reads_per_reader = 500;
    let mut readers = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        let room = rooms[r % rooms.len()];
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for _ in 0..reads_per_reader {
                let t = Instant::now();
                engine.get_room(room).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("room read", &mut all);
}

#[tokio::main]
async fn main() {
    println!("=== innkeep stress benchmark ===\n");

    println!("[phase 1] sequential booking throughput");
    phase1_sequential().await;

    println!("\n[phase 2] contention on one room");
    phase2_contention().await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load().await;

    println!("\ndone");
}
