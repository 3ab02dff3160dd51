/// Benchmark for lock/release throughput with a partitioned lock table
///
/// Measures uncontended lock/release pairs on a single thread, then the same
/// workload spread over several threads with one and with many shards.

use metalock::{LockManager, LockManagerConfig, LockType, Locker};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const OPS: usize = 100_000;
const THREADS: usize = 8;

fn run_threads(manager: Arc<LockManager>, resources: i64) -> Duration {
    let start = Instant::now();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let locker = Arc::new(Locker::new());
                for _ in 0..OPS / THREADS {
                    let rid = fastrand::i64(0..resources);
                    let lock_type = if fastrand::u8(0..10) == 0 {
                        LockType::Write
                    } else {
                        LockType::Read
                    };
                    if manager.lock(rid, &locker, lock_type, 0).is_ok() {
                        let _ = manager.release(rid, &locker, lock_type);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("benchmark thread panicked");
    }
    start.elapsed()
}

fn main() {
    println!("=== Lock Throughput Benchmark ===\n");

    // Benchmark: single thread, no contention
    println!("📊 Uncontended Lock/Release:");
    let manager = LockManager::new(LockManagerConfig::default());
    let locker = Arc::new(Locker::new());
    let start = Instant::now();
    for i in 0..OPS {
        let rid = (i % 1024) as i64;
        manager
            .lock(rid, &locker, LockType::Write, 0)
            .expect("uncontended lock failed");
        manager
            .release(rid, &locker, LockType::Write)
            .expect("release failed");
    }
    let uncontended = start.elapsed();
    let uncontended_ops = OPS as f64 / uncontended.as_secs_f64();
    println!("  Pairs: {}", OPS);
    println!("  Time: {:?}", uncontended);
    println!("  Throughput: {:.0} pairs/sec", uncontended_ops);
    println!();

    // Benchmark: reentrant grants on one resource
    println!("📊 Reentrant Grants:");
    let start = Instant::now();
    for _ in 0..OPS {
        manager
            .lock(7, &locker, LockType::Read, 0)
            .expect("reentrant lock failed");
    }
    for _ in 0..OPS {
        manager
            .release(7, &locker, LockType::Read)
            .expect("release failed");
    }
    let reentrant = start.elapsed();
    let reentrant_ops = OPS as f64 / reentrant.as_secs_f64();
    println!("  Time: {:?}", reentrant);
    println!("  Throughput: {:.0} grants/sec", reentrant_ops);
    println!();

    // Benchmark: shard count under concurrent load
    println!("📊 Concurrent Mixed Read/Write ({} threads):", THREADS);
    let mut results = Vec::new();
    for shards in [1, 32] {
        let config = LockManagerConfig::default()
            .with_lock_table_num(shards)
            .with_slow_lock_threshold_ms(50);
        let elapsed = run_threads(Arc::new(LockManager::new(config)), 4096);
        let ops_per_sec = OPS as f64 / elapsed.as_secs_f64();
        println!("  {:>2} shards: {:?} ({:.0} ops/sec)", shards, elapsed, ops_per_sec);
        results.push((shards, ops_per_sec));
    }
    println!();

    // Summary
    println!("=== Summary ===");
    println!("  Uncontended:  {:.0} pairs/sec", uncontended_ops);
    println!("  Reentrant:    {:.0} grants/sec", reentrant_ops);
    for (shards, ops_per_sec) in results {
        println!("  {:>2} shards:    {:.0} ops/sec", shards, ops_per_sec);
    }
}
