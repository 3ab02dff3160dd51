// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Demonstration workloads driven by the CLI
//!
//! Each scenario runs real threads against a fresh `LockManager` and returns
//! a serializable report for the output formatter.

use metalock::{LockError, LockInfo, LockManager, LockManagerConfig, LockType, Locker, ResourceId};
use serde::Serialize;
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What happened to one thread's lock request
#[derive(Debug, Clone, Serialize)]
pub struct ThreadOutcome {
    pub thread: String,
    pub rid: ResourceId,
    pub lock_type: LockType,
    /// "granted" or the error class
    pub result: String,
    pub waited_ms: u64,
    pub detail: Option<String>,
}

impl ThreadOutcome {
    fn new(
        thread: &str,
        rid: ResourceId,
        lock_type: LockType,
        result: &Result<(), LockError>,
        waited: Duration,
    ) -> Self {
        let (result, detail) = match result {
            Ok(()) => ("granted".to_string(), None),
            Err(e) => (error_class(e).to_string(), Some(e.to_string())),
        };
        Self {
            thread: thread.to_string(),
            rid,
            lock_type,
            result,
            waited_ms: waited.as_millis() as u64,
            detail,
        }
    }
}

/// Report of the contention and deadlock scenarios
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub config: LockManagerConfig,
    /// In the order the requests finished
    pub outcomes: Vec<ThreadOutcome>,
    pub elapsed_ms: u64,
    /// Lock table contents after all threads finished
    pub remaining: Vec<LockInfo>,
}

/// Aggregated counters of the stress scenario
#[derive(Debug, Clone, Default, Serialize)]
pub struct StressReport {
    pub config: Option<LockManagerConfig>,
    pub threads: usize,
    pub requests: usize,
    pub granted: usize,
    pub timeouts: usize,
    pub deadlocks: usize,
    pub interrupts: usize,
    pub unsupported: usize,
    pub elapsed_ms: u64,
    pub requests_per_sec: f64,
    pub remaining: Vec<LockInfo>,
}

impl StressReport {
    fn record(&mut self, result: &Result<(), LockError>) {
        self.requests += 1;
        match result {
            Ok(()) => self.granted += 1,
            Err(LockError::Timeout { .. }) => self.timeouts += 1,
            Err(LockError::Deadlock(_)) => self.deadlocks += 1,
            Err(LockError::Interrupted { .. }) => self.interrupts += 1,
            Err(LockError::NotSupported(_)) | Err(LockError::NotLocked { .. }) => {
                self.unsupported += 1
            }
        }
    }

    fn merge(&mut self, other: StressReport) {
        self.requests += other.requests;
        self.granted += other.granted;
        self.timeouts += other.timeouts;
        self.deadlocks += other.deadlocks;
        self.interrupts += other.interrupts;
        self.unsupported += other.unsupported;
    }
}

fn error_class(err: &LockError) -> &'static str {
    match err {
        LockError::Timeout { .. } => "timeout",
        LockError::Deadlock(_) => "deadlock",
        LockError::Interrupted { .. } => "interrupted",
        LockError::NotSupported(_) => "not supported",
        LockError::NotLocked { .. } => "not locked",
    }
}

fn spawn_named<T, F>(name: String, f: F) -> std::io::Result<JoinHandle<T>>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new().name(name).spawn(f)
}

fn join_all<T>(handles: Vec<JoinHandle<T>>) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    handles
        .into_iter()
        .map(|h| h.join().map_err(|_| "scenario thread panicked".into()))
        .collect()
}

/// Threads request the same exclusive lock one after another and hold it for
/// `hold_ms`; outcomes are listed in grant order.
pub fn run_contention(
    config: LockManagerConfig,
    rid: ResourceId,
    threads: usize,
    hold_ms: u64,
) -> Result<ScenarioReport, Box<dyn std::error::Error>> {
    let manager = Arc::new(LockManager::new(config.clone()));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(threads);
    for i in 0..threads {
        let manager = Arc::clone(&manager);
        let outcomes = Arc::clone(&outcomes);
        handles.push(spawn_named(format!("contender-{}", i), move || {
            let locker = Arc::new(Locker::new());
            let requested = Instant::now();
            let result = manager.lock(rid, &locker, LockType::Write, 0);
            let waited = requested.elapsed();
            let name = locker.thread_name().to_string();
            if let Ok(mut outcomes) = outcomes.lock() {
                outcomes.push(ThreadOutcome::new(&name, rid, LockType::Write, &result, waited));
            }
            if result.is_ok() {
                thread::sleep(Duration::from_millis(hold_ms));
                let _ = manager.release(rid, &locker, LockType::Write);
            }
        })?);
        // stagger the starts so the arrival order is well defined
        thread::sleep(Duration::from_millis(5));
    }
    join_all(handles)?;

    let outcomes = outcomes.lock().map(|o| o.clone()).unwrap_or_default();
    Ok(ScenarioReport {
        scenario: "contention".to_string(),
        config,
        outcomes,
        elapsed_ms: start.elapsed().as_millis() as u64,
        remaining: manager.dump(),
    })
}

/// Two threads each lock one resource, then request the other's. With
/// resolution enabled one of them fails with a deadlock error and the other
/// completes.
pub fn run_deadlock(
    config: LockManagerConfig,
    hold_ms: u64,
    timeout_ms: u64,
) -> Result<ScenarioReport, Box<dyn std::error::Error>> {
    let manager = Arc::new(LockManager::new(config.clone()));
    let barrier = Arc::new(Barrier::new(2));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(2);
    for (own, wanted) in [(1, 2), (2, 1)] {
        let manager = Arc::clone(&manager);
        let barrier = Arc::clone(&barrier);
        handles.push(spawn_named(format!("session-{}", own), move || {
            let locker = Arc::new(Locker::new());
            let first = manager.lock(own, &locker, LockType::Write, 0);
            barrier.wait();
            if first.is_err() {
                return ThreadOutcome::new(locker.thread_name(), own, LockType::Write, &first, Duration::ZERO);
            }
            thread::sleep(Duration::from_millis(hold_ms));

            let requested = Instant::now();
            let result = manager.lock(wanted, &locker, LockType::Write, timeout_ms);
            let outcome = ThreadOutcome::new(
                locker.thread_name(),
                wanted,
                LockType::Write,
                &result,
                requested.elapsed(),
            );
            if result.is_ok() {
                let _ = manager.release(wanted, &locker, LockType::Write);
            }
            let _ = manager.release(own, &locker, LockType::Write);
            outcome
        })?);
    }
    let mut outcomes = join_all(handles)?;
    outcomes.sort_by_key(|o| o.waited_ms);

    Ok(ScenarioReport {
        scenario: "deadlock".to_string(),
        config,
        outcomes,
        elapsed_ms: start.elapsed().as_millis() as u64,
        remaining: manager.dump(),
    })
}

/// Random workload: every thread repeatedly locks one or two random
/// resources with random types, holds them briefly and releases them.
pub fn run_stress(
    config: LockManagerConfig,
    threads: usize,
    resources: i64,
    ops: usize,
    timeout_ms: u64,
    hold_us: u64,
) -> Result<StressReport, Box<dyn std::error::Error>> {
    let manager = Arc::new(LockManager::new(config.clone()));
    let resources = resources.max(1);
    let start = Instant::now();

    let mut handles = Vec::with_capacity(threads);
    for i in 0..threads {
        let manager = Arc::clone(&manager);
        handles.push(spawn_named(format!("stress-{}", i), move || {
            let locker = Arc::new(Locker::new());
            let mut report = StressReport::default();
            let mut held: Vec<(ResourceId, LockType)> = Vec::with_capacity(2);

            for _ in 0..ops {
                let wanted = 1 + fastrand::usize(0..2);
                for _ in 0..wanted {
                    let rid = fastrand::i64(0..resources);
                    let lock_type = LockType::ALL[fastrand::usize(0..LockType::ALL.len())];
                    let result = manager.lock(rid, &locker, lock_type, timeout_ms);
                    report.record(&result);
                    match result {
                        Ok(()) => held.push((rid, lock_type)),
                        Err(_) => break,
                    }
                }
                if hold_us > 0 {
                    thread::sleep(Duration::from_micros(hold_us));
                }
                for (rid, lock_type) in held.drain(..).rev() {
                    if let Err(e) = manager.release(rid, &locker, lock_type) {
                        log::error!("stress release failed: {}", e);
                    }
                }
            }
            report
        })?);
    }

    let mut total = StressReport::default();
    for report in join_all(handles)? {
        total.merge(report);
    }

    let elapsed = start.elapsed();
    total.config = Some(config);
    total.threads = threads;
    total.elapsed_ms = elapsed.as_millis() as u64;
    total.requests_per_sec = if elapsed.as_secs_f64() > 0.0 {
        total.requests as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    total.remaining = manager.dump();
    Ok(total)
}
