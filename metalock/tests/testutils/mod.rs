//! Test utilities for Metalock integration tests
//!
//! Shared helpers for spawning named locker threads and polling the lock
//! table until a condition holds.

#![allow(dead_code)]

use metalock::{LockManager, LockManagerConfig, LockType, Locker, ResourceId};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Manager with a short slow-lock threshold so deadlocks resolve quickly
pub fn test_manager() -> Arc<LockManager> {
    init_logging();
    Arc::new(LockManager::new(LockManagerConfig::for_testing()))
}

pub fn manager_with(config: LockManagerConfig) -> Arc<LockManager> {
    init_logging();
    Arc::new(LockManager::new(config))
}

/// Run `f` on a named thread with its own locker
pub fn spawn_locker<T, F>(name: &str, f: F) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<Locker>) -> T + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let locker = Arc::new(Locker::new());
            f(locker)
        })
        .expect("Failed to spawn locker thread")
}

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

pub fn waiter_count(manager: &LockManager, rid: ResourceId) -> usize {
    manager
        .lock_info(rid)
        .map(|info| info.waiters.len())
        .unwrap_or(0)
}

pub fn owner_types(manager: &LockManager, rid: ResourceId) -> Vec<LockType> {
    manager
        .lock_info(rid)
        .map(|info| info.owners.iter().map(|o| o.lock_type).collect())
        .unwrap_or_default()
}
