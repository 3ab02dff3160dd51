// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock requester identity and its suspend/resume primitive
//!
//! A `Locker` stands for one concurrent requester (a session or a worker
//! thread). It is created by the caller, shared with the manager as
//! `Arc<Locker>`, and reused across any number of lock/release cycles.
//!
//! Two independent guards live here:
//! - `state`: the wait state read by the deadlock detector. It is a leaf
//!   lock; nothing else is acquired while it is held.
//! - `monitor`: used only to block and wake the thread that owns the locker.
//!   A thread holding its own monitor may take shard guards, never another
//!   locker's monitor.

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::lock_type::LockType;
use super::ResourceId;

static NEXT_LOCKER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique, monotonically assigned locker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockerId(u64);

impl LockerId {
    fn next() -> Self {
        LockerId(NEXT_LOCKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the underlying ID value
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LockerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "locker_{}", self.0)
    }
}

/// Lifecycle of a locker's most recent lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockerState {
    /// No request made yet
    Idle,
    /// Queued as a waiter on a resource
    Waiting {
        rid: ResourceId,
        lock_type: LockType,
    },
    /// Last request was granted
    Granted,
    /// Last request failed (timeout, deadlock or interrupt)
    Aborted,
}

/// Pending wakeup, consumed by the next park
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    pending: bool,
}

pub(crate) type MonitorGuard<'a> = MutexGuard<'a, WakeSignal>;

/// Returned by [`Locker::park`] when the locker was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interrupted;

/// Identity and wait context of one lock requester
pub struct Locker {
    id: LockerId,
    thread_name: String,
    thread_id: String,
    query_id: Mutex<Option<Uuid>>,
    lock_request_time: Mutex<Option<Instant>>,
    state: Mutex<LockerState>,
    monitor: Mutex<WakeSignal>,
    wakeup: Condvar,
    interrupted: AtomicBool,
}

impl Locker {
    /// Create a locker bound, for diagnostics, to the current thread
    pub fn new() -> Self {
        let thread = std::thread::current();
        Self {
            id: LockerId::next(),
            thread_name: thread.name().unwrap_or("unnamed").to_string(),
            thread_id: format!("{:?}", thread.id()),
            query_id: Mutex::new(None),
            lock_request_time: Mutex::new(None),
            state: Mutex::new(LockerState::Idle),
            monitor: Mutex::new(WakeSignal::default()),
            wakeup: Condvar::new(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Create a locker tagged with the query it runs for
    pub fn with_query_id(query_id: Uuid) -> Self {
        let locker = Self::new();
        *locker.query_id.lock() = Some(query_id);
        locker
    }

    pub fn id(&self) -> LockerId {
        self.id
    }

    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn query_id(&self) -> Option<Uuid> {
        *self.query_id.lock()
    }

    pub fn set_query_id(&self, query_id: Option<Uuid>) {
        *self.query_id.lock() = query_id;
    }

    /// Start of the most recent `lock` call
    pub fn lock_request_time(&self) -> Option<Instant> {
        *self.lock_request_time.lock()
    }

    pub(crate) fn set_lock_request_time(&self, at: Instant) {
        *self.lock_request_time.lock() = Some(at);
    }

    pub fn state(&self) -> LockerState {
        *self.state.lock()
    }

    /// Resource and type this locker is currently blocked on
    pub fn waiting_for(&self) -> Option<(ResourceId, LockType)> {
        match *self.state.lock() {
            LockerState::Waiting { rid, lock_type } => Some((rid, lock_type)),
            _ => None,
        }
    }

    pub(crate) fn begin_wait(&self, rid: ResourceId, lock_type: LockType) {
        *self.state.lock() = LockerState::Waiting { rid, lock_type };
    }

    pub(crate) fn mark_granted(&self) {
        *self.state.lock() = LockerState::Granted;
    }

    pub(crate) fn mark_aborted(&self) {
        *self.state.lock() = LockerState::Aborted;
    }

    /// Cancel the current (or next) blocking wait of this locker.
    ///
    /// The interrupted `lock` call withdraws its request and returns
    /// [`LockError::Interrupted`](super::LockError::Interrupted).
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.wake();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn monitor(&self) -> MonitorGuard<'_> {
        self.monitor.lock()
    }

    /// Drop a wakeup left over from an earlier request. Called with the
    /// monitor held right after a request was queued, so no wakeup meant for
    /// the new request can be lost.
    pub(crate) fn discard_wakeup(&self, guard: &mut MonitorGuard<'_>) {
        guard.pending = false;
    }

    /// Block the owning thread until woken, interrupted, or `timeout` elapses
    /// (`None` waits indefinitely). Callers must re-check ownership afterwards:
    /// returning `Ok` says nothing about why the thread woke up.
    pub(crate) fn park(
        &self,
        guard: &mut MonitorGuard<'_>,
        timeout: Option<Duration>,
    ) -> Result<(), Interrupted> {
        if self.take_interrupt() {
            return Err(Interrupted);
        }
        if !guard.pending {
            match timeout {
                Some(timeout) => {
                    self.wakeup.wait_for(guard, timeout);
                }
                None => self.wakeup.wait(guard),
            }
        }
        guard.pending = false;
        if self.take_interrupt() {
            return Err(Interrupted);
        }
        Ok(())
    }

    /// Wake the thread parked on this locker. Must not be called while the
    /// caller holds its own locker's monitor.
    pub(crate) fn wake(&self) {
        let mut guard = self.monitor.lock();
        guard.pending = true;
        self.wakeup.notify_all();
    }
}

impl Default for Locker {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Locker {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Locker {}

impl std::hash::Hash for Locker {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("id", &self.id)
            .field("thread_name", &self.thread_name)
            .field("state", &self.state())
            .finish()
    }
}

impl std::fmt::Display for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.id, self.thread_name)
    }
}
