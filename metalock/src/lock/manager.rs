// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock manager implementation
//!
//! `lock` first tries an immediate grant under the resource's shard guard.
//! On conflict the requester is queued and blocks on its own locker monitor,
//! never on a shard guard:
//!
//! 1. Slow-lock delay: sleep up to `slow_lock_threshold_ms`. Most conflicts
//!    resolve here without paying for deadlock detection. When the delay runs
//!    out, a trace of the resource's owners and waiters is logged.
//! 2. Deadlock-aware wait: re-check ownership, run the detector, and sleep
//!    until woken or the timeout expires, repeatedly. When the detector
//!    picks another locker as victim, that locker is woken until it aborts
//!    or the cycle changes.
//!
//! Lock order: own monitor, then shard guard, then any locker's wait state.
//! Lockers promoted while this thread holds its monitor are woken only after
//! `lock` returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::LockManagerConfig;
use super::deadlock::DeadlockChecker;
use super::error::{DeadlockReport, LockError};
use super::info::{slow_lock_trace, LockInfo};
use super::lock_type::LockType;
use super::locker::{Locker, MonitorGuard};
use super::resource_lock::LockGrant;
use super::table::LockTable;
use super::ResourceId;

const MIN_PARK: Duration = Duration::from_millis(1);

/// Timeout bookkeeping for one `lock` call; no timeout means wait forever
struct Deadline {
    start: Instant,
    timeout: Option<Duration>,
}

impl Deadline {
    fn new(start: Instant, timeout_ms: u64) -> Self {
        Self {
            start,
            timeout: (timeout_ms != 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.timeout
            .map(|timeout| timeout.saturating_sub(self.start.elapsed()))
    }

    fn expired(&self) -> bool {
        self.remaining().is_some_and(|remaining| remaining.is_zero())
    }
}

enum WaitOutcome {
    Owner,
    Victim(Arc<Locker>),
}

enum DeadlockCheck {
    Clear,
    Owner,
    Victim(Arc<Locker>),
}

/// Partitioned lock manager shared by all sessions
pub struct LockManager {
    config: LockManagerConfig,
    table: LockTable,
}

impl LockManager {
    pub fn new(config: LockManagerConfig) -> Self {
        let table = LockTable::new(config.shard_count());
        Self { config, table }
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.table.shard_count()
    }

    /// Acquire `lock_type` on `rid` for `locker`, blocking while it conflicts
    /// with other owners.
    ///
    /// # Arguments
    /// * `timeout_ms` - give up after this many milliseconds; 0 waits indefinitely
    ///
    /// # Errors
    /// * `Timeout` - not granted in time
    /// * `Deadlock` - this locker had to abort to break a wait cycle
    /// * `Interrupted` - [`Locker::interrupt`] was called while waiting
    /// * `NotSupported` - READ/WRITE requested inside an intention lock scope
    ///
    /// A failed call leaves no waiter entry and no new grant behind.
    pub fn lock(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        timeout_ms: u64,
    ) -> Result<(), LockError> {
        let mut wakeups = Vec::new();
        let result = self.acquire(rid, locker, lock_type, timeout_ms, &mut wakeups);
        match &result {
            Ok(()) => locker.mark_granted(),
            Err(_) => locker.mark_aborted(),
        }
        Self::wake_all(wakeups);
        result
    }

    fn acquire(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        timeout_ms: u64,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> Result<(), LockError> {
        let start = Instant::now();
        locker.set_lock_request_time(start);
        let deadline = Deadline::new(start, timeout_ms);

        {
            let mut monitor = locker.monitor();
            match self
                .table
                .try_lock(rid, locker, lock_type, self.capture_stack())?
            {
                LockGrant::New | LockGrant::Existing => {
                    log::trace!("{} granted {} lock on resource {}", locker, lock_type, rid);
                    return Ok(());
                }
                LockGrant::Wait => locker.discard_wakeup(&mut monitor),
            }

            let threshold = self.config.slow_lock_threshold();
            if !threshold.is_zero() {
                let delay = deadline
                    .remaining()
                    .map_or(threshold, |remaining| remaining.min(threshold))
                    .max(MIN_PARK);
                if locker.park(&mut monitor, Some(delay)).is_err() {
                    return Err(self.interrupted(rid, locker, lock_type, wakeups));
                }
                if self.table.is_owner(rid, locker, lock_type) {
                    log::debug!("{} granted {} lock on resource {} after waiting", locker, lock_type, rid);
                    return Ok(());
                }
            }

            if deadline.expired() {
                return self.timed_out(rid, locker, lock_type, timeout_ms, wakeups);
            }

            self.log_slow_lock(rid);
        }

        loop {
            let victim = {
                let mut monitor = locker.monitor();
                match self.wait_for_grant(
                    &mut monitor,
                    rid,
                    locker,
                    lock_type,
                    timeout_ms,
                    &deadline,
                    wakeups,
                )? {
                    WaitOutcome::Owner => return Ok(()),
                    WaitOutcome::Victim(victim) => victim,
                }
            };

            if self.notify_victim(&victim, rid, locker, lock_type, &deadline, wakeups)? {
                return Ok(());
            }
            // The cycle changed under us; start over with fresh state.
        }
    }

    /// Wait until granted, failed, or a deadlock victim other than `locker`
    /// has been chosen
    #[allow(clippy::too_many_arguments)]
    fn wait_for_grant(
        &self,
        monitor: &mut MonitorGuard<'_>,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        timeout_ms: u64,
        deadline: &Deadline,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> Result<WaitOutcome, LockError> {
        loop {
            if self.table.is_owner(rid, locker, lock_type) {
                return Ok(WaitOutcome::Owner);
            }

            match self.check_deadlock(rid, locker, lock_type, wakeups)? {
                DeadlockCheck::Owner => return Ok(WaitOutcome::Owner),
                DeadlockCheck::Victim(victim) => return Ok(WaitOutcome::Victim(victim)),
                DeadlockCheck::Clear => {}
            }

            let timeout = deadline.remaining().map(|remaining| remaining.max(MIN_PARK));
            if locker.park(monitor, timeout).is_err() {
                return Err(self.interrupted(rid, locker, lock_type, wakeups));
            }

            if self.table.is_owner(rid, locker, lock_type) {
                return Ok(WaitOutcome::Owner);
            }

            if deadline.expired() {
                return self
                    .timed_out(rid, locker, lock_type, timeout_ms, wakeups)
                    .map(|()| WaitOutcome::Owner);
            }

            // Woken by a victim notification or spuriously: detect again.
        }
    }

    fn check_deadlock(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> Result<DeadlockCheck, LockError> {
        let mut checker = DeadlockChecker::new(&self.table, locker, rid, lock_type);
        if !checker.has_cycle() {
            return Ok(DeadlockCheck::Clear);
        }

        if !self.config.enable_resolve_deadlock {
            log::warn!("LockManager detects dead lock.\n{}", checker);
            return Ok(DeadlockCheck::Clear);
        }

        let Some(victim) = checker.choose_victim() else {
            return Ok(DeadlockCheck::Clear);
        };

        if victim.id() != locker.id() {
            if self.table.is_owner(rid, locker, lock_type) {
                return Ok(DeadlockCheck::Owner);
            }
            return Ok(DeadlockCheck::Victim(victim));
        }

        if self.table.remove_waiter(rid, locker, lock_type, wakeups) {
            let err = LockError::Deadlock(checker.report(locker, &victim, true));
            log::warn!("{}", err);
            Err(err)
        } else {
            Ok(DeadlockCheck::Owner)
        }
    }

    /// Wake `victim` until this locker is granted, the victim no longer
    /// applies (`Ok(false)`), or the timeout expires.
    fn notify_victim(
        &self,
        victim: &Arc<Locker>,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        deadline: &Deadline,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> Result<bool, LockError> {
        let mut last_report: Option<DeadlockReport> = None;
        loop {
            if deadline.expired() {
                if let Some(report) = last_report.take() {
                    if self.table.remove_waiter(rid, locker, lock_type, wakeups) {
                        let err = LockError::Deadlock(report);
                        log::warn!("{}", err);
                        return Err(err);
                    }
                    return Ok(true);
                }
            }

            log::debug!("{} notifies deadlock victim {} (resource {})", locker, victim, rid);
            victim.wake();
            std::thread::sleep(self.config.victim_notify_interval());

            if locker.take_interrupt() {
                return Err(self.interrupted(rid, locker, lock_type, wakeups));
            }

            if self.table.is_owner(rid, locker, lock_type) {
                return Ok(true);
            }

            let mut checker = DeadlockChecker::new(&self.table, locker, rid, lock_type);
            let same_victim = checker.has_cycle()
                && checker
                    .choose_victim()
                    .is_some_and(|current| current.id() == victim.id());
            if !same_victim {
                return Ok(false);
            }
            // The victim has not reacted yet.
            last_report = Some(checker.report(locker, victim, false));
        }
    }

    /// Withdraw after a timeout; a grant that raced the timeout wins
    fn timed_out(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        timeout_ms: u64,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> Result<(), LockError> {
        if !self.table.remove_waiter(rid, locker, lock_type, wakeups) {
            return Ok(());
        }
        let err = LockError::Timeout {
            rid,
            lock_type,
            timeout_ms,
        };
        log::warn!("{} ({})", err, locker);
        Err(err)
    }

    /// Withdraw after an interrupt; a grant that raced the interrupt is handed back
    fn interrupted(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        wakeups: &mut Vec<Arc<Locker>>,
    ) -> LockError {
        if !self.table.remove_waiter(rid, locker, lock_type, wakeups) {
            if let Ok(granted) = self.table.release(rid, locker, lock_type) {
                wakeups.extend(granted);
            }
        }
        log::debug!("{} interrupted while waiting for {} lock on resource {}", locker, lock_type, rid);
        LockError::Interrupted { rid, lock_type }
    }

    /// Release one grant of `lock_type` on `rid` and wake the lockers it unblocks.
    ///
    /// Releasing something the locker does not hold is a caller bug and
    /// returns `NotLocked`.
    pub fn release(
        &self,
        rid: ResourceId,
        locker: &Locker,
        lock_type: LockType,
    ) -> Result<(), LockError> {
        let granted = self
            .table
            .release(rid, locker, lock_type)
            .map_err(|e| {
                log::error!("{}", e);
                e
            })?;
        Self::wake_all(granted);
        Ok(())
    }

    /// Whether `locker` holds `lock_type` (or a stronger type) on `rid`
    pub fn is_owner(&self, rid: ResourceId, locker: &Locker, lock_type: LockType) -> bool {
        self.table.is_owner(rid, locker, lock_type)
    }

    /// Owners and waiters of every locked resource
    pub fn dump(&self) -> Vec<LockInfo> {
        let now = Instant::now();
        self.table
            .snapshot_all()
            .iter()
            .map(|snapshot| LockInfo::from_snapshot(snapshot, now))
            .collect()
    }

    /// Owners and waiters of one resource, `None` when it is unlocked
    pub fn lock_info(&self, rid: ResourceId) -> Option<LockInfo> {
        self.table
            .snapshot(rid)
            .map(|snapshot| LockInfo::from_snapshot(&snapshot, Instant::now()))
    }

    pub fn locked_resource_count(&self) -> usize {
        self.table.resource_count()
    }

    fn wake_all(lockers: Vec<Arc<Locker>>) {
        for locker in lockers {
            log::debug!("Waking {}", locker);
            locker.wake();
        }
    }

    fn capture_stack(&self) -> Option<Arc<[String]>> {
        if !self.config.slow_lock_print_stack {
            return None;
        }
        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
        Some(
            backtrace
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .take(self.config.slow_lock_stack_depth)
                .map(str::to_string)
                .collect(),
        )
    }

    fn log_slow_lock(&self, rid: ResourceId) {
        let Some(snapshot) = self.table.snapshot(rid) else {
            return;
        };
        let trace = slow_lock_trace(&snapshot, self.config.slow_lock_print_stack, Instant::now());
        log::warn!("LockManager detects slow lock : {}", trace);
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockManagerConfig::default())
    }
}
