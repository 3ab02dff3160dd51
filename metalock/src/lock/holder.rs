// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Ownership and waiter records

use std::sync::Arc;
use std::time::Instant;

use super::lock_type::LockType;
use super::locker::Locker;

/// One locker's claim on a resource, either granted (owner) or pending (waiter)
#[derive(Debug, Clone)]
pub struct LockHolder {
    locker: Arc<Locker>,
    lock_type: LockType,
    /// Grant time for owners, enqueue time for waiters
    acquired_at: Instant,
    /// Number of grants folded into this record
    reentrant_count: u32,
    stack: Option<Arc<[String]>>,
}

impl LockHolder {
    pub(crate) fn new(
        locker: Arc<Locker>,
        lock_type: LockType,
        stack: Option<Arc<[String]>>,
    ) -> Self {
        Self {
            locker,
            lock_type,
            acquired_at: Instant::now(),
            reentrant_count: 1,
            stack,
        }
    }

    pub fn locker(&self) -> &Arc<Locker> {
        &self.locker
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    pub fn reentrant_count(&self) -> u32 {
        self.reentrant_count
    }

    /// Backtrace captured at grant time, when stack capture is enabled
    pub fn stack(&self) -> Option<&[String]> {
        self.stack.as_deref()
    }

    pub(crate) fn is_held_by(&self, locker: &Locker) -> bool {
        self.locker.id() == locker.id()
    }

    pub(crate) fn matches(&self, locker: &Locker, lock_type: LockType) -> bool {
        self.is_held_by(locker) && self.lock_type == lock_type
    }

    pub(crate) fn reenter(&mut self) {
        self.reentrant_count += 1;
    }

    /// Drop one grant; true when the record is exhausted
    pub(crate) fn leave(&mut self) -> bool {
        self.reentrant_count = self.reentrant_count.saturating_sub(1);
        self.reentrant_count == 0
    }

    /// Turn a waiter record into an owner record
    pub(crate) fn promote(&mut self) {
        self.acquired_at = Instant::now();
    }
}
