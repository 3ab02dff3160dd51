// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the lock manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManagerConfig {
    /// Number of independently guarded lock table shards
    pub lock_table_num: usize,

    /// How long a blocked request waits before it is considered slow. A slow
    /// request logs a trace of the resource's owners and waiters and starts
    /// deadlock detection. Zero runs detection immediately.
    pub slow_lock_threshold_ms: u64,

    /// Abort a victim when a deadlock cycle is found. When disabled the cycle
    /// is only logged and the requester keeps waiting until its timeout.
    pub enable_resolve_deadlock: bool,

    /// Capture a backtrace when a lock is granted and print it in slow-lock traces
    pub slow_lock_print_stack: bool,

    /// Number of backtrace frames kept per owner
    pub slow_lock_stack_depth: usize,

    /// Pause between waking a deadlock victim and re-checking ownership
    pub victim_notify_interval_ms: u64,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            lock_table_num: 32,
            slow_lock_threshold_ms: 3000,
            enable_resolve_deadlock: true,
            slow_lock_print_stack: false,
            slow_lock_stack_depth: 20,
            victim_notify_interval_ms: 1,
        }
    }
}

impl LockManagerConfig {
    /// Small, fast-reacting configuration for tests and demos
    pub fn for_testing() -> Self {
        Self {
            lock_table_num: 4,
            slow_lock_threshold_ms: 100,
            ..Self::default()
        }
    }

    /// Configuration that records owner stacks for slow-lock investigations
    pub fn diagnostic() -> Self {
        Self {
            slow_lock_print_stack: true,
            ..Self::default()
        }
    }

    /// Parse a JSON document; absent fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_lock_table_num(mut self, lock_table_num: usize) -> Self {
        self.lock_table_num = lock_table_num;
        self
    }

    pub fn with_slow_lock_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.slow_lock_threshold_ms = threshold_ms;
        self
    }

    pub fn with_resolve_deadlock(mut self, enabled: bool) -> Self {
        self.enable_resolve_deadlock = enabled;
        self
    }

    pub fn with_stack_capture(mut self, enabled: bool, depth: usize) -> Self {
        self.slow_lock_print_stack = enabled;
        self.slow_lock_stack_depth = depth;
        self
    }

    /// Shard count, never zero
    pub fn shard_count(&self) -> usize {
        self.lock_table_num.max(1)
    }

    pub fn slow_lock_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_lock_threshold_ms)
    }

    pub fn victim_notify_interval(&self) -> Duration {
        Duration::from_millis(self.victim_notify_interval_ms)
    }
}
