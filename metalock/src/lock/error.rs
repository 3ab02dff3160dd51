// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock manager error types

use super::lock_type::LockType;
use super::locker::LockerId;
use super::ResourceId;
use thiserror::Error;

/// Diagnostic payload of a deadlock failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    /// Locker the failing request was made for
    pub locker: LockerId,
    /// Locker chosen by the detector to break the cycle
    pub victim: LockerId,
    /// True when the failing locker was itself the chosen victim; false when it
    /// gave up after its timeout expired while waiting for another victim to abort
    pub chosen_as_victim: bool,
    /// One line per cycle node
    pub cycle: String,
}

impl std::fmt::Display for DeadlockReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.chosen_as_victim {
            write!(
                f,
                "locker {} was chosen as the deadlock victim.\n{}",
                self.locker, self.cycle
            )
        } else {
            write!(
                f,
                "locker {} timed out waiting for victim {} to abort.\n{}",
                self.locker, self.victim, self.cycle
            )
        }
    }
}

/// Lock manager errors
#[derive(Error, Debug, Clone)]
pub enum LockError {
    #[error("Lock timeout: {lock_type} lock on resource {rid} not granted within {timeout_ms} ms")]
    Timeout {
        rid: ResourceId,
        lock_type: LockType,
        timeout_ms: u64,
    },

    #[error("Deadlock detected: {0}")]
    Deadlock(DeadlockReport),

    #[error("Lock wait interrupted: {lock_type} lock on resource {rid}")]
    Interrupted { rid: ResourceId, lock_type: LockType },

    #[error("Unsupported lock request: {0}")]
    NotSupported(String),

    #[error("Attempt to release {lock_type} lock on resource {rid} not held by locker {locker}")]
    NotLocked {
        rid: ResourceId,
        lock_type: LockType,
        locker: LockerId,
    },
}

impl LockError {
    /// Whether the caller may abort its work and retry.
    /// Contract violations are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockError::Timeout { .. } | LockError::Deadlock(_) | LockError::Interrupted { .. }
        )
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, LockError::Deadlock(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}
