// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock management module
//!
//! This module provides the concurrency-control core used by the metadata
//! layer: a partitioned lock table of multi-granularity locks, blocking
//! acquisition with timeouts, and wait-for graph deadlock detection.
//!
//! # Features
//! - Intention (IS/IX) and shared/exclusive (S/X) lock types
//! - Reentrant and upgrading requests from existing owners
//! - Arrival-ordered waiter queues per resource
//! - Deadlock detection with deterministic victim selection
//! - Slow-lock traces and full lock table dumps for operators

pub mod config;
pub mod deadlock;
pub mod error;
pub mod holder;
pub mod info;
pub mod lock_type;
pub mod locker;
pub mod manager;
pub(crate) mod resource_lock;
pub(crate) mod table;

/// Caller-assigned identifier of a lockable resource
pub type ResourceId = i64;

pub use config::LockManagerConfig;
pub use deadlock::{CycleNode, DeadlockChecker};
pub use error::{DeadlockReport, LockError};
pub use holder::LockHolder;
pub use info::{LockHolderInfo, LockInfo};
pub use lock_type::LockType;
pub use locker::{Locker, LockerId, LockerState};
pub use manager::LockManager;
pub use resource_lock::LockGrant;
