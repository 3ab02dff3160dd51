// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Metalock - partitioned multi-granularity lock manager
//!
//! Metalock serializes access to metadata resources (databases, tables,
//! partitions, tablets) identified by numeric ids on behalf of many concurrent
//! sessions.
//!
//! # Features
//!
//! - **Sharded lock table**: each shard has its own guard, so unrelated
//!   resources never contend
//! - **Multi-granularity modes**: intention-shared, intention-exclusive, read, write
//! - **Blocking waits**: per-requester suspend/resume with timeouts and interruption
//! - **Deadlock detection**: wait-for graph traversal with deterministic victim choice
//! - **Diagnostics**: slow-lock traces and lock table dumps
//!
//! # Usage
//!
//! ```ignore
//! use metalock::{LockManager, LockManagerConfig, LockType, Locker};
//! use std::sync::Arc;
//!
//! let manager = LockManager::new(LockManagerConfig::default());
//! let locker = Arc::new(Locker::new());
//! manager.lock(42, &locker, LockType::Write, 1_000)?;
//! // ... modify resource 42 ...
//! manager.release(42, &locker, LockType::Write)?;
//! ```

pub mod lock;

pub use lock::{
    DeadlockReport, LockError, LockHolderInfo, LockInfo, LockManager, LockManagerConfig,
    LockType, Locker, LockerId, LockerState, ResourceId,
};

/// Metalock version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Metalock crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
