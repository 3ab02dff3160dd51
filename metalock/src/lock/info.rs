// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Reporting structures for lock table dumps and slow-lock traces

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::time::Instant;
use uuid::Uuid;

use super::holder::LockHolder;
use super::lock_type::LockType;
use super::locker::LockerId;
use super::table::LockSnapshot;
use super::ResourceId;

fn millis_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_millis() as u64
}

/// One owner or waiter as seen by operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolderInfo {
    pub locker_id: LockerId,
    pub thread_name: String,
    pub query_id: Option<Uuid>,
    pub lock_type: LockType,
    /// Owners: time since the grant. Waiters: time since the request.
    pub elapsed_ms: u64,
    /// Owners: how long the request waited before the grant
    pub wait_time_ms: Option<u64>,
    pub reentrant_count: u32,
}

impl LockHolderInfo {
    fn owner(holder: &LockHolder, now: Instant) -> Self {
        let locker = holder.locker();
        Self {
            locker_id: locker.id(),
            thread_name: locker.thread_name().to_string(),
            query_id: locker.query_id(),
            lock_type: holder.lock_type(),
            elapsed_ms: millis_between(holder.acquired_at(), now),
            wait_time_ms: locker
                .lock_request_time()
                .map(|requested| millis_between(requested, holder.acquired_at())),
            reentrant_count: holder.reentrant_count(),
        }
    }

    fn waiter(holder: &LockHolder, now: Instant) -> Self {
        let locker = holder.locker();
        let requested = locker.lock_request_time().unwrap_or(holder.acquired_at());
        Self {
            locker_id: locker.id(),
            thread_name: locker.thread_name().to_string(),
            query_id: locker.query_id(),
            lock_type: holder.lock_type(),
            elapsed_ms: millis_between(requested, now),
            wait_time_ms: None,
            reentrant_count: holder.reentrant_count(),
        }
    }
}

/// Owners and waiters of one locked resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub rid: ResourceId,
    pub owners: Vec<LockHolderInfo>,
    pub waiters: Vec<LockHolderInfo>,
}

impl LockInfo {
    pub(crate) fn from_snapshot(snapshot: &LockSnapshot, now: Instant) -> Self {
        Self {
            rid: snapshot.rid,
            owners: snapshot
                .owners
                .iter()
                .map(|h| LockHolderInfo::owner(h, now))
                .collect(),
            waiters: snapshot
                .waiters
                .iter()
                .map(|h| LockHolderInfo::waiter(h, now))
                .collect(),
        }
    }
}

/// JSON payload of the slow-lock warning
pub(crate) fn slow_lock_trace(snapshot: &LockSnapshot, print_stack: bool, now: Instant) -> JsonValue {
    let owners: Vec<JsonValue> = snapshot
        .owners
        .iter()
        .map(|owner| {
            let locker = owner.locker();
            let mut info = json!({
                "id": locker.id().id(),
                "name": locker.thread_name(),
                "type": owner.lock_type().as_str(),
                "heldFor": millis_between(owner.acquired_at(), now),
                "waitTime": locker
                    .lock_request_time()
                    .map(|requested| millis_between(requested, owner.acquired_at()))
                    .unwrap_or(0),
            });
            if let Some(query_id) = locker.query_id() {
                info["queryId"] = json!(query_id.to_string());
            }
            if print_stack {
                if let Some(stack) = owner.stack() {
                    info["stack"] = json!(stack);
                }
            }
            info
        })
        .collect();

    let waiters: Vec<JsonValue> = snapshot
        .waiters
        .iter()
        .map(|waiter| {
            let locker = waiter.locker();
            let requested = locker.lock_request_time().unwrap_or(waiter.acquired_at());
            let mut info = json!({
                "id": locker.id().id(),
                "name": locker.thread_name(),
                "type": waiter.lock_type().as_str(),
                "waitTime": millis_between(requested, now),
            });
            if let Some(query_id) = locker.query_id() {
                info["queryId"] = json!(query_id.to_string());
            }
            info
        })
        .collect();

    json!({
        "rid": snapshot.rid,
        "owners": owners,
        "waiter": waiters,
    })
}
