// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Partitioned resource table
//!
//! Resources are spread over a fixed number of shards, each a map guarded by
//! its own mutex, so requests on unrelated resources rarely contend. Guards
//! are held only for short, non-blocking sections.

use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use super::error::LockError;
use super::holder::LockHolder;
use super::lock_type::LockType;
use super::locker::Locker;
use super::resource_lock::{LockGrant, ResourceLock};
use super::ResourceId;

type Shard = HashMap<ResourceId, ResourceLock>;

/// Point-in-time copy of a resource's owners and waiters
#[derive(Debug, Clone)]
pub struct LockSnapshot {
    pub rid: ResourceId,
    pub owners: Vec<LockHolder>,
    pub waiters: Vec<LockHolder>,
}

pub(crate) struct LockTable {
    shards: Vec<Mutex<Shard>>,
}

impl LockTable {
    pub(crate) fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index of a resource; only the low 31 bits of the id are used
    pub(crate) fn shard_index(&self, rid: ResourceId) -> usize {
        ((rid as i32) & 0x7fff_ffff) as usize % self.shards.len()
    }

    fn shard(&self, rid: ResourceId) -> MutexGuard<'_, Shard> {
        self.shards[self.shard_index(rid)].lock()
    }

    pub(crate) fn try_lock(
        &self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        stack: Option<Arc<[String]>>,
    ) -> Result<LockGrant, LockError> {
        let mut shard = self.shard(rid);
        match shard.entry(rid) {
            Entry::Vacant(slot) => {
                slot.insert(ResourceLock::new(LockHolder::new(
                    Arc::clone(locker),
                    lock_type,
                    stack,
                )));
                Ok(LockGrant::New)
            }
            Entry::Occupied(mut slot) => slot.get_mut().try_grant(rid, locker, lock_type, stack),
        }
    }

    /// Release one grant and return the lockers promoted by it
    pub(crate) fn release(
        &self,
        rid: ResourceId,
        locker: &Locker,
        lock_type: LockType,
    ) -> Result<Vec<Arc<Locker>>, LockError> {
        let not_locked = || LockError::NotLocked {
            rid,
            lock_type,
            locker: locker.id(),
        };

        let mut shard = self.shard(rid);
        let lock = shard.get_mut(&rid).ok_or_else(not_locked)?;
        let granted = lock.release(locker, lock_type).ok_or_else(not_locked)?;
        if lock.is_empty() {
            shard.remove(&rid);
        }
        Ok(granted)
    }

    pub(crate) fn is_owner(&self, rid: ResourceId, locker: &Locker, lock_type: LockType) -> bool {
        self.shard(rid)
            .get(&rid)
            .is_some_and(|lock| lock.is_owner(locker, lock_type))
    }

    /// Withdraw a pending request.
    ///
    /// Ownership may have been granted since the caller last looked, so it is
    /// re-checked under the guard: returns `false` (and removes nothing) when
    /// the locker turns out to be an owner. Lockers promoted by the removal are
    /// appended to `granted`.
    pub(crate) fn remove_waiter(
        &self,
        rid: ResourceId,
        locker: &Locker,
        lock_type: LockType,
        granted: &mut Vec<Arc<Locker>>,
    ) -> bool {
        let mut shard = self.shard(rid);
        let Some(lock) = shard.get_mut(&rid) else {
            return true;
        };
        if lock.is_owner(locker, lock_type) {
            return false;
        }
        granted.extend(lock.remove_waiter(locker, lock_type));
        if lock.is_empty() {
            shard.remove(&rid);
        }
        true
    }

    /// Owners and earlier waiters `locker` waits for on `rid`, or `None` when
    /// the resource is unlocked or `locker` already owns it with `lock_type`
    pub(crate) fn blockers(
        &self,
        rid: ResourceId,
        locker: &Locker,
        lock_type: LockType,
    ) -> Option<Vec<LockHolder>> {
        let shard = self.shard(rid);
        let lock = shard.get(&rid)?;
        if lock.is_owner(locker, lock_type) {
            return None;
        }
        Some(lock.blockers(locker, lock_type))
    }

    pub(crate) fn snapshot(&self, rid: ResourceId) -> Option<LockSnapshot> {
        let shard = self.shard(rid);
        shard.get(&rid).map(|lock| LockSnapshot {
            rid,
            owners: lock.clone_owners(),
            waiters: lock.clone_waiters(),
        })
    }

    /// Snapshot every resource, one shard guard at a time
    pub(crate) fn snapshot_all(&self) -> Vec<LockSnapshot> {
        let mut snapshots = Vec::new();
        for shard in &self.shards {
            let shard = shard.lock();
            snapshots.extend(shard.iter().map(|(rid, lock)| LockSnapshot {
                rid: *rid,
                owners: lock.clone_owners(),
                waiters: lock.clone_waiters(),
            }));
        }
        snapshots
    }

    pub(crate) fn resource_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }
}
