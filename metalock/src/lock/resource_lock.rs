// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Per-resource lock state
//!
//! A resource starts in the single-owner form, which holds exactly one owner
//! record and no queue. The first request that needs a second owner record or
//! a waiter inflates it into the general form. The general form never deflates:
//! once empty, the lock table drops the resource.
//!
//! All methods run under the owning shard's guard.

use std::collections::VecDeque;
use std::sync::Arc;

use super::error::LockError;
use super::holder::LockHolder;
use super::lock_type::LockType;
use super::locker::Locker;
use super::ResourceId;

/// Outcome of a grant attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    /// The locker became an owner
    New,
    /// The locker already held an equal or stronger type
    Existing,
    /// The locker was queued as a waiter
    Wait,
}

/// Owners and arrival-ordered waiters of a contended resource
#[derive(Debug, Clone, Default)]
pub(crate) struct MultiOwnerLock {
    owners: Vec<LockHolder>,
    waiters: VecDeque<LockHolder>,
}

#[derive(Debug, Clone)]
pub(crate) enum ResourceLock {
    Single(LockHolder),
    Multi(MultiOwnerLock),
}

/// How a request relates to what the same locker already owns
enum Reentry {
    None,
    Same(usize),
    Covered(usize),
    Upgrade,
}

fn classify(
    owners: &[LockHolder],
    rid: ResourceId,
    locker: &Locker,
    lock_type: LockType,
) -> Result<Reentry, LockError> {
    if let Some(idx) = owners.iter().position(|h| h.matches(locker, lock_type)) {
        return Ok(Reentry::Same(idx));
    }

    let mut held = owners
        .iter()
        .enumerate()
        .filter(|(_, h)| h.is_held_by(locker))
        .peekable();
    if held.peek().is_none() {
        return Ok(Reentry::None);
    }

    let held: Vec<(usize, LockType)> = held.map(|(idx, h)| (idx, h.lock_type())).collect();
    if !lock_type.is_intention() && held.iter().all(|(_, t)| t.is_intention()) {
        return Err(LockError::NotSupported(format!(
            "{} lock on resource {} requested by {} inside an intention lock scope",
            lock_type, rid, locker
        )));
    }

    Ok(held
        .iter()
        .filter(|(_, t)| t.covers(&lock_type))
        .max_by_key(|(_, t)| t.rank())
        .map(|(idx, _)| Reentry::Covered(*idx))
        .unwrap_or(Reentry::Upgrade))
}

impl MultiOwnerLock {
    /// Compatible with every owner record belonging to some other locker
    fn is_grantable(&self, locker: &Locker, lock_type: LockType) -> bool {
        self.owners
            .iter()
            .filter(|h| !h.is_held_by(locker))
            .all(|h| h.lock_type().is_compatible(&lock_type))
    }

    /// Promote waiters in arrival order until one cannot be granted
    fn grant_waiters(&mut self) -> Vec<Arc<Locker>> {
        let mut granted = Vec::new();
        while let Some(front) = self.waiters.front() {
            if !self.is_grantable(front.locker(), front.lock_type()) {
                break;
            }
            let Some(mut waiter) = self.waiters.pop_front() else {
                break;
            };
            waiter.promote();
            waiter.locker().mark_granted();
            granted.push(Arc::clone(waiter.locker()));
            self.owners.push(waiter);
        }
        granted
    }
}

impl ResourceLock {
    pub(crate) fn new(owner: LockHolder) -> Self {
        ResourceLock::Single(owner)
    }

    #[cfg(test)]
    pub(crate) fn is_single_owner(&self) -> bool {
        matches!(self, ResourceLock::Single(_))
    }

    pub(crate) fn owners(&self) -> &[LockHolder] {
        match self {
            ResourceLock::Single(owner) => std::slice::from_ref(owner),
            ResourceLock::Multi(multi) => &multi.owners,
        }
    }

    pub(crate) fn waiter_count(&self) -> usize {
        match self {
            ResourceLock::Single(_) => 0,
            ResourceLock::Multi(multi) => multi.waiters.len(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.owners().is_empty() && self.waiter_count() == 0
    }

    pub(crate) fn clone_owners(&self) -> Vec<LockHolder> {
        self.owners().to_vec()
    }

    pub(crate) fn clone_waiters(&self) -> Vec<LockHolder> {
        match self {
            ResourceLock::Single(_) => Vec::new(),
            ResourceLock::Multi(multi) => multi.waiters.iter().cloned().collect(),
        }
    }

    pub(crate) fn is_owner(&self, locker: &Locker, lock_type: LockType) -> bool {
        self.owners()
            .iter()
            .any(|h| h.is_held_by(locker) && h.lock_type().covers(&lock_type))
    }

    /// Records `locker` has to wait for before `lock_type` can be granted:
    /// other owners holding a conflicting type, and every waiter queued
    /// ahead of the locker's own pending request.
    pub(crate) fn blockers(&self, locker: &Locker, lock_type: LockType) -> Vec<LockHolder> {
        let mut blockers: Vec<LockHolder> = self
            .owners()
            .iter()
            .filter(|h| !h.is_held_by(locker) && !h.lock_type().is_compatible(&lock_type))
            .cloned()
            .collect();
        if let ResourceLock::Multi(multi) = self {
            if let Some(pos) = multi.waiters.iter().position(|h| h.matches(locker, lock_type)) {
                blockers.extend(
                    multi
                        .waiters
                        .iter()
                        .take(pos)
                        .filter(|h| !h.is_held_by(locker))
                        .cloned(),
                );
            }
        }
        blockers
    }

    fn inflate(&mut self) -> &mut MultiOwnerLock {
        if let ResourceLock::Single(owner) = self {
            let owner = owner.clone();
            *self = ResourceLock::Multi(MultiOwnerLock {
                owners: vec![owner],
                waiters: VecDeque::new(),
            });
        }
        match self {
            ResourceLock::Multi(multi) => multi,
            ResourceLock::Single(_) => unreachable!("single-owner lock was just inflated"),
        }
    }

    fn owner_mut(&mut self, idx: usize) -> Option<&mut LockHolder> {
        match self {
            ResourceLock::Single(owner) => (idx == 0).then_some(owner),
            ResourceLock::Multi(multi) => multi.owners.get_mut(idx),
        }
    }

    /// Try to grant `lock_type` to `locker`; queue it as a waiter on conflict.
    ///
    /// Fresh requesters queue behind existing waiters even when compatible
    /// with the owners. Reentrant and upgrade requests of an owner do not.
    pub(crate) fn try_grant(
        &mut self,
        rid: ResourceId,
        locker: &Arc<Locker>,
        lock_type: LockType,
        stack: Option<Arc<[String]>>,
    ) -> Result<LockGrant, LockError> {
        let is_owner = match classify(self.owners(), rid, locker, lock_type)? {
            Reentry::Same(idx) | Reentry::Covered(idx) => {
                if let Some(owner) = self.owner_mut(idx) {
                    owner.reenter();
                }
                return Ok(LockGrant::Existing);
            }
            Reentry::Upgrade => true,
            Reentry::None => false,
        };

        let multi = self.inflate();
        let holder = LockHolder::new(Arc::clone(locker), lock_type, stack);
        let must_queue = !is_owner && !multi.waiters.is_empty();
        if must_queue || !multi.is_grantable(locker, lock_type) {
            if is_owner {
                // upgrades wait ahead of fresh requesters, which may be blocked by them
                let at = multi
                    .waiters
                    .iter()
                    .take_while(|w| multi.owners.iter().any(|o| o.is_held_by(w.locker())))
                    .count();
                multi.waiters.insert(at, holder);
            } else {
                multi.waiters.push_back(holder);
            }
            locker.begin_wait(rid, lock_type);
            Ok(LockGrant::Wait)
        } else {
            multi.owners.push(holder);
            Ok(LockGrant::New)
        }
    }

    /// Drop one grant of `lock_type` held by `locker` and promote waiters that
    /// became grantable. `None` when the locker holds no such grant.
    pub(crate) fn release(
        &mut self,
        locker: &Locker,
        lock_type: LockType,
    ) -> Option<Vec<Arc<Locker>>> {
        match self {
            ResourceLock::Single(owner) => {
                if !owner.is_held_by(locker) || !owner.lock_type().covers(&lock_type) {
                    return None;
                }
                if owner.leave() {
                    *self = ResourceLock::Multi(MultiOwnerLock::default());
                }
                Some(Vec::new())
            }
            ResourceLock::Multi(multi) => {
                let idx = multi
                    .owners
                    .iter()
                    .position(|h| h.matches(locker, lock_type))
                    .or_else(|| {
                        multi
                            .owners
                            .iter()
                            .position(|h| h.is_held_by(locker) && h.lock_type().covers(&lock_type))
                    })?;
                if multi.owners[idx].leave() {
                    multi.owners.remove(idx);
                }
                Some(multi.grant_waiters())
            }
        }
    }

    /// Withdraw a pending request and promote whoever it was blocking
    pub(crate) fn remove_waiter(&mut self, locker: &Locker, lock_type: LockType) -> Vec<Arc<Locker>> {
        match self {
            ResourceLock::Single(_) => Vec::new(),
            ResourceLock::Multi(multi) => {
                if let Some(idx) = multi.waiters.iter().position(|h| h.matches(locker, lock_type)) {
                    multi.waiters.remove(idx);
                }
                multi.grant_waiters()
            }
        }
    }
}
