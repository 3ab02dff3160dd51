// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Wait-for graph cycle detection
//!
//! The graph is never materialized. Starting from a blocked request, the
//! checker reads what blocks it on the awaited resource (one shard guard at a
//! time): owners holding a conflicting type and waiters queued ahead of it.
//! Every blocker that is itself waiting is followed. Reaching a locker
//! already on the current path closes a cycle.

use std::collections::HashSet;
use std::sync::Arc;

use super::error::DeadlockReport;
use super::lock_type::LockType;
use super::locker::{Locker, LockerId};
use super::table::LockTable;
use super::ResourceId;

/// One edge of a wait-for path: `locker` waits for `request_type` on `rid`
#[derive(Debug, Clone)]
pub struct CycleNode {
    locker: Arc<Locker>,
    rid: ResourceId,
    request_type: LockType,
    /// Type held (or queued for) on the resource awaited by the previous node
    own_type: Option<LockType>,
}

impl CycleNode {
    pub fn locker(&self) -> &Arc<Locker> {
        &self.locker
    }

    pub fn rid(&self) -> ResourceId {
        self.rid
    }

    pub fn request_type(&self) -> LockType {
        self.request_type
    }

    pub fn own_type(&self) -> Option<LockType> {
        self.own_type
    }
}

pub struct DeadlockChecker<'a> {
    table: &'a LockTable,
    root: Arc<Locker>,
    rid: ResourceId,
    root_type: LockType,
    cycle: Vec<CycleNode>,
    explored: HashSet<LockerId>,
}

impl<'a> DeadlockChecker<'a> {
    pub(crate) fn new(
        table: &'a LockTable,
        root: &Arc<Locker>,
        rid: ResourceId,
        lock_type: LockType,
    ) -> Self {
        Self {
            table,
            root: Arc::clone(root),
            rid,
            root_type: lock_type,
            cycle: Vec::new(),
            explored: HashSet::new(),
        }
    }

    /// Search for a cycle reachable from the root request. On success the
    /// cycle is kept for [`choose_victim`](Self::choose_victim) and reporting.
    pub fn has_cycle(&mut self) -> bool {
        self.cycle.clear();
        self.explored.clear();
        let root = Arc::clone(&self.root);
        self.visit(&root, self.rid, self.root_type, None)
    }

    fn visit(
        &mut self,
        checked: &Arc<Locker>,
        rid: ResourceId,
        request_type: LockType,
        own_type: Option<LockType>,
    ) -> bool {
        let Some(blockers) = self.table.blockers(rid, checked, request_type) else {
            return false;
        };

        self.cycle.push(CycleNode {
            locker: Arc::clone(checked),
            rid,
            request_type,
            own_type,
        });

        for holder in &blockers {
            let owner = holder.locker();
            // A locker may co-own what it waits for (shared reentry, upgrade).
            if owner.id() == checked.id() {
                continue;
            }

            if let Some(pos) = self.cycle.iter().position(|n| n.locker.id() == owner.id()) {
                self.cycle.drain(..pos);
                self.cycle[0].own_type = Some(holder.lock_type());
                return true;
            }

            if self.explored.contains(&owner.id()) {
                continue;
            }

            if let Some((next_rid, next_type)) = owner.waiting_for() {
                if self.visit(owner, next_rid, next_type, Some(holder.lock_type())) {
                    return true;
                }
            }
        }

        self.cycle.pop();
        self.explored.insert(checked.id());
        false
    }

    pub fn cycle(&self) -> &[CycleNode] {
        &self.cycle
    }

    /// Pick the locker that should abort.
    ///
    /// Nodes are ordered by locker id and the index is the wrapping sum of the
    /// awaited resource ids modulo the cycle length, so every participant
    /// that observes the same cycle picks the same victim.
    pub fn choose_victim(&self) -> Option<Arc<Locker>> {
        if self.cycle.is_empty() {
            return None;
        }
        let mut order: Vec<&CycleNode> = self.cycle.iter().collect();
        order.sort_by_key(|n| n.locker.id());

        let sum = order
            .iter()
            .fold(0u64, |acc, n| acc.wrapping_add(n.rid as u64));
        let idx = (sum % order.len() as u64) as usize;
        Some(Arc::clone(&order[idx].locker))
    }

    pub(crate) fn report(
        &self,
        locker: &Locker,
        victim: &Locker,
        chosen_as_victim: bool,
    ) -> DeadlockReport {
        DeadlockReport {
            locker: locker.id(),
            victim: victim.id(),
            chosen_as_victim,
            cycle: self.to_string(),
        }
    }
}

impl std::fmt::Display for DeadlockChecker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(last) = self.cycle.last() else {
            return write!(f, "no cycle");
        };

        let mut own_rid = last.rid;
        for node in &self.cycle {
            let own_type = node
                .own_type
                .map(|t| t.as_str())
                .unwrap_or("UNKNOWN");
            writeln!(
                f,
                "Locker: \"{}\" --- owns lock(Rid: {}, LockType: {}), waits for lock(Rid: {}, LockType: {})",
                node.locker, own_rid, own_type, node.rid, node.request_type
            )?;
            own_rid = node.rid;
        }
        Ok(())
    }
}
