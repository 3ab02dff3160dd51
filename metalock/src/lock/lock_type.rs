// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Lock modes and their compatibility matrix
//!
//! Multi-granularity locking uses intention modes on containers (databases,
//! tables) and shared/exclusive modes on the resource actually read or written.

use serde::{Deserialize, Serialize};

/// Lock modes, ordered by rank (weakest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockType {
    /// IS - intends to read some descendant
    IntentionShared,
    /// IX - intends to write some descendant
    IntentionExclusive,
    /// S - reads the whole resource
    Read,
    /// X - writes the whole resource
    Write,
}

impl LockType {
    /// All lock types in rank order
    pub const ALL: [LockType; 4] = [
        LockType::IntentionShared,
        LockType::IntentionExclusive,
        LockType::Read,
        LockType::Write,
    ];

    /// Get string representation for display
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::IntentionShared => "INTENTION_SHARED",
            LockType::IntentionExclusive => "INTENTION_EXCLUSIVE",
            LockType::Read => "READ",
            LockType::Write => "WRITE",
        }
    }

    /// Rank used to decide whether a re-request is a no-op or an upgrade
    pub fn rank(&self) -> u8 {
        match self {
            LockType::IntentionShared => 0,
            LockType::IntentionExclusive => 1,
            LockType::Read => 2,
            LockType::Write => 3,
        }
    }

    pub fn is_intention(&self) -> bool {
        matches!(
            self,
            LockType::IntentionShared | LockType::IntentionExclusive
        )
    }

    /// Whether two different lockers may hold `self` and `other` at the same time.
    /// The relation is symmetric.
    pub fn is_compatible(&self, other: &LockType) -> bool {
        use LockType::*;
        match (self, other) {
            (IntentionShared, Write) | (Write, IntentionShared) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (Read, Read) => true,
            _ => false,
        }
    }

    /// Whether holding `self` already satisfies a request for `requested`
    pub fn covers(&self, requested: &LockType) -> bool {
        self.rank() >= requested.rank()
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IS" | "INTENTION_SHARED" | "INTENTION SHARED" => Ok(LockType::IntentionShared),
            "IX" | "INTENTION_EXCLUSIVE" | "INTENTION EXCLUSIVE" => {
                Ok(LockType::IntentionExclusive)
            }
            "S" | "READ" | "SHARED" => Ok(LockType::Read),
            "X" | "WRITE" | "EXCLUSIVE" => Ok(LockType::Write),
            _ => Err(format!("Unknown lock type: {}", s)),
        }
    }
}
