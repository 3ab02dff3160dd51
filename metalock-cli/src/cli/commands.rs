// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Command-line argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use metalock::LockManagerConfig;

/// Metalock - partitioned multi-granularity lock manager
#[derive(Parser, Debug)]
#[command(name = "metalock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<log::Level>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Several threads take the same exclusive lock one after another
    Contention {
        /// Resource all threads compete for
        #[arg(long, default_value_t = 42)]
        rid: i64,

        /// Number of competing threads
        #[arg(long, default_value_t = 3)]
        threads: usize,

        /// How long each thread holds the lock
        #[arg(long, default_value_t = 50)]
        hold_ms: u64,

        #[command(flatten)]
        manager: ManagerArgs,
    },

    /// Two threads lock two resources in opposite order
    Deadlock {
        /// How long each thread holds its first lock before requesting the second
        #[arg(long, default_value_t = 20)]
        hold_ms: u64,

        /// Timeout of the second request (0 waits indefinitely)
        #[arg(long, default_value_t = 0)]
        timeout_ms: u64,

        #[command(flatten)]
        manager: ManagerArgs,
    },

    /// Random lock/release workload over a small set of resources
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,

        #[arg(long, default_value_t = 16)]
        resources: i64,

        /// Lock requests per thread
        #[arg(long, default_value_t = 1000)]
        ops: usize,

        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,

        /// How long each granted lock is held, in microseconds
        #[arg(long, default_value_t = 100)]
        hold_us: u64,

        #[command(flatten)]
        manager: ManagerArgs,
    },
}

/// Lock manager settings shared by all scenarios
#[derive(Args, Debug, Clone)]
pub struct ManagerArgs {
    /// Number of lock table shards
    #[arg(long, default_value_t = 32)]
    pub shards: usize,

    /// Delay before the first deadlock check and slow-lock trace
    #[arg(long, default_value_t = 200)]
    pub slow_lock_ms: u64,

    /// Only log detected deadlocks instead of aborting a victim
    #[arg(long)]
    pub no_resolve_deadlock: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl ManagerArgs {
    pub fn config(&self) -> LockManagerConfig {
        LockManagerConfig::default()
            .with_lock_table_num(self.shards)
            .with_slow_lock_threshold_ms(self.slow_lock_ms)
            .with_resolve_deadlock(!self.no_resolve_deadlock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
}
