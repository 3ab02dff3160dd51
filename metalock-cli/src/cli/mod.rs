// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! CLI module for Metalock
//!
//! Runs lock contention, deadlock and stress scenarios against an
//! in-process lock manager and prints what happened.

pub mod commands;
pub mod output;
pub mod scenarios;

pub use commands::{Cli, Commands};

use commands::ManagerArgs;
use output::ReportFormatter;

pub fn handle_contention(
    rid: i64,
    threads: usize,
    hold_ms: u64,
    manager: ManagerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = scenarios::run_contention(manager.config(), rid, threads, hold_ms)?;
    print!("{}", ReportFormatter::scenario(&report, manager.format));
    Ok(())
}

pub fn handle_deadlock(
    hold_ms: u64,
    timeout_ms: u64,
    manager: ManagerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = scenarios::run_deadlock(manager.config(), hold_ms, timeout_ms)?;
    print!("{}", ReportFormatter::scenario(&report, manager.format));
    Ok(())
}

pub fn handle_stress(
    threads: usize,
    resources: i64,
    ops: usize,
    timeout_ms: u64,
    hold_us: u64,
    manager: ManagerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = scenarios::run_stress(manager.config(), threads, resources, ops, timeout_ms, hold_us)?;
    print!("{}", ReportFormatter::stress(&report, manager.format));
    if !report.remaining.is_empty() {
        return Err(format!("{} resources left locked", report.remaining.len()).into());
    }
    Ok(())
}
