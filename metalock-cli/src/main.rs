// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Metalock CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // -v wins over --log-level; RUST_LOG can still refine the default
    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command {
        Commands::Version => {
            println!("{} {}", metalock::CRATE_NAME.bold().green(), metalock::VERSION);
            println!("Partitioned multi-granularity lock manager");
            Ok(())
        }

        Commands::Contention {
            rid,
            threads,
            hold_ms,
            manager,
        } => cli::handle_contention(rid, threads, hold_ms, manager),

        Commands::Deadlock {
            hold_ms,
            timeout_ms,
            manager,
        } => cli::handle_deadlock(hold_ms, timeout_ms, manager),

        Commands::Stress {
            threads,
            resources,
            ops,
            timeout_ms,
            hold_us,
            manager,
        } => cli::handle_stress(threads, resources, ops, timeout_ms, hold_us, manager),
    }
}
