// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Report formatting for CLI output

use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use metalock::LockInfo;
use serde::Serialize;

use super::commands::OutputFormat;
use super::scenarios::{ScenarioReport, StressReport};

/// Report formatter for different output formats
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn scenario(report: &ScenarioReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::scenario_table(report),
            OutputFormat::Json => Self::to_json(report),
        }
    }

    pub fn stress(report: &StressReport, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::stress_table(report),
            OutputFormat::Json => Self::to_json(report),
        }
    }

    fn scenario_table(report: &ScenarioReport) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "{}\n",
            format!("Scenario: {}", report.scenario).bold().green()
        ));
        output.push_str(&format!("Elapsed: {} ms\n\n", report.elapsed_ms));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["#", "Thread", "Resource", "Lock type", "Result", "Waited (ms)"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green))
                .collect::<Vec<_>>(),
        );
        for (i, outcome) in report.outcomes.iter().enumerate() {
            let result_color = if outcome.result == "granted" {
                Color::Green
            } else {
                Color::Red
            };
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&outcome.thread),
                Cell::new(outcome.rid),
                Cell::new(outcome.lock_type),
                Cell::new(&outcome.result).fg(result_color),
                Cell::new(outcome.waited_ms),
            ]);
        }
        output.push_str(&table.to_string());
        output.push('\n');

        let details: Vec<&String> = report
            .outcomes
            .iter()
            .filter_map(|o| o.detail.as_ref())
            .collect();
        if !details.is_empty() {
            output.push_str(&format!("\n{}\n", "Errors:".bold().yellow()));
            for detail in details {
                output.push_str(&format!("{}\n", detail.yellow()));
            }
        }

        output.push_str(&Self::remaining(&report.remaining));
        output
    }

    fn stress_table(report: &StressReport) -> String {
        let mut output = String::new();
        output.push_str(&format!("{}\n", "Stress Summary".bold().green()));
        output.push_str(&format!(
            "{} threads, {} ms, {:.0} requests/sec\n\n",
            report.threads, report.elapsed_ms, report.requests_per_sec
        ));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec![
            Cell::new("Outcome").fg(Color::Green),
            Cell::new("Count").fg(Color::Green),
        ]);
        for (label, count) in [
            ("requests", report.requests),
            ("granted", report.granted),
            ("timeouts", report.timeouts),
            ("deadlocks", report.deadlocks),
            ("interrupts", report.interrupts),
            ("unsupported", report.unsupported),
        ] {
            table.add_row(vec![Cell::new(label), Cell::new(count)]);
        }
        output.push_str(&table.to_string());
        output.push('\n');

        output.push_str(&Self::remaining(&report.remaining));
        output
    }

    /// Locks still held once the workload finished; expected to be none
    fn remaining(dump: &[LockInfo]) -> String {
        if dump.is_empty() {
            return format!("\n{}\n", "Lock table is empty".green());
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["Resource", "Role", "Locker", "Thread", "Lock type", "Elapsed (ms)"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Yellow))
                .collect::<Vec<_>>(),
        );
        for info in dump {
            let owners = info.owners.iter().map(|h| ("owner", h));
            let waiters = info.waiters.iter().map(|h| ("waiter", h));
            for (role, holder) in owners.chain(waiters) {
                table.add_row(vec![
                    Cell::new(info.rid),
                    Cell::new(role),
                    Cell::new(holder.locker_id),
                    Cell::new(&holder.thread_name),
                    Cell::new(holder.lock_type),
                    Cell::new(holder.elapsed_ms),
                ]);
            }
        }
        format!(
            "\n{}\n{}\n",
            format!("{} resources still locked", dump.len()).bold().red(),
            table
        )
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| {
            format!("{{\"status\": \"error\", \"error\": \"{}\"}}", e)
        })
    }
}
