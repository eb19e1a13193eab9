//! Terminal presentation helpers

use anyhow::Result;
use colored::*;
use ct_core::RunResult;

/// Get a consistent color for a task label
pub fn get_task_color(label: &str) -> Color {
    let hash = label
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

    // Label colors that stay clear of the red/green used for status
    let colors = [
        Color::TrueColor {
            r: 147,
            g: 112,
            b: 219,
        },
        Color::TrueColor {
            r: 64,
            g: 224,
            b: 208,
        },
        Color::TrueColor {
            r: 255,
            g: 140,
            b: 0,
        },
        Color::TrueColor {
            r: 199,
            g: 21,
            b: 133,
        },
        Color::TrueColor {
            r: 138,
            g: 43,
            b: 226,
        },
    ];

    colors[(hash % colors.len() as u64) as usize]
}

/// Pretty JSON on stdout, one record at a time
pub fn emit_json(result: &RunResult) -> Result<()> {
    println!("{}", result.to_pretty_json()?);
    Ok(())
}

/// One-line summary of a finished record
pub fn print_summary(label: &str, result: &RunResult) {
    let label = label.color(get_task_color(label)).bold();
    let timing = format!("({}ms)", result.duration_ms).bright_black();
    if result.is_success() {
        println!("{} {} {}", "✓".green().bold(), label, timing);
    } else {
        println!(
            "{} {} {} {}",
            "✗".red().bold(),
            label,
            timing,
            result.error.as_deref().unwrap_or("failed").red()
        );
    }
}
