use anyhow::Result;
use colored::*;
use ct_core::execution::TaskRunner;

use crate::commands::cancel_on_interrupt;
use crate::output::{emit_json, print_summary};

pub async fn execute(
    runner: &TaskRunner,
    task_name: &str,
    targets: Vec<String>,
    concurrency: Option<usize>,
    json: bool,
) -> Result<()> {
    let task = runner.task(task_name)?;
    let json = json || runner.config().output.json;
    let concurrency = concurrency.unwrap_or(runner.config().concurrency);

    if !json {
        println!(
            "{} {} {}",
            "Running task".bold(),
            task_name.cyan(),
            format!("on {} targets", targets.len()).bright_black()
        );
        println!();
    }

    runner
        .ensure_dependencies(&task)
        .await
        .map_err(|e| anyhow::anyhow!("batch failed: {}", e))?;

    let cancel = cancel_on_interrupt();

    let mut emit_error = None;
    let results = runner
        .run_batch(task_name, &targets, &[], concurrency, cancel.clone(), |result| {
            if json {
                if let Err(e) = emit_json(result) {
                    if emit_error.is_none() {
                        emit_error = Some(e);
                    }
                }
            } else {
                let label = result.args.get(1).map(String::as_str).unwrap_or(&result.id);
                print_summary(label, result);
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("batch failed: {}", e))?;

    if let Some(e) = emit_error {
        return Err(e);
    }

    let failed = results.iter().filter(|r| !r.is_success()).count();
    let skipped = targets.len().saturating_sub(results.len());

    if !json {
        println!();
        if failed == 0 && skipped == 0 {
            println!(
                "{} {}",
                "✓".green().bold(),
                "All jobs completed successfully!".green().bold()
            );
        }
    }

    if cancel.is_cancelled() && skipped > 0 {
        return Err(anyhow::anyhow!("batch cancelled, {} targets not run", skipped));
    }
    if failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} jobs failed",
            failed,
            results.len()
        ));
    }
    Ok(())
}
