use anyhow::Result;
use colored::*;
use ct_core::execution::TaskRunner;

pub async fn execute(runner: &TaskRunner, task_name: &str) -> Result<()> {
    let task = runner.task(task_name)?;
    let deps = runner.dependencies(&task)?;

    if deps.is_empty() {
        println!("{} {}", task.name.cyan(), "needs no external tools".dimmed());
        return Ok(());
    }

    runner
        .ensure_dependencies(&task)
        .await
        .map_err(|e| anyhow::anyhow!("{} failed: {}", task.name, e))?;

    for dep in &deps {
        println!("{} {} {}", "✓".green().bold(), dep.name.bold(), dep.description.dimmed());
    }
    Ok(())
}
