use anyhow::Result;
use colored::*;
use ct_core::execution::TaskRunner;

use crate::output::get_task_color;

pub fn execute(runner: &TaskRunner) -> Result<()> {
    println!("{}", "Tasks".bold().underline());

    let tasks = runner.tasks();
    if tasks.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(());
    }

    for task in tasks {
        let needs = if task.dependencies.is_empty() {
            String::new()
        } else {
            format!("[needs {}]", task.dependencies.join(", "))
        };
        println!(
            "  {:<10} {} {}",
            task.name.color(get_task_color(&task.name)).bold(),
            task.description.as_deref().unwrap_or("").dimmed(),
            needs.bright_black()
        );
    }

    Ok(())
}
