use anyhow::Result;
use ct_core::execution::TaskRunner;

use crate::commands::cancel_on_interrupt;
use crate::output::emit_json;

pub async fn execute(runner: &TaskRunner, task_name: &str, args: Vec<String>) -> Result<()> {
    let task = runner.task(task_name)?;
    let (args, json_flag) = split_json_flag(args);
    let json = json_flag || runner.config().output.json;

    if args.is_empty() || is_help(&args) {
        let usage = task
            .usage
            .clone()
            .unwrap_or_else(|| format!("ct run {} <target> [--json]", task.name));
        eprintln!("usage: {}", usage);
        return Ok(());
    }

    runner
        .ensure_dependencies(&task)
        .await
        .map_err(|e| anyhow::anyhow!("{} failed: {}", task.name, e))?;

    let cancel = cancel_on_interrupt();
    let outcome = runner
        .run(&task, &args, runner.run_options(!json, Some(cancel)))
        .await;

    if json {
        match &outcome {
            Ok(result) => emit_json(result)?,
            Err(e) => {
                if let Some(result) = e.run_result() {
                    emit_json(result)?;
                }
            }
        }
    }

    outcome
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("{} failed: {}", task.name, e))
}

/// Pull `--json` out of the script arguments
fn split_json_flag(args: Vec<String>) -> (Vec<String>, bool) {
    let mut json = false;
    let args = args
        .into_iter()
        .filter(|arg| {
            if arg == "--json" {
                json = true;
                false
            } else {
                true
            }
        })
        .collect();
    (args, json)
}

fn is_help(args: &[String]) -> bool {
    args.iter().any(|arg| arg == "-h" || arg == "--help")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_json_flag_anywhere() {
        let (args, json) = split_json_flag(strings(&["example.com", "--json", "--ports", "80"]));
        assert!(json);
        assert_eq!(args, strings(&["example.com", "--ports", "80"]));
    }

    #[test]
    fn test_no_json_flag() {
        let (args, json) = split_json_flag(strings(&["example.com"]));
        assert!(!json);
        assert_eq!(args, strings(&["example.com"]));
    }

    #[test]
    fn test_is_help() {
        assert!(is_help(&strings(&["-h"])));
        assert!(is_help(&strings(&["example.com", "--help"])));
        assert!(!is_help(&strings(&["--ports", "22"])));
    }
}
