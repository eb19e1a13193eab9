//! High-level task runner
//!
//! Turns a task name and its arguments into a finished [`RunResult`]: look the
//! task up, gate on its host dependencies, run its script, stamp the record
//! with an ID. Batches of targets fan out over a [`JobQueue`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::configs::settings::Config;
use crate::configs::tasks::TaskConfig;
use crate::execution::command::{CommandExecutor, RunOptions};
use crate::execution::dependencies::{Dependency, DependencyResolver};
use crate::execution::queue::{Job, JobQueue};
use crate::results::RunResult;
use crate::tasks::{all_tasks, dependencies_for, find_task};
use crate::types::{CtError, CtResult};

/// Runs catalog tasks using the loaded settings
#[derive(Debug, Clone)]
pub struct TaskRunner {
    config: Arc<Config>,
    executor: CommandExecutor,
}

impl TaskRunner {
    /// Runner with an executor whose fallback interpreter comes from the
    /// environment
    pub fn new(config: Config) -> Self {
        Self::with_executor(config, CommandExecutor::from_env())
    }

    pub fn with_executor(config: Config, executor: CommandExecutor) -> Self {
        Self {
            config: Arc::new(config),
            executor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tasks(&self) -> Vec<TaskConfig> {
        all_tasks(&self.config)
    }

    pub fn task(&self, name: &str) -> CtResult<TaskConfig> {
        find_task(&self.config, name)
    }

    pub fn dependencies(&self, task: &TaskConfig) -> CtResult<Vec<Dependency>> {
        dependencies_for(task, &self.config.paths)
    }

    pub fn script_path(&self, task: &TaskConfig) -> PathBuf {
        self.config.paths.plugins.join(&task.script)
    }

    /// Options for one run: interpreter and deadline from the settings
    pub fn run_options(&self, stream: bool, cancel: Option<CancellationToken>) -> RunOptions {
        RunOptions {
            stream,
            interpreter: self.config.paths.python.clone(),
            timeout: self.config.timeouts.command_timeout(),
            cancel,
        }
    }

    /// Check the task's dependencies on this machine, prompting on the console
    /// for anything missing.
    ///
    /// Runs on the blocking pool since it waits on standard input.
    pub async fn ensure_dependencies(&self, task: &TaskConfig) -> CtResult<()> {
        let deps = self.dependencies(task)?;
        if deps.is_empty() {
            return Ok(());
        }
        tokio::task::spawn_blocking(move || DependencyResolver::interactive().ensure(&deps))
            .await
            .map_err(|e| CtError::Io(std::io::Error::other(e)))?
    }

    /// Dependency gate followed by the script run
    pub async fn dispatch(
        &self,
        task_name: &str,
        args: &[String],
        stream: bool,
        cancel: Option<CancellationToken>,
    ) -> CtResult<RunResult> {
        let task = self.task(task_name)?;
        self.ensure_dependencies(&task).await?;
        self.run(&task, args, self.run_options(stream, cancel)).await
    }

    /// Run a task's script without checking dependencies.
    ///
    /// The returned record, or the one inside an execution error, carries a
    /// fresh task ID.
    pub async fn run(
        &self,
        task: &TaskConfig,
        args: &[String],
        opts: RunOptions,
    ) -> CtResult<RunResult> {
        self.run_as(result_id(&task.name), task, args, opts).await
    }

    #[instrument(skip(self, task, opts), fields(task = %task.name))]
    async fn run_as(
        &self,
        id: String,
        task: &TaskConfig,
        args: &[String],
        opts: RunOptions,
    ) -> CtResult<RunResult> {
        let script = self.script_path(task);
        match self.executor.run_script(&script, args, &opts).await {
            Ok(result) => Ok(result.with_id(id)),
            Err(CtError::Execution { program, result }) => Err(CtError::Execution {
                program,
                result: Box::new((*result).with_id(id)),
            }),
            Err(e) => Err(e),
        }
    }

    /// Queue job running `task` against a single target
    pub fn job(&self, task: &TaskConfig, args: Vec<String>) -> Job {
        let runner = self.clone();
        let task = task.clone();
        let id = result_id(&task.name);
        let command = self.executor.interpreter_for(&self.run_options(false, None));
        let mut argv = vec![self.script_path(&task).to_string_lossy().into_owned()];
        argv.extend(args.iter().cloned());

        Job::new(id.clone(), command, argv, move |cancel| async move {
            let opts = runner.run_options(false, Some(cancel));
            runner.run_as(id, &task, &args, opts).await
        })
    }

    /// Run `task` once per target with at most `concurrency` at a time.
    ///
    /// Like [`TaskRunner::run`] this does not check dependencies; callers run
    /// [`TaskRunner::ensure_dependencies`] once beforehand. `on_result` sees
    /// each record as it completes; all records are returned in completion
    /// order.
    pub async fn run_batch<F>(
        &self,
        task_name: &str,
        targets: &[String],
        extra_args: &[String],
        concurrency: usize,
        cancel: CancellationToken,
        mut on_result: F,
    ) -> CtResult<Vec<RunResult>>
    where
        F: FnMut(&RunResult),
    {
        let task = self.task(task_name)?;

        let mut queue = JobQueue::new(concurrency);
        let mut results_rx = queue
            .results()
            .ok_or_else(|| CtError::Config("job queue results already taken".to_string()))?;
        queue.start(cancel.clone())?;
        info!(
            task = %task.name,
            targets = targets.len(),
            workers = queue.limit(),
            "starting batch"
        );

        let jobs: Vec<Job> = targets
            .iter()
            .map(|target| {
                let mut args = vec![target.clone()];
                args.extend(extra_args.iter().cloned());
                self.job(&task, args)
            })
            .collect();

        let submitter = async move {
            let mut outcome = Ok(());
            for job in jobs {
                if let Err(e) = queue.submit(job).await {
                    outcome = Err(e);
                    break;
                }
            }
            queue.stop().await;
            outcome
        };

        let collector = async {
            let mut results = Vec::with_capacity(targets.len());
            while let Some(result) = results_rx.recv().await {
                on_result(&result);
                results.push(result);
            }
            results
        };

        let (submitted, results) = tokio::join!(submitter, collector);
        match submitted {
            Ok(()) | Err(CtError::Cancelled) => Ok(results),
            Err(e) => Err(e),
        }
    }
}

/// Last timestamp handed out by [`result_id`]
static LAST_ID_NANOS: AtomicI64 = AtomicI64::new(0);

/// `<task>-<unix nanoseconds>`.
///
/// The timestamp is bumped past the previous one when the clock has not moved,
/// so IDs stay unique on hosts with coarse clocks.
pub fn result_id(task: &str) -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let previous = LAST_ID_NANOS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    format!("{}-{}", task, now.max(previous.saturating_add(1)))
}
