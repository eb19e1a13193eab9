//! Bounded worker pool
//!
//! A [`JobQueue`] runs submitted [`Job`]s on a fixed number of tokio workers and
//! publishes one [`RunResult`] per job on a shared channel, in completion order.
//!
//! Lifecycle: `new` → `start` → any number of `submit`s → `stop`. `stop` takes
//! the queue by value, so nothing can be submitted afterwards.
//!
//! Cancellation is cooperative. Idle workers exit as soon as the token fires and
//! pending submissions fail, but a job that is already running is left alone:
//! its work function receives the same token and is expected to wind down its
//! own process.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::results::RunResult;
use crate::types::{CtError, CtResult};

type WorkFuture = Pin<Box<dyn Future<Output = CtResult<RunResult>> + Send>>;
type WorkFn = Box<dyn FnOnce(CancellationToken) -> WorkFuture + Send>;

/// One unit of queued work
pub struct Job {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    work: WorkFn,
}

impl Job {
    pub fn new<F, Fut>(
        id: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        work: F,
    ) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = CtResult<RunResult>> + Send + 'static,
    {
        Self {
            id: id.into(),
            command: command.into(),
            args,
            work: Box::new(move |cancel| Box::pin(work(cancel))),
        }
    }

    /// Run the work function and fold any error into the record.
    ///
    /// An error always wins: the record is marked failed with the error's
    /// message even if the work function produced a successful-looking one.
    async fn run(self, cancel: CancellationToken) -> RunResult {
        let Job {
            id,
            command,
            args,
            work,
        } = self;

        let mut result = match work(cancel).await {
            Ok(result) => result,
            Err(err) => {
                let message = err.to_string();
                let mut result = err
                    .into_run_result()
                    .unwrap_or_else(|| RunResult::not_started(&id, &command, args, &message));
                result.mark_failed(message);
                result
            }
        };
        if result.id.is_empty() {
            result.id = id;
        }
        result
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// A job on its way to a worker.
///
/// Worker and submitter race to set `claimed`: a worker that wins runs the job
/// and acknowledges on `accepted`; a submitter that wins has withdrawn it.
struct Handoff {
    job: Job,
    claimed: Arc<AtomicBool>,
    accepted: oneshot::Sender<()>,
}

enum State {
    Created,
    Started {
        intake: mpsc::Sender<Handoff>,
        cancel: CancellationToken,
        workers: Vec<JoinHandle<()>>,
    },
}

/// Fixed-size pool of workers consuming jobs and publishing results
pub struct JobQueue {
    limit: usize,
    state: State,
    results_tx: mpsc::UnboundedSender<RunResult>,
    results_rx: Option<mpsc::UnboundedReceiver<RunResult>>,
}

impl JobQueue {
    /// Create a queue with `limit` workers. Anything below 1 means 1.
    pub fn new(limit: usize) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            limit: limit.max(1),
            state: State::Created,
            results_tx,
            results_rx: Some(results_rx),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The result stream. Can be taken once; it ends after [`JobQueue::stop`].
    pub fn results(&mut self) -> Option<mpsc::UnboundedReceiver<RunResult>> {
        self.results_rx.take()
    }

    /// Spawn the workers. Must be called from within a tokio runtime, once.
    pub fn start(&mut self, cancel: CancellationToken) -> CtResult<()> {
        if !matches!(self.state, State::Created) {
            return Err(CtError::Config("job queue already started".to_string()));
        }

        // Capacity 1 is the smallest tokio allows; `submit` still waits for a
        // worker to acknowledge before returning.
        let (intake, intake_rx) = mpsc::channel::<Handoff>(1);
        let intake_rx = Arc::new(Mutex::new(intake_rx));

        let workers = (0..self.limit)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&intake_rx),
                    self.results_tx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers = self.limit, "job queue started");
        self.state = State::Started {
            intake,
            cancel,
            workers,
        };
        Ok(())
    }

    /// Hand a job to the next idle worker, waiting until one takes it.
    ///
    /// Fails once the queue's cancellation token has fired. `Ok` means a worker
    /// took the job and will publish its result; [`CtError::Cancelled`] means
    /// the job will never run.
    pub async fn submit(&self, job: Job) -> CtResult<()> {
        let State::Started { intake, cancel, .. } = &self.state else {
            return Err(CtError::QueueNotRunning);
        };
        if cancel.is_cancelled() {
            return Err(CtError::Cancelled);
        }

        debug!(job = %job.id, "submitting job");
        let (accepted, ack) = oneshot::channel();
        let claimed = Arc::new(AtomicBool::new(false));
        let handoff = Handoff {
            job,
            claimed: Arc::clone(&claimed),
            accepted,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CtError::Cancelled),
            sent = intake.send(handoff) => {
                sent.map_err(|_| CtError::QueueNotRunning)?;
            }
        }

        tokio::select! {
            biased;
            acked = ack => acked.map_err(|_| CtError::Cancelled),
            _ = cancel.cancelled() => {
                // A worker may have claimed it in the meantime
                if claimed.swap(true, Ordering::AcqRel) {
                    Ok(())
                } else {
                    Err(CtError::Cancelled)
                }
            }
        }
    }

    /// Close intake, wait for in-flight jobs, then end the result stream
    pub async fn stop(self) {
        let JobQueue {
            state, results_tx, ..
        } = self;
        drop(results_tx);

        let State::Started {
            intake, workers, ..
        } = state
        else {
            return;
        };
        drop(intake);

        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker ended abnormally");
            }
        }
        info!("job queue stopped");
    }
}

async fn worker_loop(
    worker: usize,
    intake: Arc<Mutex<mpsc::Receiver<Handoff>>>,
    results: mpsc::UnboundedSender<RunResult>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(worker, "worker cancelled");
                return;
            }
            next = async { intake.lock().await.recv().await } => next,
        };

        let Some(Handoff {
            job,
            claimed,
            accepted,
        }) = next
        else {
            debug!(worker, "intake closed");
            return;
        };
        if claimed.swap(true, Ordering::AcqRel) {
            debug!(worker, job = %job.id, "job withdrawn by submitter");
            continue;
        }
        let _ = accepted.send(());

        let job_id = job.id.clone();
        debug!(worker, job = %job_id, "running job");
        let result = job.run(cancel.clone()).await;
        if results.send(result).is_err() {
            warn!(worker, job = %job_id, "result receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Status;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ok_result(id: &str) -> RunResult {
        let now = Utc::now();
        RunResult::finished(
            "echo",
            vec![id.to_string()],
            now,
            now,
            0,
            id.to_string(),
            String::new(),
            None,
        )
        .with_id(id)
    }

    fn sleeper(id: usize, running: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Job {
        let name = format!("job-{}", id);
        Job::new(name.clone(), "sleep", vec![], move |_cancel| async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(ok_result(&name))
        })
    }

    #[test]
    fn test_limit_clamped_to_one() {
        assert_eq!(JobQueue::new(0).limit(), 1);
        assert_eq!(JobQueue::new(3).limit(), 3);
    }

    #[tokio::test]
    async fn test_submit_before_start_fails() {
        let queue = JobQueue::new(2);
        let job = Job::new("a", "echo", vec![], |_| async { Ok(ok_result("a")) });
        assert!(matches!(queue.submit(job).await, Err(CtError::QueueNotRunning)));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let mut queue = JobQueue::new(1);
        queue.start(CancellationToken::new()).unwrap();
        assert!(queue.start(CancellationToken::new()).is_err());
        queue.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_parallelism_delivers_every_result() {
        let mut queue = JobQueue::new(3);
        let mut results = queue.results().unwrap();
        queue.start(CancellationToken::new()).unwrap();

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for id in 0..10 {
            queue
                .submit(sleeper(id, running.clone(), peak.clone()))
                .await
                .unwrap();
        }
        queue.stop().await;

        let mut ids = Vec::new();
        while let Some(result) = results.recv().await {
            assert_eq!(result.status, Status::Success);
            ids.push(result.id);
        }
        ids.sort();
        let mut expected: Vec<_> = (0..10).map(|i| format!("job-{}", i)).collect();
        expected.sort();
        assert_eq!(ids, expected);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_job_error_wins_over_successful_record() {
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(CancellationToken::new()).unwrap();

        let job = Job::new("dns-1", "python3", vec![], |_| async {
            Err(CtError::Execution {
                program: "python3".to_string(),
                result: Box::new(ok_result("dns-1")),
            })
        });
        queue.submit(job).await.unwrap();
        queue.stop().await;

        let result = results.recv().await.unwrap();
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.stdout, "dns-1");
        assert!(result.error.unwrap().contains("python3 runner failed"));
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_error_without_record_still_publishes() {
        let mut queue = JobQueue::new(2);
        let mut results = queue.results().unwrap();
        queue.start(CancellationToken::new()).unwrap();

        let job = Job::new("osint-7", "python3", vec!["osint_domain.py".to_string()], |_| async {
            Err(CtError::NotFound("plugins/python/osint_domain.py".into()))
        });
        queue.submit(job).await.unwrap();
        queue.stop().await;

        let result = results.recv().await.unwrap();
        assert_eq!(result.id, "osint-7");
        assert_eq!(result.command, "python3");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.status, Status::Failed);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_missing_id_filled_from_job() {
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(CancellationToken::new()).unwrap();

        let job = Job::new("recon-3", "python3", vec![], |_| async {
            let mut result = ok_result("");
            result.id.clear();
            Ok(result)
        });
        queue.submit(job).await.unwrap();
        queue.stop().await;
        assert_eq!(results.recv().await.unwrap().id, "recon-3");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_rejects_new_jobs_but_finishes_running_ones() {
        let cancel = CancellationToken::new();
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(cancel.clone()).unwrap();

        let (started_tx, started_rx) = oneshot::channel();
        let running = Job::new("long", "sleep", vec![], move |_cancel| async move {
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(ok_result("long"))
        });
        queue.submit(running).await.unwrap();
        started_rx.await.unwrap();

        cancel.cancel();
        let late = Job::new("late", "echo", vec![], |_| async { Ok(ok_result("late")) });
        assert!(matches!(queue.submit(late).await, Err(CtError::Cancelled)));

        queue.stop().await;
        let result = results.recv().await.unwrap();
        assert_eq!(result.id, "long");
        assert_eq!(result.status, Status::Success);
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_work_function_sees_cancellation() {
        let cancel = CancellationToken::new();
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(cancel.clone()).unwrap();

        let job = Job::new("watch", "sleep", vec![], |token: CancellationToken| async move {
            token.cancelled().await;
            Err(CtError::Cancelled)
        });
        queue.submit(job).await.unwrap();
        cancel.cancel();
        queue.stop().await;

        let result = results.recv().await.unwrap();
        assert_eq!(result.status, Status::Failed);
        assert_eq!(result.error.as_deref(), Some("job queue was cancelled"));
    }

    fn held(id: &'static str, release: oneshot::Receiver<()>) -> Job {
        Job::new(id, "sleep", vec![], move |_cancel| async move {
            let _ = release.await;
            Ok(ok_result(id))
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_waits_for_idle_worker() {
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(CancellationToken::new()).unwrap();

        let (release_first, first_rx) = oneshot::channel();
        queue.submit(held("first", first_rx)).await.unwrap();

        let (release_second, second_rx) = oneshot::channel();
        let mut second = Box::pin(queue.submit(held("second", second_rx)));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut second)
                .await
                .is_err(),
            "submit returned while the only worker was busy"
        );

        release_first.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .unwrap()
            .unwrap();
        release_second.send(()).unwrap();
        queue.stop().await;

        let mut ids = Vec::new();
        while let Some(result) = results.recv().await {
            ids.push(result.id);
        }
        assert_eq!(ids, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_submit_never_runs_the_job() {
        let cancel = CancellationToken::new();
        let mut queue = JobQueue::new(1);
        let mut results = queue.results().unwrap();
        queue.start(cancel.clone()).unwrap();

        let (release_first, first_rx) = oneshot::channel();
        queue.submit(held("first", first_rx)).await.unwrap();

        let (_release_second, second_rx) = oneshot::channel();
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
            release_first.send(()).unwrap();
        };
        let (submitted, ()) = tokio::join!(queue.submit(held("second", second_rx)), canceller);
        assert!(matches!(submitted, Err(CtError::Cancelled)));

        queue.stop().await;
        let mut ids = Vec::new();
        while let Some(result) = results.recv().await {
            ids.push(result.id);
        }
        assert_eq!(ids, vec!["first".to_string()]);
    }
}
