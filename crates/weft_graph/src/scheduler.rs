//! Cooperative task queue and the bounded job pool.
//!
//! Graph work runs single-threaded: tasks are drained in order and graph
//! mutation never interleaves mid-step. Only opaque computation bodies
//! leave that thread, dispatched to a bounded pool of job threads whose
//! results come back over a channel into the compute loop.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::debug;
use weft_common::Buffer;

use crate::expression::Expression;
use crate::ids::{CellId, ScellId, WorkerId};
use crate::worker::{ExecutionError, Executor, TransformationRecord};

/// A unit of graph work.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Task {
    /// Evaluate an expression and deliver its result to all holders.
    Evaluate(Expression),
    /// Re-check a worker whose inputs may now all be resolved.
    WorkerUpdate(WorkerId),
    /// Re-bind the downstream accessors of a changed cell.
    CellFanout(CellId),
    /// Re-join a structured cell whose channels changed.
    StructuredJoin(ScellId),
}

/// FIFO task queue with duplicate suppression.
///
/// Enqueueing a task already pending is a no-op; this is what makes N
/// simultaneous demands for one expression collapse into one evaluation.
#[derive(Default, Debug)]
pub struct TaskManager {
    queue: VecDeque<Task>,
    queued: HashSet<Task>,
}

impl TaskManager {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues a task unless an equal one is already pending.
    pub fn enqueue(&mut self, task: Task) {
        if self.queued.insert(task.clone()) {
            debug!(?task, "task enqueued");
            self.queue.push_back(task);
        }
    }

    /// Pops the next task.
    pub fn pop(&mut self) -> Option<Task> {
        let task = self.queue.pop_front()?;
        self.queued.remove(&task);
        Some(task)
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if no tasks are pending.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Shared hard-cancellation flag for one in-flight job.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A computation body handed to the pool.
#[derive(Debug)]
pub struct Job {
    /// Monotonic job id assigned by the manager.
    pub id: u64,
    /// The worker this job computes for.
    pub worker: WorkerId,
    /// The canonical execution description.
    pub record: TransformationRecord,
    /// Resolved input buffers by pin name.
    pub inputs: BTreeMap<String, Buffer>,
    /// Cancellation flag shared with the manager.
    pub cancel: CancelToken,
}

/// The result of one finished job.
#[derive(Debug)]
pub struct JobOutcome {
    /// The job id.
    pub id: u64,
    /// The worker the job computed for.
    pub worker: WorkerId,
    /// The produced buffer, or the failure.
    pub result: Result<Buffer, ExecutionError>,
}

/// Bounded pool of job threads.
///
/// Threads pull jobs from a shared channel and push outcomes back; the
/// pool shuts down when dropped, joining all threads.
pub struct JobPool {
    submit: Option<Sender<Job>>,
    results: Receiver<JobOutcome>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl JobPool {
    /// Spawns `size` job threads (at least one) running `executor`.
    pub fn new(size: usize, executor: Arc<dyn Executor>) -> Self {
        let (submit_tx, submit_rx) = channel::<Job>();
        let submit_rx = Arc::new(Mutex::new(submit_rx));
        let (result_tx, result_rx) = channel::<JobOutcome>();
        let mut handles = Vec::new();
        for i in 0..size.max(1) {
            let rx = Arc::clone(&submit_rx);
            let tx = result_tx.clone();
            let exec = Arc::clone(&executor);
            let builder = thread::Builder::new().name(format!("weft-job-{i}"));
            let handle = builder.spawn(move || loop {
                let job = {
                    let guard = match rx.lock() {
                        Ok(guard) => guard,
                        Err(_) => break,
                    };
                    match guard.recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    }
                };
                let result = if job.cancel.is_cancelled() {
                    Err(ExecutionError {
                        name: String::new(),
                        message: "cancelled before start".to_string(),
                        captured: String::new(),
                    })
                } else {
                    exec.execute(&job.record, &job.inputs, &job.cancel)
                };
                let outcome = JobOutcome {
                    id: job.id,
                    worker: job.worker,
                    result,
                };
                if tx.send(outcome).is_err() {
                    break;
                }
            });
            match handle {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    debug!(error = %e, "failed to spawn job thread");
                }
            }
        }
        Self {
            submit: Some(submit_tx),
            results: result_rx,
            handles,
        }
    }

    /// Submits a job. Silently dropped if the pool is shut down.
    pub fn submit(&self, job: Job) {
        if let Some(tx) = &self.submit {
            let _ = tx.send(job);
        }
    }

    /// Collects all outcomes available right now, without blocking.
    pub fn poll(&self) -> Vec<JobOutcome> {
        self.results.try_iter().collect()
    }

    /// Waits up to `timeout` for one outcome.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<JobOutcome> {
        self.results.recv_timeout(timeout).ok()
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        // closing the channel lets the threads drain and exit
        self.submit.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::FnExecutor;
    use weft_common::{CellType, Checksum};

    fn record() -> TransformationRecord {
        TransformationRecord {
            inputs: BTreeMap::new(),
            output_celltype: CellType::Plain,
            params: Checksum::from_bytes(b"code"),
            runtime: "test".to_string(),
        }
    }

    #[test]
    fn enqueue_deduplicates() {
        let mut tasks = TaskManager::new();
        let cell = CellId::from_parts(0, 0);
        tasks.enqueue(Task::CellFanout(cell));
        tasks.enqueue(Task::CellFanout(cell));
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks.pop(), Some(Task::CellFanout(cell)));
        assert!(tasks.pop().is_none());
    }

    #[test]
    fn popped_task_can_requeue() {
        let mut tasks = TaskManager::new();
        let cell = CellId::from_parts(0, 0);
        tasks.enqueue(Task::CellFanout(cell));
        tasks.pop();
        tasks.enqueue(Task::CellFanout(cell));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn pool_runs_jobs_and_returns_outcomes() {
        let executor = Arc::new(FnExecutor(
            |_: &TransformationRecord, _: &BTreeMap<String, Buffer>| {
                Ok(Buffer::from_text("done"))
            },
        ));
        let pool = JobPool::new(2, executor);
        for id in 0..4 {
            pool.submit(Job {
                id,
                worker: WorkerId::from_parts(0, 0),
                record: record(),
                inputs: BTreeMap::new(),
                cancel: CancelToken::new(),
            });
        }
        let mut received = 0;
        while received < 4 {
            if let Some(outcome) = pool.poll_timeout(Duration::from_secs(5)) {
                assert_eq!(outcome.result.unwrap().as_bytes(), b"done");
                received += 1;
            } else {
                panic!("job pool stalled");
            }
        }
    }

    #[test]
    fn cancelled_job_is_not_executed() {
        let executor = Arc::new(FnExecutor(
            |_: &TransformationRecord, _: &BTreeMap<String, Buffer>| {
                Ok(Buffer::from_text("ran"))
            },
        ));
        let pool = JobPool::new(1, executor);
        let cancel = CancelToken::new();
        cancel.cancel();
        pool.submit(Job {
            id: 0,
            worker: WorkerId::from_parts(0, 0),
            record: record(),
            inputs: BTreeMap::new(),
            cancel,
        });
        let outcome = pool.poll_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.result.is_err());
    }
}
