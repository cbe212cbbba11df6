//! Bounded FIFO of admitted queries, drained by a single worker.
//!
//! Admission never blocks: a full queue rejects immediately. The job being
//! executed stays at the front until the worker reports it finished, so the
//! queue length always counts it.

mod notifier;
mod worker;

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::query::{Line, LineSink, Query, Rejection};
use crate::traversal::{CancelToken, TraversalProgress};

pub use notifier::{spawn_notifier, DEFAULT_NOTIFY_INTERVAL};
pub use worker::Worker;

/// Default admission capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Lifecycle of a job; transitions only move forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted, not yet picked up.
    Waiting,
    /// Scratch state is being reset.
    Preprocess,
    /// Traversal or path search running.
    Computing,
    /// Result lines are being emitted.
    Streaming,
    /// Terminal.
    Done,
}

/// One admitted query with its output sink.
pub struct Job {
    id: u64,
    query: Query,
    sink: Arc<dyn LineSink>,
    cancel: CancelToken,
    status: watch::Sender<JobStatus>,
    // false once streaming began; held across progress sends
    progress_open: Mutex<bool>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("query", &self.query)
            .field("status", &self.status())
            .finish()
    }
}

static DETACHED_IDS: AtomicU64 = AtomicU64::new(1 << 63);

impl Job {
    fn new(id: u64, query: Query, sink: Arc<dyn LineSink>) -> Self {
        let (status, _) = watch::channel(JobStatus::Waiting);
        Self {
            id,
            query,
            sink,
            cancel: CancelToken::new(),
            status,
            progress_open: Mutex::new(true),
        }
    }

    /// A job that bypasses the queue, for offline execution.
    pub fn detached(query: Query, sink: Arc<dyn LineSink>) -> Self {
        Self::new(DETACHED_IDS.fetch_add(1, Ordering::Relaxed), query, sink)
    }

    /// Queue-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The validated query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Output sink.
    pub fn sink(&self) -> &dyn LineSink {
        self.sink.as_ref()
    }

    /// Cancellation token shared with the connection.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Advances the status; backward moves are ignored.
    ///
    /// Moving to [`JobStatus::Streaming`] waits for an in-flight progress
    /// line and closes the job to further ones, so none can follow the
    /// results or `DONE`.
    pub fn set_status(&self, next: JobStatus) {
        let mut progress_open = self.progress_open.lock();
        if next >= JobStatus::Streaming {
            *progress_open = false;
        }
        let advanced = self.status.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        drop(progress_open);
        if advanced {
            debug!(job = self.id, status = ?next, "job status");
        }
    }

    /// Subscribes to status transitions.
    pub fn subscribe(&self) -> watch::Receiver<JobStatus> {
        self.status.subscribe()
    }

    fn send(&self, line: Line) {
        if !self.sink.send_line(line) {
            self.cancel.cancel();
        }
    }

    /// Sends a progress line unless the job started streaming.
    fn send_progress(&self, line: Line) -> bool {
        let progress_open = self.progress_open.lock();
        if *progress_open {
            self.send(line);
        }
        *progress_open
    }
}

/// Handle returned to the submitter.
#[derive(Debug)]
pub struct JobTicket {
    /// Queue-assigned id.
    pub id: u64,
    /// Jobs ahead at admission, including a running one.
    pub ahead: usize,
    /// Status updates.
    pub status: watch::Receiver<JobStatus>,
    /// Cancels the job.
    pub cancel: CancelToken,
}

impl JobTicket {
    /// Waits until the job reaches [`JobStatus::Done`].
    pub async fn done(&mut self) {
        let _ = self.status.wait_for(|status| *status == JobStatus::Done).await;
    }
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Arc<Job>>,
    next_id: u64,
    shutdown: bool,
}

/// Bounded job queue shared by connections, the worker and the notifier.
pub struct JobQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    capacity: usize,
    stopped: watch::Sender<bool>,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("depth", &self.depth())
            .finish()
    }
}

impl JobQueue {
    /// Creates a queue admitting at most `capacity` jobs (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            capacity: capacity.max(1),
            stopped: watch::channel(false).0,
        }
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Jobs admitted and not yet finished.
    pub fn depth(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether [`JobQueue::shutdown`] was called.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Flips to `true` when the queue shuts down.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.stopped.subscribe()
    }

    /// Admits `query`, sending `QUEUED <ahead>` before the worker can see it.
    ///
    /// # Errors
    ///
    /// [`Rejection::QueueFull`] when `capacity` jobs are pending or the
    /// queue is shut down.
    pub fn submit(&self, query: Query, sink: Arc<dyn LineSink>) -> Result<JobTicket, Rejection> {
        let mut state = self.state.lock();
        if state.shutdown || state.jobs.len() >= self.capacity {
            return Err(Rejection::QueueFull {
                capacity: self.capacity,
            });
        }
        let id = state.next_id;
        state.next_id += 1;
        let job = Arc::new(Job::new(id, query, sink));
        let ahead = state.jobs.len();
        job.send(Line::Queued(ahead));
        let ticket = JobTicket {
            id,
            ahead,
            status: job.subscribe(),
            cancel: job.cancel.clone(),
        };
        state.jobs.push_back(job);
        drop(state);
        self.ready.notify_one();
        debug!(job = id, ahead, kind = %query.kind, "job admitted");
        Ok(ticket)
    }

    /// Blocks until a job is at the front; `None` after shutdown.
    pub fn next_job(&self) -> Option<Arc<Job>> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(job) = state.jobs.front() {
                return Some(Arc::clone(job));
            }
            self.ready.wait(&mut state);
        }
    }

    /// Removes `job` from the front once the worker is done with it.
    pub fn finish(&self, job: &Job) {
        let mut state = self.state.lock();
        if state.jobs.front().map(|front| front.id) == Some(job.id) {
            state.jobs.pop_front();
        }
    }

    /// Pushes `WAITING <ahead>` or `WORKING <a> <b>` to every job that has
    /// not started streaming.
    pub fn broadcast_progress(&self, progress: &TraversalProgress) {
        let state = self.state.lock();
        for (ahead, job) in state.jobs.iter().enumerate() {
            let line = match job.status() {
                JobStatus::Waiting => Line::Waiting(ahead),
                JobStatus::Preprocess | JobStatus::Computing => {
                    let (a, b) = progress.snapshot();
                    Line::Working(a, b)
                }
                JobStatus::Streaming | JobStatus::Done => continue,
            };
            job.send_progress(line);
        }
    }

    /// Stops the worker and notifier, refuses new jobs and drops pending
    /// ones so their sinks close.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        for job in state.jobs.drain(..) {
            job.cancel.cancel();
        }
        drop(state);
        self.ready.notify_all();
        self.stopped.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{MemorySink, QueryKind, Window};

    fn query() -> Query {
        Query {
            kind: QueryKind::List,
            c1: 1,
            c2: 1,
            depth1: None,
            depth2: None,
            window: Window::new(0, 10),
        }
    }

    #[test]
    fn rejects_when_full_and_reports_ahead() {
        let queue = JobQueue::new(2);
        let sink = MemorySink::new();
        let first = queue.submit(query(), Arc::new(sink.clone())).unwrap();
        let second = queue.submit(query(), Arc::new(sink.clone())).unwrap();
        assert_eq!((first.ahead, second.ahead), (0, 1));
        assert_eq!(
            queue.submit(query(), Arc::new(sink.clone())).unwrap_err(),
            Rejection::QueueFull { capacity: 2 }
        );
        assert_eq!(sink.rendered(), vec!["QUEUED 0", "QUEUED 1"]);
    }

    #[test]
    fn front_stays_until_finished() {
        let queue = JobQueue::new(4);
        queue.submit(query(), Arc::new(MemorySink::new())).unwrap();
        queue.submit(query(), Arc::new(MemorySink::new())).unwrap();
        let a = queue.next_job().unwrap();
        assert_eq!(queue.next_job().unwrap().id(), a.id());
        queue.finish(&a);
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.next_job().unwrap().id(), a.id() + 1);
    }

    #[test]
    fn progress_lines_depend_on_status() {
        let queue = JobQueue::new(4);
        let running = MemorySink::new();
        let waiting = MemorySink::new();
        queue.submit(query(), Arc::new(running.clone())).unwrap();
        queue.submit(query(), Arc::new(waiting.clone())).unwrap();
        queue.next_job().unwrap().set_status(JobStatus::Computing);
        let progress = TraversalProgress::default();
        progress.set(0, 12);
        queue.broadcast_progress(&progress);
        assert_eq!(running.rendered().last().unwrap(), "WORKING 12 0");
        assert_eq!(waiting.rendered().last().unwrap(), "WAITING 1");
    }

    #[test]
    fn streaming_closes_progress() {
        let sink = MemorySink::new();
        let job = Job::detached(query(), Arc::new(sink.clone()));
        job.set_status(JobStatus::Computing);
        assert!(job.send_progress(Line::Working(1, 0)));
        job.set_status(JobStatus::Streaming);
        assert!(!job.send_progress(Line::Working(2, 0)));
        assert_eq!(sink.rendered(), vec!["WORKING 1 0"]);
    }

    #[tokio::test]
    async fn shutdown_flips_stopped() {
        let queue = JobQueue::new(1);
        let mut stopped = queue.stopped();
        assert!(!*stopped.borrow());
        queue.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), stopped.wait_for(|s| *s))
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn status_never_moves_backward() {
        let job = Job::detached(query(), Arc::new(MemorySink::new()));
        job.set_status(JobStatus::Streaming);
        job.set_status(JobStatus::Computing);
        assert_eq!(job.status(), JobStatus::Streaming);
    }

    #[test]
    fn shutdown_releases_waiting_worker() {
        let queue = Arc::new(JobQueue::new(1));
        let waiter = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.next_job().is_none())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.shutdown();
        assert!(waiter.join().unwrap());
        assert!(queue.submit(query(), Arc::new(MemorySink::new())).is_err());
    }
}
