use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{error, info, warn};

use crate::error::{GraphError, Result};
use crate::jobs::{Job, JobQueue, JobStatus};
use crate::query::{find_path, set_ops, Emitter, Line, Query, QueryKind, TagIndex};
use crate::storage::GraphStore;
use crate::traversal::{fetch_files, ProgressSlot, Scratch, TraversalProgress};
use crate::types::ResultEntry;

/// Executes jobs one at a time against a shared graph.
///
/// The worker exclusively owns its [`Scratch`]; running several workers
/// means giving each its own.
#[derive(Debug)]
pub struct Worker {
    store: Arc<GraphStore>,
    tags: Arc<TagIndex>,
    scratch: Scratch,
    results_per_line: usize,
}

impl Worker {
    /// Allocates scratch space sized for `store`.
    pub fn new(
        store: Arc<GraphStore>,
        tags: Arc<TagIndex>,
        initial_result_capacity: usize,
        results_per_line: usize,
    ) -> Self {
        let scratch = Scratch::new(store.max_node(), initial_result_capacity);
        Self {
            store,
            tags,
            scratch,
            results_per_line,
        }
    }

    /// Live result-list sizes for the notifier.
    pub fn progress(&self) -> Arc<TraversalProgress> {
        self.scratch.progress()
    }

    /// Runs the worker loop on a dedicated thread.
    pub fn spawn(self, queue: Arc<JobQueue>) -> io::Result<JoinHandle<Result<()>>> {
        thread::Builder::new()
            .name("catgraph-worker".into())
            .spawn(move || self.run(&queue))
    }

    /// Drains `queue` until it shuts down or a fatal error occurs.
    ///
    /// Cancelled jobs are finished and skipped. Any other error shuts the
    /// queue down and is returned.
    pub fn run(mut self, queue: &JobQueue) -> Result<()> {
        while let Some(job) = queue.next_job() {
            let outcome = self.execute(&job);
            job.set_status(JobStatus::Done);
            queue.finish(&job);
            match outcome {
                Ok(()) => {}
                Err(GraphError::Cancelled) => warn!(job = job.id(), "client gone; job cancelled"),
                Err(err) => {
                    error!(job = job.id(), error = %err, "worker stopped");
                    queue.shutdown();
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Runs one job through PREPROCESS, COMPUTING and STREAMING, writing
    /// every protocol line to its sink. The caller marks it DONE.
    pub fn execute(&mut self, job: &Job) -> Result<()> {
        let started = Instant::now();
        let query = *job.query();
        let cancel = job.cancel_token();
        let mut out = Emitter::new(job.sink(), cancel, self.results_per_line);

        out.line(Line::ComputeStart)?;
        job.set_status(JobStatus::Preprocess);
        let progress = self.scratch.progress();
        progress.reset();
        let lists = if query.kind.needs_second_list() { 2 } else { 1 };
        for list in self.scratch.lists.iter_mut().take(lists) {
            list.clear();
        }

        let result = if query.kind == QueryKind::Path {
            self.path(job, &query, &mut out)
        } else {
            self.traverse(job, &query, lists, &mut out)
        };
        self.scratch.shrink();
        result?;

        out.line(Line::DbAge(self.store.age_secs()))?;
        out.line(Line::Done)?;
        info!(
            job = job.id(),
            kind = %query.kind,
            emitted = out.emitted(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "job finished"
        );
        Ok(())
    }

    fn traverse(
        &mut self,
        job: &Job,
        query: &Query,
        lists: usize,
        out: &mut Emitter<'_>,
    ) -> Result<()> {
        job.set_status(JobStatus::Computing);
        let progress = self.scratch.progress();
        let roots = [(query.c1, query.depth1), (query.c2, query.depth2)];
        let Scratch {
            ring,
            lists: pooled,
            ..
        } = &mut self.scratch;
        for (slot, (list, &(root, depth))) in pooled.iter_mut().zip(&roots).take(lists).enumerate() {
            fetch_files(
                &self.store,
                root,
                depth,
                ring,
                list,
                job.cancel_token(),
                Some(ProgressSlot {
                    progress: &progress,
                    slot,
                }),
            )?;
        }

        job.set_status(JobStatus::Streaming);
        let [first, second] = &self.scratch.lists;
        let outcome = match query.kind {
            QueryKind::List => set_ops::list(first, query.window, &self.tags, out)?,
            QueryKind::And => set_ops::intersect(first, second, query.window, &self.tags, out)?,
            QueryKind::Not => set_ops::difference(first, second, query.window, &self.tags, out)?,
            QueryKind::Fqv => set_ops::fqv(first, query.window, &self.tags, out)?,
            QueryKind::Path => {
                return Err(GraphError::InvalidArgument(
                    "path query routed to traversal".into(),
                ))
            }
        };
        out.line(Line::OutOf(outcome.total.value()))
    }

    fn path(&mut self, job: &Job, query: &Query, out: &mut Emitter<'_>) -> Result<()> {
        job.set_status(JobStatus::Computing);
        let found = find_path(
            &self.store,
            query.c1,
            query.c2,
            query.depth1,
            &mut self.scratch,
            job.cancel_token(),
        )?;
        job.set_status(JobStatus::Streaming);
        match found {
            Some(path) => {
                for (hop, &id) in path.iter().enumerate() {
                    out.push(ResultEntry::new(id, hop as u32), 0)?;
                }
                out.flush()
            }
            None => out.line(Line::NoPath),
        }
    }
}
