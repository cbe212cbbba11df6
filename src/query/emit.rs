//! Line-oriented wire format shared by every transport.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{GraphError, Result};
use crate::traversal::CancelToken;
use crate::types::ResultEntry;

/// Default number of entries packed into one `RESULT` line.
pub const DEFAULT_RESULTS_PER_LINE: usize = 50;

/// One protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Admission acknowledgement with the number of jobs ahead.
    Queued(usize),
    /// Progress while waiting: jobs ahead.
    Waiting(usize),
    /// Progress while computing: sizes of both result lists.
    Working(usize, usize),
    /// The worker picked the job up.
    ComputeStart,
    /// Batch of `id,depth,tag` triples joined by `|`.
    Result(String),
    /// Exact or estimated total number of matches.
    OutOf(u64),
    /// Seconds since the graph files were written.
    DbAge(u64),
    /// Path search found no path.
    NoPath,
    /// Terminal line.
    Done,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Queued(ahead) => write!(f, "QUEUED {ahead}"),
            Line::Waiting(ahead) => write!(f, "WAITING {ahead}"),
            Line::Working(a, b) => write!(f, "WORKING {a} {b}"),
            Line::ComputeStart => f.write_str("COMPUTE_START"),
            Line::Result(batch) => write!(f, "RESULT {batch}"),
            Line::OutOf(total) => write!(f, "OUTOF {total}"),
            Line::DbAge(secs) => write!(f, "DBAGE {secs}"),
            Line::NoPath => f.write_str("NOPATH"),
            Line::Done => f.write_str("DONE"),
        }
    }
}

/// Destination of a job's lines.
pub trait LineSink: Send + Sync {
    /// Delivers one line; `false` once the receiver is gone.
    fn send_line(&self, line: Line) -> bool;
}

impl LineSink for UnboundedSender<Line> {
    fn send_line(&self, line: Line) -> bool {
        self.send(line).is_ok()
    }
}

/// Sink collecting lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Arc<Mutex<Vec<Line>>>);

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything received so far.
    pub fn lines(&self) -> Vec<Line> {
        self.0.lock().clone()
    }

    /// Received lines rendered as text.
    pub fn rendered(&self) -> Vec<String> {
        self.0.lock().iter().map(ToString::to_string).collect()
    }
}

impl LineSink for MemorySink {
    fn send_line(&self, line: Line) -> bool {
        self.0.lock().push(line);
        true
    }
}

/// Batches result entries into `RESULT` lines.
///
/// A failed send cancels the job's token so the traversal stops at the next
/// check.
pub struct Emitter<'a> {
    sink: &'a dyn LineSink,
    cancel: &'a CancelToken,
    per_line: usize,
    batch: String,
    batched: usize,
    emitted: u64,
}

impl<'a> Emitter<'a> {
    /// Creates an emitter packing `per_line` entries per line (at least one).
    pub fn new(sink: &'a dyn LineSink, cancel: &'a CancelToken, per_line: usize) -> Self {
        Self {
            sink,
            cancel,
            per_line: per_line.max(1),
            batch: String::new(),
            batched: 0,
            emitted: 0,
        }
    }

    /// Sends a non-result line.
    pub fn line(&mut self, line: Line) -> Result<()> {
        if self.sink.send_line(line) {
            Ok(())
        } else {
            self.cancel.cancel();
            Err(GraphError::Cancelled)
        }
    }

    /// Queues one entry with its tag byte.
    pub fn push(&mut self, entry: ResultEntry, tag: u8) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let _ = write!(self.batch, "{},{},{}|", entry.id(), entry.depth(), tag);
        self.batched += 1;
        self.emitted += 1;
        if self.batched == self.per_line {
            self.flush()?;
        }
        Ok(())
    }

    /// Sends any partially filled batch.
    pub fn flush(&mut self) -> Result<()> {
        if self.batched == 0 {
            return Ok(());
        }
        self.batch.pop();
        let batch = std::mem::take(&mut self.batch);
        self.batched = 0;
        self.line(Line::Result(batch))
    }

    /// Entries pushed so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
