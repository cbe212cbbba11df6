use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::traversal::result_list::ResultList;
use crate::traversal::ring::RingBuffer;
use crate::types::{NodeId, ResultEntry};

const INITIAL_RING_CAPACITY: usize = 1 << 16;

/// Shared cancellation flag, checked once per popped node and per emitted
/// entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Live sizes of the two pooled result lists, read by the progress notifier.
#[derive(Debug, Default)]
pub struct TraversalProgress {
    sizes: [AtomicUsize; 2],
}

impl TraversalProgress {
    /// Records the entry count of list `slot`.
    #[inline]
    pub fn set(&self, slot: usize, len: usize) {
        if let Some(size) = self.sizes.get(slot) {
            size.store(len, Ordering::Relaxed);
        }
    }

    /// Both entry counts.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.sizes[0].load(Ordering::Relaxed),
            self.sizes[1].load(Ordering::Relaxed),
        )
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.set(0, 0);
        self.set(1, 0);
    }
}

/// Per-worker traversal state reused across jobs.
///
/// Owned by exactly one worker; nothing in here is shared except the
/// progress counters.
#[derive(Debug)]
pub struct Scratch {
    /// BFS queue.
    pub ring: RingBuffer<ResultEntry>,
    /// The two pooled result lists.
    pub lists: [ResultList; 2],
    /// Parent pointers for path search.
    pub parent: Vec<NodeId>,
    progress: Arc<TraversalProgress>,
}

impl Scratch {
    /// Allocates scratch space for a graph of `max_node` ids.
    pub fn new(max_node: usize, initial_result_capacity: usize) -> Self {
        Self {
            ring: RingBuffer::with_capacity(INITIAL_RING_CAPACITY),
            lists: [
                ResultList::new(max_node, initial_result_capacity),
                ResultList::new(max_node, initial_result_capacity),
            ],
            parent: vec![0; max_node],
            progress: Arc::new(TraversalProgress::default()),
        }
    }

    /// Handle on the live progress counters.
    pub fn progress(&self) -> Arc<TraversalProgress> {
        Arc::clone(&self.progress)
    }

    /// Shrinks both pooled lists after a job.
    pub fn shrink(&mut self) {
        for list in &mut self.lists {
            list.shrink();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn progress_ignores_unknown_slot() {
        let progress = TraversalProgress::default();
        progress.set(1, 7);
        progress.set(5, 9);
        assert_eq!(progress.snapshot(), (0, 7));
        progress.reset();
        assert_eq!(progress.snapshot(), (0, 0));
    }
}
