use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::jobs::JobQueue;
use crate::traversal::TraversalProgress;

/// Default interval between progress broadcasts.
pub const DEFAULT_NOTIFY_INTERVAL: Duration = Duration::from_millis(200);

/// Spawns the progress notifier: every `interval` it pushes `WAITING` or
/// `WORKING` lines to queued jobs, until the queue shuts down.
///
/// It only takes the queue lock briefly and never touches worker scratch.
pub fn spawn_notifier(
    queue: Arc<JobQueue>,
    progress: Arc<TraversalProgress>,
    interval: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("catgraph-notifier".into())
        .spawn(move || {
            while !queue.is_shutdown() {
                thread::sleep(interval);
                queue.broadcast_progress(&progress);
            }
            debug!("notifier stopped");
        })
}
