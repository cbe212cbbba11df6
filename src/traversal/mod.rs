//! Breadth-first traversal over the block encoding and its reusable state.

mod bfs;
mod result_list;
mod ring;
mod scratch;

pub use bfs::{fetch_files, ProgressSlot};
pub use result_list::{ResultList, DEFAULT_INITIAL_CAPACITY};
pub use ring::RingBuffer;
pub use scratch::{CancelToken, Scratch, TraversalProgress};
