//! Persisted graph encoding.
//!
//! A graph is two flat arrays of little-endian `i32`: the category-index table
//! (`catgraph.cat`) mapping every node id to `-1` (file) or the offset of its
//! block, and the block store (`catgraph.tree`) holding
//! `[subcat_end, file_end, subcats.., files..]` per category.

pub mod codec;
pub mod growable;
pub mod stats;
pub mod store;
pub mod verify;

pub use growable::GrowableArray;
pub use stats::{graph_stats, stats, StatsReport};
pub use store::{
    Block, GraphStore, BLOCK_HEADER_LEN, BLOCK_STORE_FILE, CATEGORY_INDEX_FILE, DONE_MARKER_FILE,
};
pub use verify::{verify, verify_layout, VerifyLevel, VerifyReport};
