//! Compact category-graph index and a serialized query server over it.
//!
//! The [`builder`] turns a sorted `child parent kind` edge list into two flat
//! integer files, [`storage`] loads and verifies them, [`traversal`] and
//! [`query`] answer list/intersection/difference/tag/path questions, and
//! [`jobs`] plus [`server`] stream answers to clients one job at a time.

#![warn(missing_docs)]

pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod query;
pub mod server;
pub mod storage;
pub mod traversal;
pub mod types;

pub use error::{GraphError, Result};
pub use storage::GraphStore;
pub use types::{NodeId, ResultEntry};
