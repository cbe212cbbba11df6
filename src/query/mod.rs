//! Query model and algorithms over traversal results.

mod emit;
mod path;
mod request;
pub mod set_ops;
mod tags;

pub use emit::{Emitter, Line, LineSink, MemorySink, DEFAULT_RESULTS_PER_LINE};
pub use path::find_path;
pub use request::{
    Query, QueryKind, QueryParams, QueryRequest, Rejection, Window, DEFAULT_PAGE_SIZE,
};
pub use set_ops::{Outcome, Total};
pub use tags::{TagCategory, TagIndex};
