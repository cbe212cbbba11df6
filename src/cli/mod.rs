#![forbid(unsafe_code)]

//! Offline command implementations behind the `catgraph` binary.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::builder::{build_from_reader, write_output, BuildSummary};
use crate::config::ConfigError;
use crate::error::GraphError;
use crate::jobs::{Job, Worker};
use crate::query::{Line, MemorySink, QueryRequest, Rejection, TagCategory, TagIndex};
use crate::storage::GraphStore;
use crate::traversal::DEFAULT_INITIAL_CAPACITY;

/// Errors surfaced by the offline commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Graph build or load error.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// The query was rejected before execution.
    #[error("query rejected: {0}")]
    Rejected(#[from] Rejection),
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

/// Options of the `build` command.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Edge list; stdin when `None`.
    pub input: Option<PathBuf>,
    /// Output directory, created if missing.
    pub out_dir: PathBuf,
    /// Suppress the progress spinner.
    pub quiet: bool,
}

/// Builds the graph from the configured input and writes it to `out_dir`.
pub fn run_build(cfg: &BuildConfig) -> Result<BuildSummary, CliError> {
    fs::create_dir_all(&cfg.out_dir)?;
    let reader: Box<dyn BufRead> = match &cfg.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|err| GraphError::file(path, err))?,
        )),
        None => Box::new(BufReader::new(io::stdin().lock())),
    };

    let spinner = if cfg.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("reading edges");
        bar
    };

    let built = build_from_reader(reader, |lines| {
        spinner.set_message(format!("{lines} lines read"));
    });
    let (store, summary) = match built {
        Ok(built) => built,
        Err(err) => {
            spinner.abandon_with_message("build failed");
            return Err(err.into());
        }
    };

    spinner.set_message("writing graph files");
    write_output(&store, &cfg.out_dir)?;
    spinner.finish_with_message(format!(
        "built {} groups, {} ids",
        summary.groups, summary.max_node
    ));
    Ok(summary)
}

/// Runs `request` against the graph in `data_dir` without a server and
/// returns every protocol line it produced.
///
/// Unlike a served query there is no admission step, so no `QUEUED` line.
pub fn run_query(
    data_dir: &Path,
    request: &QueryRequest,
    tag_categories: &[TagCategory],
    results_per_line: usize,
) -> Result<Vec<Line>, CliError> {
    let store = Arc::new(GraphStore::load(data_dir)?);
    let query = request.validate(&store)?;
    let tags = Arc::new(TagIndex::build(&store, tag_categories)?);
    let sink = MemorySink::new();
    let job = Job::detached(query, Arc::new(sink.clone()));
    let mut worker = Worker::new(store, tags, DEFAULT_INITIAL_CAPACITY, results_per_line);
    worker.execute(&job)?;
    Ok(sink.lines())
}
