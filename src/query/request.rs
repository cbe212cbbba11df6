use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::GraphStore;
use crate::types::NodeId;

/// Default number of results per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Query algorithm selector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Files under `c1`.
    List,
    /// Files under both `c1` and `c2`.
    And,
    /// Files under `c1` but not under `c2`.
    Not,
    /// Files under `c1` ordered by tag priority.
    Fqv,
    /// Shortest subcategory path from `c1` to `c2`.
    Path,
}

impl QueryKind {
    /// Whether the worker traverses `c2` as well as `c1`.
    pub fn needs_second_list(self) -> bool {
        matches!(self, QueryKind::And | QueryKind::Not)
    }
}

impl FromStr for QueryKind {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list" => Ok(QueryKind::List),
            "and" => Ok(QueryKind::And),
            "not" => Ok(QueryKind::Not),
            "fqv" => Ok(QueryKind::Fqv),
            "path" => Ok(QueryKind::Path),
            other => Err(Rejection::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::List => "list",
            QueryKind::And => "and",
            QueryKind::Not => "not",
            QueryKind::Fqv => "fqv",
            QueryKind::Path => "path",
        };
        f.write_str(name)
    }
}

/// Reasons a request is refused before it reaches the queue.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum Rejection {
    /// A required parameter was absent.
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),
    /// A parameter did not parse as an integer.
    #[error("parameter '{name}' has invalid value '{value}'")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
    /// `a` named no known algorithm.
    #[error("unknown query kind '{0}'")]
    UnknownKind(String),
    /// Id outside `[0, max_node)`.
    #[error("id {id} outside [0, {max_node})")]
    IdOutOfRange {
        /// Offending id.
        id: i64,
        /// Universe size.
        max_node: usize,
    },
    /// Id names a file where a category is required.
    #[error("id {0} is not a category")]
    NotACategory(NodeId),
    /// Path query from a category to itself.
    #[error("path endpoints are identical ({0})")]
    SamePathEndpoints(NodeId),
    /// Offset or size out of range.
    #[error("invalid result window: {0}")]
    InvalidWindow(String),
    /// Admission queue is at capacity.
    #[error("queue full ({capacity} jobs)")]
    QueueFull {
        /// Configured capacity.
        capacity: usize,
    },
}

/// Raw request parameters as they arrive from a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    /// First category.
    pub c1: Option<String>,
    /// Second category or path target.
    pub c2: Option<String>,
    /// Depth limit for `c1`; negative means unlimited.
    pub d1: Option<String>,
    /// Depth limit for `c2`; negative means unlimited.
    pub d2: Option<String>,
    /// Result offset.
    pub o: Option<String>,
    /// Page size.
    pub s: Option<String>,
    /// Query kind.
    pub a: Option<String>,
    /// Transport hint (`js` for callback framing).
    pub t: Option<String>,
}

/// Typed but not yet validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// First category.
    pub c1: i64,
    /// Second id; defaults to `c1`.
    pub c2: Option<i64>,
    /// Depth limit for `c1`; negative means unlimited.
    pub depth1: i64,
    /// Depth limit for `c2`; negative means unlimited.
    pub depth2: i64,
    /// Result offset.
    pub offset: i64,
    /// Page size.
    pub size: i64,
    /// Explicit algorithm, if any.
    pub kind: Option<QueryKind>,
}

impl QueryRequest {
    /// Unlimited-depth request for `c1` with default paging.
    pub fn new(c1: i64) -> Self {
        Self {
            c1,
            c2: None,
            depth1: -1,
            depth2: -1,
            offset: 0,
            size: DEFAULT_PAGE_SIZE as i64,
            kind: None,
        }
    }

    /// Parses client parameters; blank values count as absent.
    pub fn from_params(params: &QueryParams) -> Result<Self, Rejection> {
        let c1 = int_param("c1", params.c1.as_deref())?.ok_or(Rejection::MissingParameter("c1"))?;
        let kind = match params.a.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(kind) => Some(kind.parse()?),
        };
        Ok(Self {
            c1,
            c2: int_param("c2", params.c2.as_deref())?,
            depth1: int_param("d1", params.d1.as_deref())?.unwrap_or(-1),
            depth2: int_param("d2", params.d2.as_deref())?.unwrap_or(-1),
            offset: int_param("o", params.o.as_deref())?.unwrap_or(0),
            size: int_param("s", params.s.as_deref())?.unwrap_or(DEFAULT_PAGE_SIZE as i64),
            kind,
        })
    }

    /// Resolves the algorithm: an explicit kind wins, otherwise `list` when
    /// `c2` is absent or equal to `c1`, `and` otherwise.
    pub fn resolved_kind(&self) -> QueryKind {
        match (self.kind, self.c2) {
            (Some(kind), _) => kind,
            (None, None) => QueryKind::List,
            (None, Some(c2)) if c2 == self.c1 => QueryKind::List,
            (None, Some(_)) => QueryKind::And,
        }
    }

    /// Checks ids and window against `store`.
    pub fn validate(&self, store: &GraphStore) -> Result<Query, Rejection> {
        let kind = self.resolved_kind();
        let c1 = node_in_range(self.c1, store)?;
        let c2 = node_in_range(self.c2.unwrap_or(self.c1), store)?;
        if !store.is_category(c1) {
            return Err(Rejection::NotACategory(c1));
        }
        if kind == QueryKind::Path {
            if c1 == c2 {
                return Err(Rejection::SamePathEndpoints(c1));
            }
        } else if !store.is_category(c2) {
            return Err(Rejection::NotACategory(c2));
        }
        if self.offset < 0 {
            return Err(Rejection::InvalidWindow(format!(
                "offset {} is negative",
                self.offset
            )));
        }
        if self.size < 1 {
            return Err(Rejection::InvalidWindow(format!(
                "size {} must be at least 1",
                self.size
            )));
        }
        Ok(Query {
            kind,
            c1,
            c2,
            depth1: depth_limit(self.depth1),
            depth2: depth_limit(self.depth2),
            window: Window {
                offset: usize::try_from(self.offset).unwrap_or(usize::MAX),
                size: usize::try_from(self.size).unwrap_or(usize::MAX),
            },
        })
    }
}

fn int_param(name: &'static str, raw: Option<&str>) -> Result<Option<i64>, Rejection> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Rejection::InvalidParameter {
                name,
                value: value.to_string(),
            }),
    }
}

fn node_in_range(id: i64, store: &GraphStore) -> Result<NodeId, Rejection> {
    if id >= 0 && (id as u64) < store.max_node() as u64 {
        Ok(id as NodeId)
    } else {
        Err(Rejection::IdOutOfRange {
            id,
            max_node: store.max_node(),
        })
    }
}

fn depth_limit(depth: i64) -> Option<u32> {
    u32::try_from(depth).ok()
}

/// Pagination window `[offset, offset + size)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Window {
    /// Number of matches to skip.
    pub offset: usize,
    /// Maximum number of matches to emit.
    pub size: usize,
}

impl Window {
    /// Window starting at `offset`.
    pub fn new(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }

    /// Exclusive end of the window.
    #[inline]
    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.size)
    }
}

/// A validated query ready for the worker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Query {
    /// Algorithm.
    pub kind: QueryKind,
    /// First category.
    pub c1: NodeId,
    /// Second category, or path target.
    pub c2: NodeId,
    /// Depth limit for `c1` (`None` = unlimited).
    pub depth1: Option<u32>,
    /// Depth limit for `c2` (`None` = unlimited).
    pub depth2: Option<u32>,
    /// Result window.
    pub window: Window,
}
