//! Incremental construction of the persisted graph from a sorted edge stream.
//!
//! Input records are `child parent kind` lines grouped by ascending parent.
//! Each parent group becomes one block; the group is closed when the parent
//! changes.

use std::fs;
use std::io::BufRead;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::storage::{
    verify_layout, GraphStore, GrowableArray, VerifyLevel, BLOCK_HEADER_LEN, DONE_MARKER_FILE,
};
use crate::types::{EdgeKind, NodeId, FILE_MARKER, ID_MASK, PLACEHOLDER_OFFSET};

const INITIAL_CAT_LEN: usize = 128 * 1024;
const INITIAL_TREE_LEN: usize = 128 * 1024;
const PROGRESS_EVERY: u64 = 100_000;

/// One `child -> parent` relation.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Edge {
    /// Subcategory or file id.
    pub child: NodeId,
    /// Category the child belongs to.
    pub parent: NodeId,
    /// Relation kind.
    pub kind: EdgeKind,
}

impl Edge {
    /// Subcategory relation.
    pub fn subcat(child: NodeId, parent: NodeId) -> Self {
        Self {
            child,
            parent,
            kind: EdgeKind::Subcat,
        }
    }

    /// File membership relation.
    pub fn file(child: NodeId, parent: NodeId) -> Self {
        Self {
            child,
            parent,
            kind: EdgeKind::File,
        }
    }
}

/// Outcome of parsing one input line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ParsedLine {
    /// Blank or `#` comment line.
    Empty,
    /// A usable relation.
    Edge(Edge),
    /// Well-formed record with a kind the graph does not store.
    Skipped(String),
}

/// Parses `child parent kind`, separated by any whitespace.
pub fn parse_line(line: &str) -> std::result::Result<ParsedLine, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(ParsedLine::Empty);
    }
    let mut fields = line.split_whitespace();
    let (Some(child), Some(parent), Some(kind)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!("expected 'child parent kind', got '{line}'"));
    };
    if fields.next().is_some() {
        return Err(format!("trailing fields in '{line}'"));
    }
    let child = parse_id(child)?;
    let parent = parse_id(parent)?;
    match kind.parse::<EdgeKind>() {
        Ok(kind) => Ok(ParsedLine::Edge(Edge {
            child,
            parent,
            kind,
        })),
        Err(_) => Ok(ParsedLine::Skipped(kind.to_string())),
    }
}

fn parse_id(field: &str) -> std::result::Result<NodeId, String> {
    let id: u64 = field
        .parse()
        .map_err(|_| format!("'{field}' is not a non-negative integer id"))?;
    if id > ID_MASK {
        return Err(format!("id {id} exceeds {ID_MASK}"));
    }
    Ok(id as NodeId)
}

/// Counters reported after a build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    /// Lines consumed, including blank and skipped ones.
    pub lines: u64,
    /// Relations stored.
    pub records: u64,
    /// Lines skipped because of an unknown kind.
    pub skipped: u64,
    /// Parent groups closed into blocks.
    pub groups: u64,
    /// Subcategory links after de-duplication.
    pub subcat_links: u64,
    /// File links after de-duplication.
    pub file_links: u64,
    /// Subcategories that arrived after a file of the same parent.
    pub repairs: u64,
    /// Length of the category-index table.
    pub max_node: u64,
    /// Length of the block store.
    pub block_words: u64,
}

#[derive(Debug, Clone, Copy)]
struct OpenGroup {
    parent: NodeId,
    start: usize,
    subcat_end: usize,
}

/// Streaming builder producing a [`GraphStore`].
///
/// Both backing arrays are addressed by offset only, so growth never
/// invalidates an open block.
#[derive(Debug)]
pub struct GraphBuilder {
    cat: GrowableArray,
    tree: GrowableArray,
    cursor: usize,
    group: Option<OpenGroup>,
    last_parent: Option<NodeId>,
    max_id: Option<NodeId>,
    summary: BuildSummary,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a builder holding only the placeholder block.
    pub fn new() -> Self {
        let mut tree = GrowableArray::new(INITIAL_TREE_LEN, 0);
        tree.set(0, BLOCK_HEADER_LEN as i32);
        tree.set(1, BLOCK_HEADER_LEN as i32);
        Self {
            cat: GrowableArray::new(INITIAL_CAT_LEN, FILE_MARKER),
            tree,
            cursor: BLOCK_HEADER_LEN,
            group: None,
            last_parent: None,
            max_id: None,
            summary: BuildSummary::default(),
        }
    }

    /// Counters so far.
    pub fn summary(&self) -> &BuildSummary {
        &self.summary
    }

    /// Parses and applies one input line.
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        self.summary.lines += 1;
        let parsed = parse_line(line).map_err(|message| GraphError::InvalidInput {
            line: self.summary.lines,
            message,
        })?;
        match parsed {
            ParsedLine::Empty => Ok(()),
            ParsedLine::Edge(edge) => self.apply(edge),
            ParsedLine::Skipped(kind) => {
                self.summary.skipped += 1;
                debug!(line = self.summary.lines, kind = %kind, "skipping record");
                Ok(())
            }
        }
    }

    /// Applies one relation; counts as one input line.
    pub fn push(&mut self, edge: Edge) -> Result<()> {
        self.summary.lines += 1;
        self.apply(edge)
    }

    fn apply(&mut self, edge: Edge) -> Result<()> {
        match self.group {
            Some(group) if group.parent == edge.parent => {}
            _ => self.open_group(edge.parent)?,
        }
        self.note_id(edge.child);
        self.note_id(edge.parent);
        self.ensure_addressable(self.cursor + 1)?;

        let Some(group) = self.group.as_mut() else {
            return Err(GraphError::corruption("no open group after open_group"));
        };
        match edge.kind {
            EdgeKind::Subcat => {
                if group.subcat_end == self.cursor {
                    self.tree.set(self.cursor, edge.child as i32);
                } else {
                    // A file is already in place: move it behind the files and
                    // take its slot.
                    let displaced = self.tree.get(group.subcat_end);
                    self.tree.set(self.cursor, displaced);
                    self.tree.set(group.subcat_end, edge.child as i32);
                    self.summary.repairs += 1;
                    debug!(
                        parent = group.parent,
                        child = edge.child,
                        "subcategory after file, repaired"
                    );
                }
                group.subcat_end += 1;
                if self.cat.get(edge.child as usize) == FILE_MARKER {
                    self.cat.set(edge.child as usize, PLACEHOLDER_OFFSET);
                }
            }
            EdgeKind::File => self.tree.set(self.cursor, edge.child as i32),
        }
        self.cursor += 1;
        self.summary.records += 1;
        Ok(())
    }

    fn open_group(&mut self, parent: NodeId) -> Result<()> {
        if let Some(last) = self.last_parent {
            if parent <= last {
                let message = if parent == last {
                    format!("parent {parent} reappears after its group was closed")
                } else {
                    format!("parent {parent} follows {last}; input must be grouped by ascending parent")
                };
                return Err(GraphError::InvalidInput {
                    line: self.summary.lines,
                    message,
                });
            }
        }
        self.close_group()?;
        self.ensure_addressable(self.cursor + BLOCK_HEADER_LEN)?;
        let start = self.cursor;
        self.cursor += BLOCK_HEADER_LEN;
        self.group = Some(OpenGroup {
            parent,
            start,
            subcat_end: self.cursor,
        });
        self.last_parent = Some(parent);
        Ok(())
    }

    /// Sorts and de-duplicates both ranges, writes the header and records
    /// the block offset.
    fn close_group(&mut self) -> Result<()> {
        let Some(group) = self.group.take() else {
            return Ok(());
        };
        let first = group.start + BLOCK_HEADER_LEN;
        let mut subcats = self.tree.slice_mut(first, group.subcat_end).to_vec();
        let mut files = self.tree.slice_mut(group.subcat_end, self.cursor).to_vec();
        subcats.sort_unstable();
        subcats.dedup();
        files.sort_unstable();
        files.dedup();

        let subcat_end = first + subcats.len();
        let file_end = subcat_end + files.len();
        self.tree
            .slice_mut(first, subcat_end)
            .copy_from_slice(&subcats);
        self.tree
            .slice_mut(subcat_end, file_end)
            .copy_from_slice(&files);
        self.tree.set(group.start, subcat_end as i32);
        self.tree.set(group.start + 1, file_end as i32);
        self.cursor = file_end;
        self.cat.set(group.parent as usize, group.start as i32);

        self.summary.groups += 1;
        self.summary.subcat_links += subcats.len() as u64;
        self.summary.file_links += files.len() as u64;
        Ok(())
    }

    fn note_id(&mut self, id: NodeId) {
        self.max_id = Some(self.max_id.map_or(id, |max| max.max(id)));
        self.cat.grow(id as usize + 1);
    }

    fn ensure_addressable(&self, len: usize) -> Result<()> {
        if len > i32::MAX as usize {
            return Err(GraphError::Capacity(format!(
                "block store would need {len} elements"
            )));
        }
        Ok(())
    }

    /// Closes the last group, validates the layout and returns the store.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Corruption`] when the post-build validation finds
    /// any inconsistency (for example a parent id that was earlier listed as a
    /// file); nothing is persisted in that case.
    pub fn finish(mut self) -> Result<(GraphStore, BuildSummary)> {
        self.close_group()?;
        let cat_len = self.max_id.map_or(0, |max| max as usize + 1);
        let cat = self.cat.into_vec(cat_len);
        let blocks = self.tree.into_vec(self.cursor);

        let report = verify_layout(&cat, &blocks, VerifyLevel::Full);
        if !report.success {
            return Err(GraphError::corruption(format!(
                "post-build validation failed: {}",
                report.summary()
            )));
        }

        self.summary.max_node = cat.len() as u64;
        self.summary.block_words = blocks.len() as u64;
        if self.summary.skipped > 0 {
            warn!(skipped = self.summary.skipped, "records with unknown kinds were ignored");
        }
        let store = GraphStore::from_parts(cat, blocks)?;
        Ok((store, self.summary))
    }
}

/// Builds from an in-memory edge list, already grouped by ascending parent.
pub fn build_sorted(edges: impl IntoIterator<Item = Edge>) -> Result<GraphStore> {
    let mut builder = GraphBuilder::new();
    for edge in edges {
        builder.push(edge)?;
    }
    builder.finish().map(|(store, _)| store)
}

/// Builds from a line-oriented reader; `progress` is called every
/// 100 000 lines with the running line count.
pub fn build_from_reader<R: BufRead>(
    reader: R,
    mut progress: impl FnMut(u64),
) -> Result<(GraphStore, BuildSummary)> {
    let mut builder = GraphBuilder::new();
    for line in reader.lines() {
        builder.push_line(&line?)?;
        let lines = builder.summary().lines;
        if lines % PROGRESS_EVERY == 0 {
            progress(lines);
        }
    }
    let (store, summary) = builder.finish()?;
    info!(
        lines = summary.lines,
        groups = summary.groups,
        max_node = summary.max_node,
        repairs = summary.repairs,
        "graph built"
    );
    Ok((store, summary))
}

/// Persists `store` into `dir` and writes the completion marker last.
pub fn write_output(store: &GraphStore, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    let marker = dir.join(DONE_MARKER_FILE);
    if marker.exists() {
        fs::remove_file(&marker).map_err(|err| GraphError::file(&marker, err))?;
    }
    store.write_to_dir(dir)?;
    fs::write(&marker, b"").map_err(|err| GraphError::file(&marker, err))?;
    info!(dir = %dir.display(), "db files written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(store: &GraphStore, id: NodeId) -> (Vec<i32>, Vec<i32>) {
        let b = store.block(id).unwrap();
        (b.subcats.to_vec(), b.files.to_vec())
    }

    #[test]
    fn builds_exact_layout() {
        let store = build_sorted([
            Edge::subcat(2, 1),
            Edge::subcat(3, 1),
            Edge::file(100, 2),
            Edge::file(101, 3),
            Edge::file(100, 3),
        ])
        .unwrap();
        assert_eq!(store.max_node(), 102);
        assert_eq!(&store.blocks()[..4], &[2, 2, 6, 6]);
        assert_eq!(store.cat_index()[1], 2);
        assert_eq!(store.cat_index()[2], 6);
        assert_eq!(store.cat_index()[3], 9);
        assert_eq!(block(&store, 1), (vec![2, 3], vec![]));
        assert_eq!(block(&store, 3), (vec![], vec![100, 101]));
        assert_eq!(store.blocks().len(), 13);
    }

    #[test]
    fn subcategory_after_file_is_repaired() {
        let mut builder = GraphBuilder::new();
        builder.push(Edge::file(40, 5)).unwrap();
        builder.push(Edge::file(30, 5)).unwrap();
        builder.push(Edge::subcat(7, 5)).unwrap();
        builder.push(Edge::subcat(6, 5)).unwrap();
        let (store, summary) = builder.finish().unwrap();
        assert_eq!(summary.repairs, 2);
        assert_eq!(block(&store, 5), (vec![6, 7], vec![30, 40]));
        assert!(store.is_placeholder(6));
        assert!(store.is_placeholder(7));
    }

    #[test]
    fn duplicate_children_are_collapsed() {
        let store = build_sorted([Edge::file(9, 1), Edge::file(9, 1), Edge::subcat(4, 1)]).unwrap();
        assert_eq!(block(&store, 1), (vec![4], vec![9]));
    }

    #[test]
    fn descending_parent_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder.push(Edge::file(9, 4)).unwrap();
        let err = builder.push(Edge::file(9, 3)).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput { line: 2, .. }), "{err}");
    }

    #[test]
    fn repeated_parent_group_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder.push(Edge::file(9, 4)).unwrap();
        builder.push(Edge::file(9, 5)).unwrap();
        assert!(builder.push(Edge::file(10, 4)).is_err());
    }

    #[test]
    fn category_listed_as_file_fails_validation() {
        let err = build_sorted([Edge::file(2, 1), Edge::file(9, 2)]).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)), "{err}");
    }

    #[test]
    fn parses_tab_and_space_separated_lines() {
        assert_eq!(
            parse_line("12\t3\tsubcat").unwrap(),
            ParsedLine::Edge(Edge::subcat(12, 3))
        );
        assert_eq!(parse_line("12 3 f").unwrap(), ParsedLine::Edge(Edge::file(12, 3)));
        assert_eq!(parse_line("  ").unwrap(), ParsedLine::Empty);
        assert_eq!(
            parse_line("1 2 page").unwrap(),
            ParsedLine::Skipped("page".into())
        );
        assert!(parse_line("1 2").is_err());
        assert!(parse_line("-1 2 file").is_err());
        assert!(parse_line("4294967295 2 file").is_err());
    }

    #[test]
    fn reader_skips_unknown_kinds_and_reports_line() {
        let input = "2 1 subcat\n5 1 page\n10 2 file\n";
        let (store, summary) = build_from_reader(input.as_bytes(), |_| {}).unwrap();
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.records, 2);
        assert!(store.is_file(10));

        let err = build_from_reader("2 1 subcat\nbogus\n".as_bytes(), |_| {}).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInput { line: 2, .. }));
    }

    #[test]
    fn empty_input_yields_placeholder_only() {
        let (store, summary) = build_from_reader("".as_bytes(), |_| {}).unwrap();
        assert_eq!(store.max_node(), 0);
        assert_eq!(store.blocks(), &[2, 2]);
        assert_eq!(summary.groups, 0);
    }
}
