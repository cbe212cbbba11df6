use crate::error::{GraphError, Result};
use crate::storage::GraphStore;
use crate::traversal::result_list::ResultList;
use crate::traversal::ring::RingBuffer;
use crate::traversal::scratch::{CancelToken, TraversalProgress};
use crate::types::{mask_for_depth, NodeId, ResultEntry, MAX_DEPTH, PLACEHOLDER_OFFSET};

/// Where a traversal reports its running entry count.
#[derive(Clone, Copy)]
pub struct ProgressSlot<'a> {
    /// Shared counters.
    pub progress: &'a TraversalProgress,
    /// Which counter to update.
    pub slot: usize,
}

/// Collects every file reachable from `root` within `max_depth` subcategory
/// hops (`None` = unlimited) into `out`.
///
/// `out` must be cleared by the caller. Each file is appended once, with the
/// depth of the category that first listed it; the mask records
/// `min(depth+1, 255)` for every visited category and file. Categories are
/// skipped when popped a second time and never enqueued once visited, which
/// bounds the work on cyclic graphs.
///
/// # Errors
///
/// [`GraphError::Corruption`] when a stored id is out of range or a
/// subcategory range names a file; [`GraphError::Cancelled`] when `cancel`
/// fires.
pub fn fetch_files(
    store: &GraphStore,
    root: NodeId,
    max_depth: Option<u32>,
    ring: &mut RingBuffer<ResultEntry>,
    out: &mut ResultList,
    cancel: &CancelToken,
    progress: Option<ProgressSlot<'_>>,
) -> Result<()> {
    if !store.is_category(root) {
        return Err(GraphError::InvalidArgument(format!(
            "traversal root {root} is not a category"
        )));
    }
    ring.clear();
    ring.push(ResultEntry::new(root, 0));

    while let Some(entry) = ring.pop() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let (id, depth) = (entry.id(), entry.depth());
        if out.contains(id) {
            continue;
        }
        let visited = mask_for_depth(depth);
        out.set_mask(id, visited);
        let block = store.block(id)?;

        if max_depth.map_or(true, |max| depth < max) {
            let next = depth.saturating_add(1).min(MAX_DEPTH);
            for &raw in block.subcats {
                let child = store.check_id(raw)?;
                match store.cat_index()[child as usize] {
                    PLACEHOLDER_OFFSET => {}
                    off if off > 0 => {
                        if !out.contains(child) {
                            ring.push(ResultEntry::new(child, next));
                        }
                    }
                    _ => {
                        return Err(GraphError::corruption(format!(
                            "file {child} listed as subcategory of {id}"
                        )))
                    }
                }
            }
        }

        for &raw in block.files {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }
            let child = store.check_id(raw)?;
            if !out.contains(child) {
                out.push(ResultEntry::new(child, depth));
                out.set_mask(child, visited);
            }
        }
        if let Some(slot) = progress {
            slot.progress.set(slot.slot, out.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_sorted, Edge};

    fn run(store: &GraphStore, root: NodeId, max_depth: Option<u32>) -> ResultList {
        let mut ring = RingBuffer::with_capacity(4);
        let mut out = ResultList::new(store.max_node(), 16);
        fetch_files(store, root, max_depth, &mut ring, &mut out, &CancelToken::new(), None).unwrap();
        out
    }

    #[test]
    fn file_reached_twice_is_listed_once_at_min_depth() {
        let store = build_sorted([
            Edge::subcat(2, 1),
            Edge::file(10, 1),
            Edge::subcat(3, 2),
            Edge::file(10, 3),
            Edge::file(11, 3),
        ])
        .unwrap();
        let out = run(&store, 1, None);
        let ids: Vec<_> = out.entries().iter().map(|e| (e.id(), e.depth())).collect();
        assert_eq!(ids, vec![(10, 0), (11, 2)]);
        assert_eq!(out.mask(10), 1);
        assert_eq!(out.mask(11), 3);
    }

    #[test]
    fn depth_limit_stops_expansion() {
        let store = build_sorted([
            Edge::subcat(2, 1),
            Edge::file(20, 2),
            Edge::subcat(3, 2),
            Edge::file(30, 3),
        ])
        .unwrap();
        assert!(run(&store, 1, Some(0)).is_empty());
        let ids: Vec<_> = run(&store, 1, Some(1)).entries().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![20]);
        assert_eq!(run(&store, 1, None).len(), 2);
    }

    #[test]
    fn cancelled_token_aborts() {
        let store = build_sorted([Edge::file(5, 1)]).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let mut ring = RingBuffer::with_capacity(4);
        let mut out = ResultList::new(store.max_node(), 4);
        let err = fetch_files(&store, 1, None, &mut ring, &mut out, &token, None).unwrap_err();
        assert!(matches!(err, GraphError::Cancelled));
    }

    #[test]
    fn out_of_range_child_is_corruption() {
        let store = GraphStore::from_parts(vec![-1, 2], vec![2, 2, 4, 5, 77]).unwrap();
        let mut ring = RingBuffer::with_capacity(4);
        let mut out = ResultList::new(store.max_node(), 4);
        let err = fetch_files(&store, 1, None, &mut ring, &mut out, &CancelToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)), "{err}");
    }
}
