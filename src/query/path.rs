use crate::error::{GraphError, Result};
use crate::storage::GraphStore;
use crate::traversal::{CancelToken, Scratch};
use crate::types::{NodeId, ResultEntry, MAX_DEPTH};

/// Shortest subcategory path from `from` to `to`, both endpoints included.
///
/// A category target is detected when it is first seen as a subcategory; a
/// file target when it appears in the file range of the category being
/// expanded. The first pooled list of `scratch` serves as the visited set and
/// must be cleared by the caller. `max_depth` bounds how deep categories are
/// expanded.
pub fn find_path(
    store: &GraphStore,
    from: NodeId,
    to: NodeId,
    max_depth: Option<u32>,
    scratch: &mut Scratch,
    cancel: &CancelToken,
) -> Result<Option<Vec<NodeId>>> {
    let Scratch {
        ring,
        lists: [visited, _],
        parent,
        ..
    } = scratch;
    if parent.len() < store.max_node() {
        return Err(GraphError::InvalidArgument(format!(
            "parent table covers {} of {} ids",
            parent.len(),
            store.max_node()
        )));
    }
    let target_is_file = store.is_file(to);
    let target = to as i32;
    ring.clear();
    ring.push(ResultEntry::new(from, 0));
    visited.set_mask(from, 1);

    while let Some(entry) = ring.pop() {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        let (id, depth) = (entry.id(), entry.depth());
        let block = store.block(id)?;

        if max_depth.map_or(true, |max| depth < max) {
            let next = depth.saturating_add(1).min(MAX_DEPTH);
            for &raw in block.subcats {
                let child = store.check_id(raw)?;
                if child == to {
                    parent[child as usize] = id;
                    return backtrack(store, from, to, parent).map(Some);
                }
                if visited.contains(child) {
                    continue;
                }
                if !store.is_category(child) {
                    return Err(GraphError::corruption(format!(
                        "file {child} listed as subcategory of {id}"
                    )));
                }
                visited.set_mask(child, 1);
                parent[child as usize] = id;
                if !store.is_placeholder(child) {
                    ring.push(ResultEntry::new(child, next));
                }
            }
        }

        if target_is_file && block.files.binary_search(&target).is_ok() {
            parent[to as usize] = id;
            return backtrack(store, from, to, parent).map(Some);
        }
    }
    Ok(None)
}

fn backtrack(store: &GraphStore, from: NodeId, to: NodeId, parent: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut path = vec![to];
    let mut current = to;
    while current != from {
        current = parent[current as usize];
        path.push(current);
        if path.len() > store.max_node() + 1 {
            return Err(GraphError::corruption("parent chain does not reach the path origin"));
        }
    }
    path.reverse();
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{build_sorted, Edge};

    fn search(
        store: &GraphStore,
        from: NodeId,
        to: NodeId,
        max_depth: Option<u32>,
    ) -> Option<Vec<NodeId>> {
        let mut scratch = Scratch::new(store.max_node(), 4);
        find_path(store, from, to, max_depth, &mut scratch, &CancelToken::new()).unwrap()
    }

    fn graph() -> GraphStore {
        // 1 -> 2 -> 4 -> 5, 1 -> 3 -> 5, 5 holds file 50, 4 -> 1 closes a cycle
        build_sorted([
            Edge::subcat(2, 1),
            Edge::subcat(3, 1),
            Edge::subcat(4, 2),
            Edge::subcat(5, 3),
            Edge::subcat(1, 4),
            Edge::subcat(5, 4),
            Edge::file(50, 5),
        ])
        .unwrap()
    }

    #[test]
    fn finds_shortest_category_path() {
        let store = graph();
        assert_eq!(search(&store, 1, 5, None), Some(vec![1, 3, 5]));
        assert_eq!(search(&store, 2, 1, None), Some(vec![2, 4, 1]));
    }

    #[test]
    fn file_target_is_last_hop() {
        let store = graph();
        assert_eq!(search(&store, 1, 50, None), Some(vec![1, 3, 5, 50]));
    }

    #[test]
    fn unreachable_or_too_deep_is_none() {
        let store = graph();
        assert_eq!(search(&store, 5, 1, None), None);
        assert_eq!(search(&store, 1, 50, Some(1)), None);
        assert_eq!(search(&store, 1, 5, Some(1)), None);
        assert_eq!(search(&store, 1, 5, Some(2)), Some(vec![1, 3, 5]));
        assert_eq!(search(&store, 1, 50, Some(2)), Some(vec![1, 3, 5, 50]));
    }
}
