use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::GraphStore;
use crate::traversal::{fetch_files, CancelToken, ResultList, RingBuffer};
use crate::types::NodeId;

/// One priority bucket of the tag index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagCategory {
    /// Category whose files receive the tag.
    pub category: NodeId,
    /// Depth limit; negative means unlimited.
    #[serde(default)]
    pub depth: i64,
    /// Tag value, 1 = highest priority.
    pub tag: u8,
}

/// Files of the configured tag categories with their tag and depth.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct TagIndex {
    list: ResultList,
    buckets: u8,
}

impl TagIndex {
    /// Index without any tagged file.
    pub fn empty(max_node: usize) -> Self {
        Self {
            list: ResultList::with_tags(max_node, 0),
            buckets: 0,
        }
    }

    /// Traverses every tag category and records tag and depth per file.
    ///
    /// Categories are processed from last to first so that, for a file under
    /// several of them, the entry listed first wins. Entries naming a file or
    /// an id outside the graph are skipped with a warning.
    pub fn build(store: &GraphStore, categories: &[TagCategory]) -> Result<Self> {
        let max_node = store.max_node();
        let mut index = Self::empty(max_node);
        let mut ring = RingBuffer::with_capacity(1024);
        let mut scratch = ResultList::new(max_node, 1024);
        let cancel = CancelToken::new();

        for category in categories.iter().rev() {
            if category.tag == 0 || !store.is_category(category.category) {
                warn!(
                    category = category.category,
                    tag = category.tag,
                    "skipping tag category"
                );
                continue;
            }
            scratch.clear();
            fetch_files(
                store,
                category.category,
                u32::try_from(category.depth).ok(),
                &mut ring,
                &mut scratch,
                &cancel,
                None,
            )?;
            for entry in scratch.entries() {
                let id = entry.id();
                index.list.set_mask(id, scratch.mask(id));
                index.list.set_tag(id, category.tag);
            }
            index.buckets = index.buckets.max(category.tag);
            info!(
                category = category.category,
                tag = category.tag,
                files = scratch.len(),
                "tag category indexed"
            );
        }
        Ok(index)
    }

    /// Tag of `id`, 0 when untagged.
    #[inline]
    pub fn tag(&self, id: NodeId) -> u8 {
        self.list.tag(id)
    }

    /// Mask byte of `id` (`depth+1` inside its tag category), 0 when untagged.
    #[inline]
    pub fn mask(&self, id: NodeId) -> u8 {
        self.list.mask(id)
    }

    /// Highest tag value in use.
    pub fn buckets(&self) -> u8 {
        self.buckets
    }
}
