use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::{GraphError, Result};
use crate::storage::store::{GraphStore, BLOCK_STORE_FILE, CATEGORY_INDEX_FILE, DONE_MARKER_FILE};
use crate::storage::verify::{verify_layout, VerifyLevel};

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub graph: GraphStatsSection,
    pub filesystem: FilesystemStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStatsSection {
    pub max_node: u64,
    pub categories: u64,
    pub placeholders: u64,
    pub files: u64,
    pub subcat_links: u64,
    pub file_links: u64,
    pub block_words: u64,
    pub data_age_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    pub data_dir: String,
    pub cat_size_bytes: u64,
    pub tree_size_bytes: u64,
    pub done_marker: bool,
}

pub fn stats(dir: impl AsRef<Path>) -> Result<StatsReport> {
    let dir = dir.as_ref();
    let store = GraphStore::load(dir)?;
    Ok(StatsReport {
        graph: graph_stats(&store),
        filesystem: FilesystemStats {
            data_dir: dir.display().to_string(),
            cat_size_bytes: file_len(&dir.join(CATEGORY_INDEX_FILE))?,
            tree_size_bytes: file_len(&dir.join(BLOCK_STORE_FILE))?,
            done_marker: dir.join(DONE_MARKER_FILE).exists(),
        },
    })
}

pub fn graph_stats(store: &GraphStore) -> GraphStatsSection {
    let counts = verify_layout(store.cat_index(), store.blocks(), VerifyLevel::Fast).counts;
    GraphStatsSection {
        max_node: counts.max_node,
        categories: counts.categories,
        placeholders: counts.placeholders,
        files: counts.files,
        subcat_links: counts.subcat_links,
        file_links: counts.file_links,
        block_words: counts.block_words,
        data_age_secs: store.age_secs(),
    }
}

fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|err| GraphError::file(path, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_links_of_small_graph() {
        let store = GraphStore::from_parts(vec![-1, 2, 0, -1], vec![2, 2, 5, 6, 2, 3]).unwrap();
        let section = graph_stats(&store);
        assert_eq!(section.categories, 1);
        assert_eq!(section.placeholders, 1);
        assert_eq!(section.files, 2);
        assert_eq!(section.subcat_links, 1);
        assert_eq!(section.file_links, 1);
        assert_eq!(section.data_age_secs, 0);
    }
}
