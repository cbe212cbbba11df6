use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::info;

use crate::error::{GraphError, Result};
use crate::storage::codec;
use crate::types::{NodeId, FILE_MARKER, PLACEHOLDER_OFFSET};

/// File name of the category-index table inside a data directory.
pub const CATEGORY_INDEX_FILE: &str = "catgraph.cat";
/// File name of the block store inside a data directory.
pub const BLOCK_STORE_FILE: &str = "catgraph.tree";
/// Completion marker written after a successful build.
pub const DONE_MARKER_FILE: &str = "done";

/// Number of header slots at the start of every block.
pub const BLOCK_HEADER_LEN: usize = 2;

/// Decoded view of one category block.
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    /// Offset of the block header in the block store.
    pub offset: usize,
    /// Subcategory ids, ascending.
    pub subcats: &'a [i32],
    /// File ids, ascending.
    pub files: &'a [i32],
}

impl Block<'_> {
    /// True when the block has neither subcategories nor files.
    pub fn is_empty(&self) -> bool {
        self.subcats.is_empty() && self.files.is_empty()
    }
}

/// Read-only in-memory copy of the persisted category graph.
///
/// Shared freely between threads after load; nothing mutates it.
#[derive(Debug, Clone)]
pub struct GraphStore {
    cat_index: Vec<i32>,
    blocks: Vec<i32>,
    modified: Option<SystemTime>,
}

impl GraphStore {
    /// Wraps already-decoded arrays after checking their basic shape.
    pub fn from_parts(cat_index: Vec<i32>, blocks: Vec<i32>) -> Result<Self> {
        let store = Self {
            cat_index,
            blocks,
            modified: None,
        };
        store.check_shape()?;
        Ok(store)
    }

    /// Loads `catgraph.cat` and `catgraph.tree` from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Self::load_files(
            &dir.join(CATEGORY_INDEX_FILE),
            &dir.join(BLOCK_STORE_FILE),
        )
    }

    /// Loads the two array files from explicit paths.
    pub fn load_files(cat_path: &Path, tree_path: &Path) -> Result<Self> {
        let cat_index = codec::read_i32_file(cat_path)?;
        let blocks = codec::read_i32_file(tree_path)?;
        let modified = fs::metadata(tree_path)
            .and_then(|meta| meta.modified())
            .map_err(|err| GraphError::file(tree_path, err))?;
        let mut store = Self::from_parts(cat_index, blocks)?;
        store.modified = Some(modified);
        info!(
            max_node = store.max_node(),
            block_words = store.blocks.len(),
            path = %tree_path.display(),
            "graph loaded"
        );
        Ok(store)
    }

    /// Writes both array files into `dir`, returning their paths.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|err| GraphError::file(dir, err))?;
        let cat_path = dir.join(CATEGORY_INDEX_FILE);
        let tree_path = dir.join(BLOCK_STORE_FILE);
        codec::write_i32_file(&tree_path, &self.blocks)?;
        codec::write_i32_file(&cat_path, &self.cat_index)?;
        Ok((cat_path, tree_path))
    }

    fn check_shape(&self) -> Result<()> {
        if self.blocks.len() < BLOCK_HEADER_LEN {
            return Err(GraphError::corruption(
                "block store is missing the placeholder block",
            ));
        }
        if self.blocks[0] != BLOCK_HEADER_LEN as i32 || self.blocks[1] != BLOCK_HEADER_LEN as i32
        {
            return Err(GraphError::corruption("placeholder block is not empty"));
        }
        if self.blocks.len() > i32::MAX as usize || self.cat_index.len() > i32::MAX as usize {
            return Err(GraphError::corruption(
                "array length exceeds 32-bit addressing",
            ));
        }
        for (id, &off) in self.cat_index.iter().enumerate() {
            if off < FILE_MARKER {
                return Err(GraphError::corruption(format!(
                    "category index of node {id} holds invalid value {off}"
                )));
            }
            if off >= 0 && off as usize + BLOCK_HEADER_LEN > self.blocks.len() {
                return Err(GraphError::corruption(format!(
                    "block header of category {id} at {off} lies outside the block store"
                )));
            }
        }
        Ok(())
    }

    /// Universe size: the length of the category-index table.
    #[inline]
    pub fn max_node(&self) -> usize {
        self.cat_index.len()
    }

    /// Raw category-index table.
    pub fn cat_index(&self) -> &[i32] {
        &self.cat_index
    }

    /// Raw block store.
    pub fn blocks(&self) -> &[i32] {
        &self.blocks
    }

    /// Block offset of `id`, or `None` for files and out-of-range ids.
    #[inline]
    pub fn offset(&self, id: NodeId) -> Option<usize> {
        match self.cat_index.get(id as usize) {
            Some(&off) if off >= 0 => Some(off as usize),
            _ => None,
        }
    }

    /// True when `id` is in range and a category (placeholders included).
    #[inline]
    pub fn is_category(&self, id: NodeId) -> bool {
        self.offset(id).is_some()
    }

    /// True when `id` is in range and a file.
    #[inline]
    pub fn is_file(&self, id: NodeId) -> bool {
        matches!(self.cat_index.get(id as usize), Some(&off) if off < 0)
    }

    /// True when `id` is a category that never got its own block.
    #[inline]
    pub fn is_placeholder(&self, id: NodeId) -> bool {
        matches!(self.cat_index.get(id as usize), Some(&PLACEHOLDER_OFFSET))
    }

    /// Converts a raw stored id into a [`NodeId`], failing on ids outside
    /// `[0, max_node)`.
    #[inline]
    pub fn check_id(&self, raw: i32) -> Result<NodeId> {
        if raw >= 0 && (raw as usize) < self.cat_index.len() {
            Ok(raw as NodeId)
        } else {
            Err(GraphError::corruption(format!(
                "node id {raw} outside [0, {})",
                self.cat_index.len()
            )))
        }
    }

    /// Decodes the block of category `id`.
    pub fn block(&self, id: NodeId) -> Result<Block<'_>> {
        let off = match self.cat_index.get(id as usize) {
            Some(&off) if off >= 0 => off as usize,
            Some(_) => {
                return Err(GraphError::corruption(format!(
                    "node {id} is a file, not a category"
                )))
            }
            None => {
                return Err(GraphError::corruption(format!(
                    "node id {id} outside [0, {})",
                    self.cat_index.len()
                )))
            }
        };
        let (subcat_end, file_end) = self.header(off).ok_or_else(|| {
            GraphError::corruption(format!("block header of category {id} at {off} is invalid"))
        })?;
        Ok(Block {
            offset: off,
            subcats: &self.blocks[off + BLOCK_HEADER_LEN..subcat_end],
            files: &self.blocks[subcat_end..file_end],
        })
    }

    /// Reads and bounds-checks the `(subcat_end, file_end)` header at `off`.
    pub(crate) fn header(&self, off: usize) -> Option<(usize, usize)> {
        let subcat_end = usize::try_from(*self.blocks.get(off)?).ok()?;
        let file_end = usize::try_from(*self.blocks.get(off + 1)?).ok()?;
        let valid = off + BLOCK_HEADER_LEN <= subcat_end
            && subcat_end <= file_end
            && file_end <= self.blocks.len();
        valid.then_some((subcat_end, file_end))
    }

    /// Modification time of the block-store file, if loaded from disk.
    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Seconds since the block store was written (0 for in-memory graphs).
    pub fn age_secs(&self) -> u64 {
        self.modified
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 -> {subcats [2], files [3]}, 2 -> {files [3]}
    fn tiny() -> GraphStore {
        let cat = vec![-1, 2, 6, -1];
        let blocks = vec![2, 2, 5, 6, 2, 3, 8, 9, 3];
        GraphStore::from_parts(cat, blocks).unwrap()
    }

    #[test]
    fn classifies_nodes() {
        let store = tiny();
        assert!(store.is_category(1));
        assert!(store.is_category(2));
        assert!(store.is_file(3));
        assert!(store.is_file(0));
        assert!(!store.is_file(4));
        assert!(!store.is_category(4));
    }

    #[test]
    fn decodes_blocks() {
        let store = tiny();
        let b = store.block(1).unwrap();
        assert_eq!(b.subcats, &[2]);
        assert_eq!(b.files, &[3]);
        let b = store.block(2).unwrap();
        assert!(b.subcats.is_empty());
        assert_eq!(b.files, &[3]);
    }

    #[test]
    fn block_of_file_is_corruption() {
        let store = tiny();
        assert!(matches!(store.block(3), Err(GraphError::Corruption(_))));
        assert!(matches!(store.block(99), Err(GraphError::Corruption(_))));
    }

    #[test]
    fn header_outside_store_is_rejected_at_load() {
        let err = GraphStore::from_parts(vec![-1, 40], vec![2, 2]).unwrap_err();
        assert!(matches!(err, GraphError::Corruption(_)));
    }

    #[test]
    fn check_id_bounds() {
        let store = tiny();
        assert_eq!(store.check_id(3).unwrap(), 3);
        assert!(store.check_id(4).is_err());
        assert!(store.check_id(-1).is_err());
    }
}
