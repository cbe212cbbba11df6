//! Identifier and result-entry types shared by every layer.

use std::fmt;
use std::str::FromStr;

/// Dense-ish node identifier. Persisted as a signed 32-bit integer.
pub type NodeId = u32;

/// Bits of a [`ResultEntry`] holding the node id.
pub const ID_MASK: u64 = 0x7FFF_FFFF;
/// Shift applied to the depth field of a [`ResultEntry`].
pub const DEPTH_SHIFT: u32 = 32;
/// Bits of a [`ResultEntry`] holding the BFS depth.
pub const DEPTH_MASK: u64 = ID_MASK << DEPTH_SHIFT;
/// Largest depth representable in a [`ResultEntry`].
pub const MAX_DEPTH: u32 = ID_MASK as u32;

/// Offset of the empty placeholder block every builder writes first.
pub const PLACEHOLDER_OFFSET: i32 = 0;
/// Category-index value marking a file (leaf).
pub const FILE_MARKER: i32 = -1;

/// A node id packed together with the depth at which it was reached.
///
/// The id lives in the low 31 bits and the depth above bit 32. Ordering is
/// id-major, depth-minor.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct ResultEntry(u64);

impl ResultEntry {
    /// Packs `id` and `depth`; both are truncated to 31 bits.
    #[inline]
    pub fn new(id: NodeId, depth: u32) -> Self {
        Self((u64::from(id) & ID_MASK) | ((u64::from(depth) << DEPTH_SHIFT) & DEPTH_MASK))
    }

    /// Node id.
    #[inline]
    pub fn id(self) -> NodeId {
        (self.0 & ID_MASK) as NodeId
    }

    /// BFS depth (0 = traversal root).
    #[inline]
    pub fn depth(self) -> u32 {
        ((self.0 & DEPTH_MASK) >> DEPTH_SHIFT) as u32
    }

    /// Raw packed representation.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Same id with `extra` added to the depth, saturating at [`MAX_DEPTH`].
    #[inline]
    pub fn deepen(self, extra: u32) -> Self {
        Self::new(self.id(), self.depth().saturating_add(extra).min(MAX_DEPTH))
    }
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.id(), self.depth()).cmp(&(other.id(), other.depth()))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ResultEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id(), self.depth())
    }
}

/// Encodes a discovery depth into a visitation-mask byte: `min(depth+1, 255)`.
#[inline]
pub fn mask_for_depth(depth: u32) -> u8 {
    depth.saturating_add(1).min(u32::from(u8::MAX)) as u8
}

/// Kind of a builder input record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// `child` is a subcategory of `parent`.
    Subcat,
    /// `child` is a file in `parent`.
    File,
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subcat" | "s" => Ok(EdgeKind::Subcat),
            "file" | "f" => Ok(EdgeKind::File),
            other => Err(format!("unknown edge kind '{other}'")),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Subcat => f.write_str("subcat"),
            EdgeKind::File => f.write_str("file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_packs_id_below_depth() {
        let e = ResultEntry::new(1234, 7);
        assert_eq!(e.id(), 1234);
        assert_eq!(e.depth(), 7);
        assert!(ResultEntry::new(5, 9) < ResultEntry::new(6, 0));
        assert!(ResultEntry::new(5, 1) < ResultEntry::new(5, 2));
    }

    #[test]
    fn deepen_saturates() {
        let e = ResultEntry::new(1, MAX_DEPTH - 1).deepen(10);
        assert_eq!(e.depth(), MAX_DEPTH);
        assert_eq!(e.id(), 1);
    }

    #[test]
    fn mask_byte_saturates_at_255() {
        assert_eq!(mask_for_depth(0), 1);
        assert_eq!(mask_for_depth(253), 254);
        assert_eq!(mask_for_depth(254), 255);
        assert_eq!(mask_for_depth(10_000), 255);
    }
}
