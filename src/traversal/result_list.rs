use crate::types::{NodeId, ResultEntry};

/// Default initial entry capacity of a pooled list.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1 << 20;

/// Output of one traversal: discovered entries plus the visitation mask that
/// produced them.
///
/// `mask[id]` is 0 for unvisited nodes and `min(depth+1, 255)` otherwise.
#[derive(Debug, Clone)]
pub struct ResultList {
    entries: Vec<ResultEntry>,
    mask: Vec<u8>,
    tags: Option<Vec<u8>>,
    initial_capacity: usize,
}

impl ResultList {
    /// Creates a list whose mask covers `max_node` ids.
    pub fn new(max_node: usize, initial_capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(initial_capacity),
            mask: vec![0; max_node],
            tags: None,
            initial_capacity,
        }
    }

    /// Same as [`ResultList::new`] with a per-id tag byte array.
    pub fn with_tags(max_node: usize, initial_capacity: usize) -> Self {
        let mut list = Self::new(max_node, initial_capacity);
        list.tags = Some(vec![0; max_node]);
        list
    }

    /// Empties the entries and zeroes mask and tags.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.mask.fill(0);
        if let Some(tags) = self.tags.as_mut() {
            tags.fill(0);
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True without entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in discovery order.
    #[inline]
    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    /// Appends an entry without touching the mask.
    #[inline]
    pub fn push(&mut self, entry: ResultEntry) {
        self.entries.push(entry);
    }

    /// Mask byte of `id`; 0 when out of range.
    #[inline]
    pub fn mask(&self, id: NodeId) -> u8 {
        self.mask.get(id as usize).copied().unwrap_or(0)
    }

    /// True when `id` has a non-zero mask byte.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.mask(id) != 0
    }

    /// Sets the mask byte of an in-range `id`.
    #[inline]
    pub fn set_mask(&mut self, id: NodeId, value: u8) {
        if let Some(slot) = self.mask.get_mut(id as usize) {
            *slot = value;
        }
    }

    /// Tag byte of `id`; 0 when untagged or the list carries no tags.
    #[inline]
    pub fn tag(&self, id: NodeId) -> u8 {
        self.tags
            .as_ref()
            .and_then(|tags| tags.get(id as usize).copied())
            .unwrap_or(0)
    }

    /// Sets the tag byte of `id`, allocating the tag array on first use.
    pub fn set_tag(&mut self, id: NodeId, tag: u8) {
        let max_node = self.mask.len();
        let tags = self.tags.get_or_insert_with(|| vec![0; max_node]);
        if let Some(slot) = tags.get_mut(id as usize) {
            *slot = tag;
        }
    }

    /// Entry capacity currently reserved.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Halves the reserved capacity while less than half of it is used,
    /// never going below the initial capacity.
    pub fn shrink(&mut self) {
        let current = self.entries.capacity();
        let mut target = current;
        while target / 2 >= self.initial_capacity && self.entries.len() < target / 2 {
            target /= 2;
        }
        if target < current {
            self.entries.shrink_to(target);
        }
    }
}
