/// Append-only array that grows geometrically until the build hands it over
/// as a plain vector.
///
/// Callers address elements by index only, so growth never invalidates a
/// previously handed-out position.
#[derive(Debug, Clone)]
pub struct GrowableArray {
    values: Vec<i32>,
    fill: i32,
}

impl GrowableArray {
    /// Creates an array of `initial_len` elements set to `fill`.
    pub fn new(initial_len: usize, fill: i32) -> Self {
        Self {
            values: vec![fill; initial_len],
            fill,
        }
    }

    /// Current addressable length.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no element is addressable.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Ensures at least `min_len` addressable elements.
    ///
    /// The length doubles (or jumps straight to `min_len` when doubling is not
    /// enough); new slots hold the fill value.
    pub fn grow(&mut self, min_len: usize) {
        if min_len <= self.values.len() {
            return;
        }
        let doubled = self.values.len().saturating_mul(2).max(1);
        let target = doubled.max(min_len);
        self.values.resize(target, self.fill);
    }

    /// Reads slot `idx`; out-of-range slots read as the fill value.
    #[inline]
    pub fn get(&self, idx: usize) -> i32 {
        self.values.get(idx).copied().unwrap_or(self.fill)
    }

    /// Writes slot `idx`, growing first when needed.
    #[inline]
    pub fn set(&mut self, idx: usize, value: i32) {
        if idx >= self.values.len() {
            self.grow(idx + 1);
        }
        self.values[idx] = value;
    }

    /// Mutable view of `range`, growing first when needed.
    pub fn slice_mut(&mut self, start: usize, end: usize) -> &mut [i32] {
        self.grow(end);
        &mut self.values[start..end]
    }

    /// Consumes the array, keeping exactly `used` elements.
    pub fn into_vec(mut self, used: usize) -> Vec<i32> {
        self.grow(used);
        self.values.truncate(used);
        self.values.shrink_to_fit();
        self.values
    }
}
