/// FIFO circular buffer with power-of-two capacity.
///
/// Grows by doubling and copying the live range to the front of the new
/// buffer, so FIFO order survives growth.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a buffer with capacity rounded up to a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![T::default(); capacity.max(1).next_power_of_two()],
            head: 0,
            len: 0,
        }
    }

    /// Number of queued items.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current slot count.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Drops all queued items, keeping the allocation.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    #[inline]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    /// Appends at the tail.
    #[inline]
    pub fn push(&mut self, item: T) {
        if self.len == self.slots.len() {
            self.grow();
        }
        let tail = (self.head + self.len) & self.mask();
        self.slots[tail] = item;
        self.len += 1;
    }

    /// Removes from the head.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head];
        self.head = (self.head + 1) & self.mask();
        self.len -= 1;
        Some(item)
    }

    fn grow(&mut self) {
        let mut slots = vec![T::default(); self.slots.len() * 2];
        let (front, back) = if self.head + self.len <= self.slots.len() {
            (&self.slots[self.head..self.head + self.len], &[][..])
        } else {
            (&self.slots[self.head..], &self.slots[..(self.head + self.len) & self.mask()])
        };
        slots[..front.len()].copy_from_slice(front);
        slots[front.len()..front.len() + back.len()].copy_from_slice(back);
        self.slots = slots;
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_power_of_two() {
        assert_eq!(RingBuffer::<u64>::with_capacity(5).capacity(), 8);
        assert_eq!(RingBuffer::<u64>::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn growth_preserves_order_across_wraparound() {
        let mut ring = RingBuffer::with_capacity(4);
        for i in 0..3u64 {
            ring.push(i);
        }
        assert_eq!(ring.pop(), Some(0));
        assert_eq!(ring.pop(), Some(1));
        for i in 3..10u64 {
            ring.push(i);
        }
        assert_eq!(ring.capacity(), 8);
        let drained: Vec<u64> = std::iter::from_fn(|| ring.pop()).collect();
        assert_eq!(drained, (2..10).collect::<Vec<_>>());
        assert!(ring.is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut ring = RingBuffer::with_capacity(2);
        ring.push(1u64);
        ring.clear();
        assert_eq!(ring.pop(), None);
    }
}
