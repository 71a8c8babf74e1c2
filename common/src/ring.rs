//! Offset arithmetic for a fixed-element ring laid over a byte range.

/// A ring of `capacity` slots of `elem_size` bytes starting at byte
/// offset `start`. Offsets handed out are always slot-aligned and inside
/// `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingRegion {
    pub start: usize,
    pub elem_size: usize,
    pub capacity: usize,
}

impl RingRegion {
    pub const fn new(start: usize, elem_size: usize, capacity: usize) -> Self {
        Self {
            start,
            elem_size,
            capacity,
        }
    }

    pub const fn end(&self) -> usize {
        self.start + self.elem_size * self.capacity
    }

    /// Slot offset following `offset`, wrapping to `start`.
    pub fn advance(&self, offset: usize) -> usize {
        let next = offset + self.elem_size;
        if next >= self.end() {
            self.start
        } else {
            next
        }
    }

    /// Slot offset preceding `offset`, wrapping to the last slot.
    pub fn retreat(&self, offset: usize) -> usize {
        if offset <= self.start {
            self.end() - self.elem_size
        } else {
            offset - self.elem_size
        }
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start
            && offset < self.end()
            && (offset - self.start) % self.elem_size == 0
    }

    /// Number of occupied slots between `tail` (oldest) and `head` (next write).
    pub fn len(&self, head: usize, tail: usize) -> usize {
        let slots = if head >= tail {
            head - tail
        } else {
            self.end() - tail + head - self.start
        };
        slots / self.elem_size
    }
}
