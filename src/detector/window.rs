//! Sample window: fixed pre-allocated circular store of quantized slots.
//! One boolean per tick; the capacity spans the full classification window.
//! No dynamic allocation after construction.

/// Fixed-size ring of boolean slots. Pre-allocated, never grows.
/// Callers never see storage order or perform index math themselves.
pub struct SampleWindow {
    slots: Box<[bool]>,
    write_pos: usize,
    written: u64,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![false; capacity].into_boxed_slice(),
            write_pos: 0,
            written: 0,
            capacity,
        }
    }

    /// Write one slot, silently discarding the oldest once the window has
    /// wrapped. Called from the event loop — must not allocate.
    #[inline]
    pub fn write(&mut self, value: bool) {
        self.slots[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.written += 1;
    }

    /// All slots in chronological order, oldest first, length = capacity.
    /// Slots not yet written read as `false`.
    pub fn snapshot(&self) -> Vec<bool> {
        if self.written < self.capacity as u64 {
            // Not wrapped yet: storage order is already chronological, with
            // the zero-initialized tail standing in for future ticks.
            return self.slots.to_vec();
        }
        let mut out = vec![false; self.capacity];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.slots[(self.write_pos + i) % self.capacity];
        }
        out
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total slots written since the last clear (not clamped to capacity).
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Reset to the freshly-constructed state.
    pub fn clear(&mut self) {
        self.slots.fill(false);
        self.write_pos = 0;
        self.written = 0;
    }
}
