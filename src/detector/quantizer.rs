//! Event quantizer: maps irregular threshold-crossing events onto a fixed
//! tick grid, forward-filling skipped ticks with the previously active event.

use super::window::SampleWindow;

/// Classification attached to one raw microphone threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    None,
    Loud,
    Quiet,
}

impl RawEvent {
    /// Slot polarity: only `Loud` marks a slot.
    #[inline]
    pub fn as_slot(self) -> bool {
        matches!(self, RawEvent::Loud)
    }
}

/// Quantization state for one listening session: the last classification
/// observed and the tick it was applied at.
pub struct Quantizer {
    sample_size_ms: u32,
    current_event: RawEvent,
    current_tick: u32,
}

impl Quantizer {
    pub fn new(sample_size_ms: u32) -> Self {
        Self {
            sample_size_ms,
            current_event: RawEvent::None,
            current_tick: 0,
        }
    }

    /// Tick index the session has reached. Monotonically non-decreasing
    /// within a session.
    pub fn current_tick(&self) -> u32 {
        self.current_tick
    }

    /// Fold a raw event observed at `elapsed_ms` into the window.
    ///
    /// Every tick elapsed since the previous call is written with the
    /// classification that was active during it (the *previous* event, not
    /// the new one), oldest to newest. Returns the number of slots written;
    /// 0 when the tick boundary has not advanced. A gap longer than the
    /// window writes exactly `window.capacity()` slots — the whole window is
    /// that state anyway — then tracking resumes at the new tick.
    pub fn advance(&mut self, raw: RawEvent, elapsed_ms: u32, window: &mut SampleWindow) -> u32 {
        let tick = elapsed_ms / self.sample_size_ms;
        let gap = tick.wrapping_sub(self.current_tick);
        let to_fill = gap.min(window.capacity() as u32);

        let value = self.current_event.as_slot();
        for _ in 0..to_fill {
            window.write(value);
        }

        self.current_tick = tick;
        self.current_event = raw;
        to_fill
    }

    pub fn reset(&mut self) {
        self.current_event = RawEvent::None;
        self.current_tick = 0;
    }
}
