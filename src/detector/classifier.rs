//! Pattern classifier seam.
//! The detector always hands the classifier the full window in chronological
//! order (oldest slot first). A real keyword/pattern model plugs in behind
//! the trait without touching any other component.

/// Window classifier (model adapter).
pub trait Classifier: Send {
    /// Classify one window of quantized slots, oldest first.
    /// Returns true when the target pattern is present.
    fn classify(&mut self, window: &[bool]) -> bool;

    /// Reset internal state (e.g., between sessions).
    fn reset(&mut self);
}

/// Stand-in until a trained model is wired up: reports the oldest slot.
/// Exists so the full pipeline can be exercised end to end.
pub struct OldestSlotStub;

impl Classifier for OldestSlotStub {
    fn classify(&mut self, window: &[bool]) -> bool {
        window.first().copied().unwrap_or(false)
    }

    fn reset(&mut self) {}
}
