//! Invocation gate: the classifier runs at most once per distinct tick,
//! however often the periodic tick fires.

/// Records the last tick the classifier was invoked for.
pub struct InvocationGate {
    last_invoked: Option<u32>,
}

impl InvocationGate {
    pub fn new() -> Self {
        Self { last_invoked: None }
    }

    /// True iff `current_tick` has not been classified yet this session.
    /// Accepting records the tick, so a repeat call for the same tick
    /// returns false.
    #[inline]
    pub fn should_invoke(&mut self, current_tick: u32) -> bool {
        match self.last_invoked {
            Some(last) if current_tick <= last => false,
            _ => {
                self.last_invoked = Some(current_tick);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last_invoked = None;
    }
}

impl Default for InvocationGate {
    fn default() -> Self {
        Self::new()
    }
}
