use std::cell::Cell;

/// Monotonic token for discarding async results that arrive after the
/// controller has moved on.
#[derive(Debug, Default)]
pub struct Generation {
    value: Cell<u64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.value.get()
    }

    /// Invalidates every outstanding token and returns the new one.
    pub fn bump(&self) -> u64 {
        let next = self.value.get() + 1;
        self.value.set(next);
        next
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.value.get() == token
    }
}
