use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GuessSlot {
    #[default]
    Empty,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    InProgress,
    Won,
    Lost,
}

/// Fixed-length, left-to-right filled sequence of guess outcomes.
///
/// Slots are only ever written through [`GuessRow::mark_next`], so a filled
/// slot never goes back to `Empty` until the row is replaced for a new round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuessRow {
    slots: Vec<GuessSlot>,
}

impl GuessRow {
    pub fn new(len: usize) -> Self {
        Self {
            slots: vec![GuessSlot::Empty; len],
        }
    }

    /// Rebuilds a row from persisted slots, never longer than `len`.
    /// Missing slots are padded with `Empty`.
    pub fn restore(saved: &[GuessSlot], len: usize) -> Self {
        let mut slots: Vec<GuessSlot> = saved.iter().copied().take(len).collect();
        slots.resize(len, GuessSlot::Empty);
        let mut row = Self { slots };
        row.compact();
        row
    }

    /// Reconstructs the row of a finished round from its guess count.
    pub fn finished(len: usize, won: bool, guess_count: usize) -> Self {
        let mut row = Self::new(len);
        if won {
            let misses = guess_count.clamp(1, len) - 1;
            for _ in 0..misses {
                row.mark_next(GuessSlot::Incorrect);
            }
            row.mark_next(GuessSlot::Correct);
        } else {
            while row.mark_next(GuessSlot::Incorrect).is_some() {}
        }
        row
    }

    // a stored row with holes ([x, _, x]) is pulled left so "first empty" stays meaningful
    fn compact(&mut self) {
        let len = self.slots.len();
        self.slots.retain(|slot| *slot != GuessSlot::Empty);
        self.slots.resize(len, GuessSlot::Empty);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[GuessSlot] {
        &self.slots
    }

    pub fn remaining(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| **slot == GuessSlot::Empty)
            .count()
    }

    pub fn guesses_made(&self) -> usize {
        self.len() - self.remaining()
    }

    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == GuessSlot::Empty)
    }

    /// Number the next guess will carry: `len - remaining + 1`.
    pub fn next_guess_number(&self) -> usize {
        self.len() - self.remaining() + 1
    }

    /// Writes `slot` into the first empty position, returning its index.
    pub fn mark_next(&mut self, slot: GuessSlot) -> Option<usize> {
        if slot == GuessSlot::Empty {
            return None;
        }
        let index = self.first_empty()?;
        self.slots[index] = slot;
        Some(index)
    }

    pub fn outcome(&self) -> SlotOutcome {
        if self.slots.contains(&GuessSlot::Correct) {
            SlotOutcome::Won
        } else if self.remaining() == 0 {
            SlotOutcome::Lost
        } else {
            SlotOutcome::InProgress
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome() != SlotOutcome::InProgress
    }
}
