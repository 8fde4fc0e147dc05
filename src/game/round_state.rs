use log::{debug, trace};

use crate::helpers::NormalizeGuess;
use crate::model::{GuessRow, GuessSlot, KeyInput, Round, SessionPhase, SlotOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessRejected {
    EmptyInput,
    NoRound,
    NoSlotsLeft,
    Animating,
    RoundOver,
}

/// How a submitted guess played out once its reveal finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuessOutcome {
    Rejected(GuessRejected),
    Incorrect { guess_number: usize, remaining: usize },
    Won { guess_number: usize },
    Lost { answer: String },
    /// The session moved on (mode switch, filter change, unmount) before
    /// the reveal finished.
    Discarded,
}

/// A guess that passed validation and is waiting out its reveal animation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGuess {
    pub bucket_id: String,
    pub text: String,
    pub correct: bool,
    pub guess_number: usize,
}

/// The round on screen and everything the player can change about it.
#[derive(Debug, Clone)]
pub struct RoundState {
    slot_count: usize,
    pub round: Option<Round>,
    pub slots: GuessRow,
    pub phase: SessionPhase,
    pub input: String,
    pub confetti: bool,
    pub attempts: Vec<String>,
}

impl RoundState {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count,
            round: None,
            slots: GuessRow::new(slot_count),
            phase: SessionPhase::Loading,
            input: String::new(),
            confetti: false,
            attempts: Vec::new(),
        }
    }

    pub fn bucket_id(&self) -> Option<&str> {
        self.round.as_ref().map(|round| round.bucket_id.as_str())
    }

    /// Puts `round` on screen with `slots` (fresh when `None`). The phase
    /// follows the slots, so restoring a finished row lands in Won/Lost.
    pub fn start(&mut self, round: Round, slots: Option<GuessRow>) {
        self.slots = slots.unwrap_or_else(|| GuessRow::new(self.slot_count));
        self.phase = match self.slots.outcome() {
            SlotOutcome::InProgress => SessionPhase::AwaitingInput,
            SlotOutcome::Won => SessionPhase::Won,
            SlotOutcome::Lost => SessionPhase::Lost,
        };
        trace!(target: "session", "Round {} on screen ({:?})", round.bucket_id, self.phase);
        self.round = Some(round);
        self.input.clear();
        self.confetti = false;
        self.attempts.clear();
    }

    /// Back to an empty loading screen.
    pub fn clear(&mut self) {
        self.round = None;
        self.slots = GuessRow::new(self.slot_count);
        self.phase = SessionPhase::Loading;
        self.input.clear();
        self.confetti = false;
        self.attempts.clear();
    }

    /// Drops input, animation and confetti flags without touching the round.
    pub fn reset_transient(&mut self) {
        self.input.clear();
        self.confetti = false;
        if self.phase == SessionPhase::Animating {
            self.phase = if self.round.is_some() {
                SessionPhase::AwaitingInput
            } else {
                SessionPhase::Loading
            };
        }
    }

    /// Applies a character or backspace; Enter is handled by the caller.
    pub fn apply_key(&mut self, key: KeyInput) -> bool {
        if !self.phase.accepts_input() {
            return false;
        }
        match key {
            KeyInput::Char(c) if KeyInput::is_typeable(c) => {
                self.input.push(c);
                true
            }
            KeyInput::Backspace => self.input.pop().is_some(),
            _ => false,
        }
    }

    pub fn is_answer(&self, guess: &str, accept_alt: bool) -> bool {
        let Some(round) = &self.round else {
            return false;
        };
        let guess = guess.normalize_guess();
        if guess == round.answer.normalize_guess() {
            return true;
        }
        accept_alt
            && round
                .alt_answer
                .as_deref()
                .map(|alt| !alt.trim().is_empty() && guess == alt.normalize_guess())
                .unwrap_or(false)
    }

    /// Validates and locks in the current input, entering `Animating`.
    pub fn begin_guess(&mut self, accept_alt: bool) -> Result<PendingGuess, GuessRejected> {
        let text = self.input.normalize_guess();
        let rejection = if text.is_empty() {
            Some(GuessRejected::EmptyInput)
        } else if self.round.is_none() {
            Some(GuessRejected::NoRound)
        } else if self.phase == SessionPhase::Animating {
            Some(GuessRejected::Animating)
        } else if self.phase.is_terminal() {
            Some(GuessRejected::RoundOver)
        } else if self.slots.remaining() == 0 {
            Some(GuessRejected::NoSlotsLeft)
        } else {
            None
        };
        if let Some(reason) = rejection {
            debug!(target: "session", "Guess {:?} rejected: {:?}", text, reason);
            return Err(reason);
        }

        let correct = self.is_answer(&text, accept_alt);
        let guess_number = self.slots.next_guess_number();
        self.phase = SessionPhase::Animating;
        self.input.clear();
        Ok(PendingGuess {
            bucket_id: self.bucket_id().unwrap_or_default().to_string(),
            text,
            correct,
            guess_number,
        })
    }

    /// Writes the slot for `pending` and settles the phase.
    pub fn commit_guess(&mut self, pending: &PendingGuess) -> SlotOutcome {
        let slot = if pending.correct {
            GuessSlot::Correct
        } else {
            GuessSlot::Incorrect
        };
        self.slots.mark_next(slot);
        self.attempts.push(pending.text.clone());
        let outcome = self.slots.outcome();
        self.phase = match outcome {
            SlotOutcome::InProgress => SessionPhase::AwaitingInput,
            SlotOutcome::Won => SessionPhase::Won,
            SlotOutcome::Lost => SessionPhase::Lost,
        };
        if outcome == SlotOutcome::Won {
            self.confetti = true;
        }
        outcome
    }
}
