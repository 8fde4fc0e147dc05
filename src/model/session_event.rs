use std::time::Duration;

use super::{BucketId, GameMode, GuessSlot, HintReveal, RoundDisplay, SessionPhase, StatsRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    pub bucket_id: BucketId,
    pub won: bool,
    pub answer: String,
    pub guess_count: usize,
}

/// Everything a renderer needs to follow a controller.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ModeChanged(GameMode),
    PhaseChanged(SessionPhase),
    RoundStarted {
        bucket_id: BucketId,
        display: RoundDisplay,
        slot_count: usize,
    },
    SlotsChanged(Vec<GuessSlot>),
    InputChanged(String),
    HintRevealed(HintReveal),
    HintCleared,
    SkipsChanged(u32),
    StreakChanged(u32),
    ConfettiChanged(bool),
    CountdownTick {
        remaining: Duration,
    },
    RoundFinished(RoundResult),
    StatsChanged(StatsRecord),
}
