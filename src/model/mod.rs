mod countdown_anchor;
mod daily_puzzle;
mod game_mode;
mod game_stats;
mod guess_slot;
mod hint;
mod key_input;
mod round;
mod session_event;
mod session_phase;
mod session_projection;
pub mod session_snapshot;

pub use countdown_anchor::{format_remaining, CountdownAnchor};
pub use daily_puzzle::DailyPuzzle;
pub use game_mode::{GameMode, StatsMode};
pub use game_stats::{day_key, parse_day_key, DailyCompletion, DailyProgress, GuessLog, StatsRecord};
pub use guess_slot::{GuessRow, GuessSlot, SlotOutcome};
pub use hint::{HintReveal, HintState};
pub use key_input::KeyInput;
pub use round::{
    BucketId, GroupCategory, GroupFilter, HangulDisplay, PhotoDisplay, Round, RoundDisplay,
};
pub use session_event::{RoundResult, SessionEvent};
pub use session_phase::SessionPhase;
pub use session_projection::{SessionProjection, SessionView};
pub use session_snapshot::{SavedRound, SessionSnapshot};
