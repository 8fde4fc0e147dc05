use chrono::{DateTime, Utc};

use super::Round;

/// Current daily round as reported by the pool source, with the server's
/// clock reading taken when the response was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyPuzzle {
    pub round: Round,
    pub end_at: DateTime<Utc>,
    pub server_now: DateTime<Utc>,
}
