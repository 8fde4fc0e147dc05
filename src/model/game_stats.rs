use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use serde_with::TimestampSeconds;
use std::collections::BTreeMap;
use std::time::SystemTime;

use super::{BucketId, GuessSlot};

const DAY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_FORMAT).ok()
}

/// How the calendar day mode ended on a given day.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCompletion {
    pub round_id: BucketId,
    pub won: bool,
    pub guess_count: usize,
    /// Codec token, not plain text.
    pub answer_token: String,
    #[serde(default)]
    pub attempts: Vec<String>,
    #[serde_as(as = "TimestampSeconds")]
    pub completed_at: SystemTime,
}

/// Unfinished daily round, valid only for `day`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyProgress {
    pub day: String,
    pub round_id: BucketId,
    pub slots: Vec<GuessSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GuessLog {
    pub day: String,
    pub attempts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StatsRecord {
    #[serde(default)]
    pub games_played: u32,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub max_streak: u32,
    /// Wins keyed by the guess number that won.
    #[serde(default)]
    pub guess_histogram: BTreeMap<u32, u32>,
    #[serde(default)]
    pub last_played: Option<String>,
    /// Calendar day mode only.
    #[serde(default)]
    pub completions: BTreeMap<String, DailyCompletion>,
}

impl StatsRecord {
    fn streak_continues(&self, today: NaiveDate) -> bool {
        let Some(last) = self.last_played.as_deref().and_then(parse_day_key) else {
            return false;
        };
        last == today || last.succ_opt() == Some(today)
    }

    pub fn apply_outcome(&mut self, won: bool, guess_count: usize, today: NaiveDate) {
        self.games_played += 1;
        if won {
            self.wins += 1;
            *self
                .guess_histogram
                .entry(guess_count as u32)
                .or_insert(0) += 1;
            self.current_streak = if self.streak_continues(today) {
                self.current_streak + 1
            } else {
                1
            };
        } else {
            self.current_streak = 0;
        }
        self.max_streak = self.max_streak.max(self.current_streak);
        self.last_played = Some(day_key(today));
    }
}
