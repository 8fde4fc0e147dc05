use chrono::NaiveDate;
use log::{debug, info};
use std::rc::Rc;
use std::time::SystemTime;

use super::clock::Clock;
use crate::codec;
use crate::model::{
    day_key, BucketId, DailyCompletion, DailyProgress, GuessLog, GuessSlot, StatsMode, StatsRecord,
};
use crate::storage::{load_json, load_json_or_default, remove_key, save_json, KeyValueStore, StorageKey};

/// A finished round as reported to the tracker.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub won: bool,
    pub guess_count: usize,
    pub round_id: Option<BucketId>,
    pub answer: Option<String>,
    pub attempts: Vec<String>,
}

/// Owns one mode's stats record. The in-memory record is authoritative for
/// the page lifetime; writes that fail are logged and retried implicitly on
/// the next change.
pub struct StatsTracker {
    store: Rc<dyn KeyValueStore>,
    clock: Rc<dyn Clock>,
    mode: StatsMode,
    record: StatsRecord,
}

impl StatsTracker {
    pub fn new(store: Rc<dyn KeyValueStore>, clock: Rc<dyn Clock>, mode: StatsMode) -> Self {
        let record: StatsRecord = load_json_or_default(store.as_ref(), StorageKey::stats(mode));
        debug!(
            target: "stats",
            "Loaded {:?} stats: {} played, {} won",
            mode, record.games_played, record.wins
        );
        Self {
            store,
            clock,
            mode,
            record,
        }
    }

    pub fn record(&self) -> &StatsRecord {
        &self.record
    }

    fn is_daily(&self) -> bool {
        self.mode == StatsMode::Daily
    }

    fn save(&self) {
        save_json(self.store.as_ref(), StorageKey::stats(self.mode), &self.record);
    }

    /// Applies a finished round. In the calendar-day mode a second outcome for
    /// a day that is already complete is ignored; returns whether anything
    /// changed.
    pub fn record_outcome(&mut self, today: NaiveDate, outcome: RoundOutcome) -> bool {
        let day = day_key(today);
        if self.is_daily() && self.record.completions.contains_key(&day) {
            debug!(target: "stats", "Daily outcome for {} already recorded", day);
            return false;
        }

        self.record
            .apply_outcome(outcome.won, outcome.guess_count, today);

        if self.is_daily() {
            let completion = DailyCompletion {
                round_id: outcome.round_id.unwrap_or_default(),
                won: outcome.won,
                guess_count: outcome.guess_count,
                answer_token: outcome
                    .answer
                    .as_deref()
                    .map(codec::encode)
                    .unwrap_or_default(),
                attempts: outcome.attempts,
                completed_at: SystemTime::from(self.clock.now()),
            };
            self.record.completions.insert(day, completion);
        }

        info!(
            target: "stats",
            "{:?} outcome recorded: won={} guesses={} streak={}",
            self.mode, outcome.won, outcome.guess_count, self.record.current_streak
        );
        self.save();
        true
    }

    pub fn is_today_complete(&self, today: NaiveDate) -> bool {
        self.is_daily() && self.record.completions.contains_key(&day_key(today))
    }

    pub fn today_completion(&self, today: NaiveDate) -> Option<&DailyCompletion> {
        if !self.is_daily() {
            return None;
        }
        self.record.completions.get(&day_key(today))
    }

    pub fn save_in_progress(&self, today: NaiveDate, round_id: &str, slots: &[GuessSlot]) {
        if !self.is_daily() {
            return;
        }
        let progress = DailyProgress {
            day: day_key(today),
            round_id: round_id.to_string(),
            slots: slots.to_vec(),
        };
        save_json(self.store.as_ref(), StorageKey::DailyProgress, &progress);
    }

    /// Today's unfinished round, if one was saved today.
    pub fn load_in_progress(&self, today: NaiveDate) -> Option<DailyProgress> {
        if !self.is_daily() {
            return None;
        }
        let progress: DailyProgress = load_json(self.store.as_ref(), StorageKey::DailyProgress)?;
        if progress.day != day_key(today) {
            debug!(target: "stats", "Ignoring daily progress from {}", progress.day);
            return None;
        }
        Some(progress)
    }

    pub fn clear_in_progress(&self) {
        if self.is_daily() {
            remove_key(self.store.as_ref(), StorageKey::DailyProgress);
        }
    }

    pub fn record_guess_attempt(&self, today: NaiveDate, text: &str) {
        if !self.is_daily() {
            return;
        }
        let day = day_key(today);
        let mut log: GuessLog = load_json_or_default(self.store.as_ref(), StorageKey::DailyAttempts);
        if log.day != day {
            log = GuessLog {
                day,
                attempts: Vec::new(),
            };
        }
        log.attempts.push(text.to_string());
        save_json(self.store.as_ref(), StorageKey::DailyAttempts, &log);
    }

    pub fn list_guess_attempts(&self, today: NaiveDate) -> Vec<String> {
        if !self.is_daily() {
            return Vec::new();
        }
        let log: GuessLog = load_json_or_default(self.store.as_ref(), StorageKey::DailyAttempts);
        if log.day == day_key(today) {
            log.attempts
        } else {
            Vec::new()
        }
    }
}
