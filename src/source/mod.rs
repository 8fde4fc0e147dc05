//! Seams to the hosted backend: round pools and fire-and-forget reporting.

mod static_pool;

pub use static_pool::{PoolFile, StaticPoolSource};

use futures::future::LocalBoxFuture;
use log::info;
use std::collections::HashSet;

use crate::model::{BucketId, DailyPuzzle, GroupFilter, Round};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("pool source unavailable: {0}")]
    Unavailable(String),
    #[error("pool source returned malformed data: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolDomain {
    Photo,
    Hangul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub domain: PoolDomain,
    pub count: usize,
    pub excluding: HashSet<BucketId>,
    pub group_filter: GroupFilter,
}

pub trait PoolSource {
    /// `Ok(None)` when the backend has no daily round right now.
    fn fetch_current_daily(&self) -> LocalBoxFuture<'static, Result<Option<DailyPuzzle>, SourceError>>;

    /// Up to `request.count` random rounds not in `request.excluding`.
    /// Must accept an empty exclusion set.
    fn fetch_random_batch(
        &self,
        request: BatchRequest,
    ) -> LocalBoxFuture<'static, Result<Vec<Round>, SourceError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackCategory {
    Bug,
    WrongAnswer,
    Suggestion,
    Other,
}

/// Analytics sink. Failures are logged by the caller and never change game
/// state.
pub trait Telemetry {
    fn report_guess(
        &self,
        round_id: &str,
        text: &str,
        correct: bool,
        guess_number: usize,
    ) -> Result<(), SourceError>;

    fn report_round_outcome(
        &self,
        round_id: &str,
        guess_count: usize,
        streak: u32,
    ) -> Result<(), SourceError>;

    fn report_feedback(&self, category: FeedbackCategory, message: &str)
        -> Result<(), SourceError>;
}

/// Telemetry that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn report_guess(
        &self,
        round_id: &str,
        text: &str,
        correct: bool,
        guess_number: usize,
    ) -> Result<(), SourceError> {
        info!(target: "telemetry", "guess {} on {}: {:?} correct={}", guess_number, round_id, text, correct);
        Ok(())
    }

    fn report_round_outcome(
        &self,
        round_id: &str,
        guess_count: usize,
        streak: u32,
    ) -> Result<(), SourceError> {
        info!(target: "telemetry", "round {} finished after {} guesses, streak {}", round_id, guess_count, streak);
        Ok(())
    }

    fn report_feedback(
        &self,
        category: FeedbackCategory,
        message: &str,
    ) -> Result<(), SourceError> {
        info!(target: "telemetry", "feedback {:?}: {}", category, message);
        Ok(())
    }
}
