use serde_with::serde_as;
use serde_with::TimestampSeconds;
use std::time::SystemTime;
use uuid::Uuid;

use super::{BucketId, GroupCategory, GroupFilter, GuessSlot, HintState, Round, RoundDisplay};
use crate::codec;

fn default_version() -> u32 {
    2
}

/// A round as it sits in client-visible storage: answers are kept as codec
/// tokens, never plain text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SavedRound {
    pub bucket_id: BucketId,
    #[serde(default)]
    pub answer_token: String,
    #[serde(default)]
    pub alt_answer_token: Option<String>,
    #[serde(default)]
    pub category: Option<GroupCategory>,
    pub display: RoundDisplay,
}

impl SavedRound {
    pub fn from_round(round: &Round) -> Self {
        Self {
            bucket_id: round.bucket_id.clone(),
            answer_token: codec::encode(&round.answer),
            alt_answer_token: round.alt_answer.as_deref().map(codec::encode),
            category: round.category,
            display: round.display.clone(),
        }
    }

    pub fn has_answer(&self) -> bool {
        !self.answer_token.trim().is_empty() && !codec::decode(&self.answer_token).is_empty()
    }

    /// `None` when the stored answer is missing or does not decode.
    pub fn to_round(&self) -> Option<Round> {
        if self.bucket_id.trim().is_empty() {
            return None;
        }
        let answer = codec::decode(&self.answer_token);
        if answer.trim().is_empty() {
            return None;
        }
        let alt_answer = self
            .alt_answer_token
            .as_deref()
            .map(codec::decode)
            .filter(|alt| !alt.trim().is_empty());
        Some(Round {
            bucket_id: self.bucket_id.clone(),
            answer,
            alt_answer,
            category: self.category,
            display: self.display.clone(),
        })
    }
}

/// Persisted in-flight infinite/hangul session.
#[serde_as]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub run_id: Uuid,
    pub current: SavedRound,
    pub slots: Vec<GuessSlot>,
    pub skips_remaining: u32,
    #[serde(default)]
    pub hint: HintState,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub group_filter: GroupFilter,
    #[serde(default)]
    pub buffer: Vec<SavedRound>,
    #[serde(default)]
    pub buffer_index: usize,
    #[serde_as(as = "TimestampSeconds")]
    pub saved_at: SystemTime,
}

impl SessionSnapshot {
    /// Rounds still waiting in the lookahead buffer, decoded. Entries that no
    /// longer decode are dropped.
    pub fn pending_rounds(&self) -> Vec<Round> {
        self.buffer
            .iter()
            .skip(self.buffer_index)
            .filter_map(SavedRound::to_round)
            .collect()
    }
}
