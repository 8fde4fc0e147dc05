use serde::{Deserialize, Serialize};

use super::BucketId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintReveal {
    GroupName(String),
    Image(String),
}

/// One hint per run; stays revealed for the round it was spent on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HintState {
    pub used: bool,
    #[serde(default)]
    pub round: Option<BucketId>,
}

impl HintState {
    pub fn is_revealed_for(&self, bucket_id: &str) -> bool {
        self.used && self.round.as_deref() == Some(bucket_id)
    }

    pub fn spend(&mut self, bucket_id: &str) -> bool {
        if self.used {
            return false;
        }
        self.used = true;
        self.round = Some(bucket_id.to_string());
        true
    }
}
