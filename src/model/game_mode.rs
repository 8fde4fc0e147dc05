use serde::{Deserialize, Serialize};

/// Top-level mode of the photo controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    #[default]
    Daily,
    Infinite,
}

/// Which stats record an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    Daily,
    Infinite,
    Hangul,
}
