use std::fmt;

use crate::model::StatsMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    DailyStats,
    InfiniteStats,
    HangulStats,
    DailyProgress,
    DailyAttempts,
    InfiniteSnapshot,
    HangulSnapshot,
    InfiniteSeen,
    HangulSeen,
    PhotoGroupFilter,
    HangulGroupFilter,
    SelectedMode,
    Visited,
}

impl StorageKey {
    #[cfg(test)]
    pub fn all() -> [StorageKey; 13] {
        [
            StorageKey::DailyStats,
            StorageKey::InfiniteStats,
            StorageKey::HangulStats,
            StorageKey::DailyProgress,
            StorageKey::DailyAttempts,
            StorageKey::InfiniteSnapshot,
            StorageKey::HangulSnapshot,
            StorageKey::InfiniteSeen,
            StorageKey::HangulSeen,
            StorageKey::PhotoGroupFilter,
            StorageKey::HangulGroupFilter,
            StorageKey::SelectedMode,
            StorageKey::Visited,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::DailyStats => "pixidol.stats.daily",
            StorageKey::InfiniteStats => "pixidol.stats.infinite",
            StorageKey::HangulStats => "pixidol.stats.hangul",
            StorageKey::DailyProgress => "pixidol.daily.progress",
            StorageKey::DailyAttempts => "pixidol.daily.attempts",
            StorageKey::InfiniteSnapshot => "pixidol.infinite.snapshot",
            StorageKey::HangulSnapshot => "pixidol.hangul.snapshot",
            StorageKey::InfiniteSeen => "pixidol.infinite.seen",
            StorageKey::HangulSeen => "pixidol.hangul.seen",
            StorageKey::PhotoGroupFilter => "pixidol.infinite.group-filter",
            StorageKey::HangulGroupFilter => "pixidol.hangul.group-filter",
            StorageKey::SelectedMode => "pixidol.mode",
            StorageKey::Visited => "pixidol.visited",
        }
    }

    pub fn stats(mode: StatsMode) -> StorageKey {
        match mode {
            StatsMode::Daily => StorageKey::DailyStats,
            StatsMode::Infinite => StorageKey::InfiniteStats,
            StatsMode::Hangul => StorageKey::HangulStats,
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
