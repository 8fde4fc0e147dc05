use crate::model::{HintReveal, Round, RoundDisplay, SessionSnapshot, StatsMode};
use crate::source::PoolDomain;
use crate::storage::StorageKey;

/// What distinguishes one infinite-style variant from another. The session
/// machine itself is shared.
pub trait VariantPolicy: 'static {
    const NAME: &'static str;
    const SLOT_COUNT: usize;
    const DOMAIN: PoolDomain;
    const STATS_MODE: StatsMode;
    const SNAPSHOT_KEY: StorageKey;
    const SEEN_KEY: StorageKey;
    const FILTER_KEY: StorageKey;
    const ACCEPTS_ALT_ANSWER: bool = true;

    /// Whether a persisted snapshot carries everything needed to resume.
    fn snapshot_is_valid(snapshot: &SessionSnapshot) -> bool;

    /// Extra information revealed by spending the run's hint, if this round
    /// has any.
    fn hint_for(round: &Round) -> Option<HintReveal>;
}

/// Six guesses at a progressively de-pixelated photo.
#[derive(Debug)]
pub struct PhotoPolicy;

impl VariantPolicy for PhotoPolicy {
    const NAME: &'static str = "infinite";
    const SLOT_COUNT: usize = 6;
    const DOMAIN: PoolDomain = PoolDomain::Photo;
    const STATS_MODE: StatsMode = StatsMode::Infinite;
    const SNAPSHOT_KEY: StorageKey = StorageKey::InfiniteSnapshot;
    const SEEN_KEY: StorageKey = StorageKey::InfiniteSeen;
    const FILTER_KEY: StorageKey = StorageKey::PhotoGroupFilter;

    fn snapshot_is_valid(snapshot: &SessionSnapshot) -> bool {
        let current = &snapshot.current;
        if current.bucket_id.trim().is_empty() || !current.has_answer() {
            return false;
        }
        match &current.display {
            RoundDisplay::Photo(photo) => photo.is_renderable(),
            RoundDisplay::Hangul(_) => false,
        }
    }

    fn hint_for(round: &Round) -> Option<HintReveal> {
        let photo = round.photo()?;
        let name = photo.group_name.trim();
        if name.is_empty() {
            return None;
        }
        Some(HintReveal::GroupName(name.to_string()))
    }
}

/// Three guesses at a name written in hangul.
#[derive(Debug)]
pub struct HangulPolicy;

impl VariantPolicy for HangulPolicy {
    const NAME: &'static str = "hangul";
    const SLOT_COUNT: usize = 3;
    const DOMAIN: PoolDomain = PoolDomain::Hangul;
    const STATS_MODE: StatsMode = StatsMode::Hangul;
    const SNAPSHOT_KEY: StorageKey = StorageKey::HangulSnapshot;
    const SEEN_KEY: StorageKey = StorageKey::HangulSeen;
    const FILTER_KEY: StorageKey = StorageKey::HangulGroupFilter;

    // the photo is optional here; only the answer and the glyphs are required
    fn snapshot_is_valid(snapshot: &SessionSnapshot) -> bool {
        let current = &snapshot.current;
        if !current.has_answer() {
            return false;
        }
        match &current.display {
            RoundDisplay::Hangul(hangul) => !hangul.hangul.trim().is_empty(),
            RoundDisplay::Photo(_) => false,
        }
    }

    fn hint_for(round: &Round) -> Option<HintReveal> {
        round
            .hangul()?
            .revealable_image()
            .map(|image| HintReveal::Image(image.to_string()))
    }
}
