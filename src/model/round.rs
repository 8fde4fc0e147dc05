use serde::{Deserialize, Serialize};

/// Opaque identity of a round's subject; also the seen-pool dedup key.
pub type BucketId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupCategory {
    BoyGroup,
    GirlGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GroupFilter {
    BoyGroup,
    GirlGroup,
    #[default]
    Both,
}

impl GroupFilter {
    /// Uncategorised rounds are only admitted by `Both`.
    pub fn admits(&self, category: Option<GroupCategory>) -> bool {
        match (self, category) {
            (GroupFilter::Both, _) => true,
            (GroupFilter::BoyGroup, Some(GroupCategory::BoyGroup)) => true,
            (GroupFilter::GirlGroup, Some(GroupCategory::GirlGroup)) => true,
            _ => false,
        }
    }

    pub fn parse(value: &str) -> Option<GroupFilter> {
        match value.trim().to_lowercase().as_str() {
            "boy-group" | "boy" | "boys" => Some(GroupFilter::BoyGroup),
            "girl-group" | "girl" | "girls" => Some(GroupFilter::GirlGroup),
            "both" | "all" => Some(GroupFilter::Both),
            _ => None,
        }
    }
}

/// Pixelation tiers for a photo, most pixelated first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhotoDisplay {
    pub group_name: String,
    pub image_tiers: Vec<String>,
}

impl PhotoDisplay {
    /// Tier shown after `guesses_made` guesses; the clearest tier once the
    /// round is over.
    pub fn tier_for(&self, guesses_made: usize, finished: bool) -> Option<&str> {
        let last = self.image_tiers.len().checked_sub(1)?;
        let index = if finished {
            last
        } else {
            guesses_made.min(last)
        };
        self.image_tiers.get(index).map(String::as_str)
    }

    pub fn is_renderable(&self) -> bool {
        !self.group_name.trim().is_empty()
            && !self.image_tiers.is_empty()
            && self.image_tiers.iter().all(|tier| !tier.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HangulDisplay {
    pub hangul: String,
    #[serde(default)]
    pub group_name: Option<String>,
    /// Revealed by the hint. Many hangul rounds have no usable photo.
    #[serde(default)]
    pub image: Option<String>,
}

impl HangulDisplay {
    pub fn is_renderable(&self) -> bool {
        !self.hangul.trim().is_empty()
    }

    pub fn revealable_image(&self) -> Option<&str> {
        self.image
            .as_deref()
            .filter(|image| !image.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RoundDisplay {
    Photo(PhotoDisplay),
    Hangul(HangulDisplay),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub bucket_id: BucketId,
    pub answer: String,
    #[serde(default)]
    pub alt_answer: Option<String>,
    #[serde(default)]
    pub category: Option<GroupCategory>,
    pub display: RoundDisplay,
}

impl Round {
    pub fn is_renderable(&self) -> bool {
        if self.bucket_id.trim().is_empty() || self.answer.trim().is_empty() {
            return false;
        }
        match &self.display {
            RoundDisplay::Photo(photo) => photo.is_renderable(),
            RoundDisplay::Hangul(hangul) => hangul.is_renderable(),
        }
    }

    pub fn photo(&self) -> Option<&PhotoDisplay> {
        match &self.display {
            RoundDisplay::Photo(photo) => Some(photo),
            RoundDisplay::Hangul(_) => None,
        }
    }

    pub fn hangul(&self) -> Option<&HangulDisplay> {
        match &self.display {
            RoundDisplay::Hangul(hangul) => Some(hangul),
            RoundDisplay::Photo(_) => None,
        }
    }
}
