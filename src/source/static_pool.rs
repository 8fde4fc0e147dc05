use chrono::{Duration as ChronoDuration, NaiveTime};
use futures::future::{self, FutureExt, LocalBoxFuture};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use super::{BatchRequest, PoolDomain, PoolSource, SourceError};
use crate::game::clock::Clock;
use crate::model::{DailyPuzzle, Round};

/// On-disk pool consumed by [`StaticPoolSource`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolFile {
    #[serde(default)]
    pub photo: Vec<Round>,
    #[serde(default)]
    pub hangul: Vec<Round>,
}

impl PoolFile {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| SourceError::Unavailable(format!("{}: {}", path.display(), err)))?;
        serde_json::from_str(&contents).map_err(|err| SourceError::Malformed(err.to_string()))
    }
}

/// Serves rounds from a fixed pool. The daily round rotates through the
/// photo pool once per clock day, ending at the next UTC midnight.
pub struct StaticPoolSource {
    pool: Rc<PoolFile>,
    clock: Rc<dyn Clock>,
    rng: RefCell<StdRng>,
}

impl StaticPoolSource {
    pub fn new(pool: PoolFile, clock: Rc<dyn Clock>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            pool: Rc::new(pool),
            clock,
            rng: RefCell::new(rng),
        }
    }

    fn rounds(&self, domain: PoolDomain) -> &[Round] {
        match domain {
            PoolDomain::Photo => &self.pool.photo,
            PoolDomain::Hangul => &self.pool.hangul,
        }
    }

    fn daily(&self) -> Option<DailyPuzzle> {
        let now = self.clock.now();
        let today = self.clock.today();
        let day_index = today.signed_duration_since(chrono::NaiveDate::MIN).num_days();
        let photo = &self.pool.photo;
        if photo.is_empty() {
            return None;
        }
        let round = photo[day_index.rem_euclid(photo.len() as i64) as usize].clone();
        let end_at = (today + ChronoDuration::days(1))
            .and_time(NaiveTime::MIN)
            .and_utc();
        Some(DailyPuzzle {
            round,
            end_at,
            server_now: now,
        })
    }

    fn candidates(&self, request: &BatchRequest, honour_exclusions: bool) -> Vec<Round> {
        self.rounds(request.domain)
            .iter()
            .filter(|round| request.group_filter.admits(round.category))
            .filter(|round| !honour_exclusions || !request.excluding.contains(&round.bucket_id))
            .cloned()
            .collect()
    }

    fn batch(&self, request: &BatchRequest) -> Vec<Round> {
        let mut candidates = self.candidates(request, true);
        if candidates.is_empty() && !request.excluding.is_empty() {
            debug!(
                target: "prefetch",
                "All {} candidates excluded; drawing without exclusions",
                request.excluding.len()
            );
            candidates = self.candidates(request, false);
        }
        candidates.shuffle(&mut *self.rng.borrow_mut());
        candidates.truncate(request.count);
        trace!(
            target: "prefetch",
            "Static pool served {} of {} requested ({} excluded)",
            candidates.len(),
            request.count,
            request.excluding.len()
        );
        candidates
    }
}

impl PoolSource for StaticPoolSource {
    fn fetch_current_daily(
        &self,
    ) -> LocalBoxFuture<'static, Result<Option<DailyPuzzle>, SourceError>> {
        let daily = self.daily();
        if daily.is_none() {
            debug!(target: "daily", "Static pool has no photo rounds for a daily puzzle");
        }
        future::ready(Ok(daily)).boxed_local()
    }

    fn fetch_random_batch(
        &self,
        request: BatchRequest,
    ) -> LocalBoxFuture<'static, Result<Vec<Round>, SourceError>> {
        future::ready(Ok(self.batch(&request))).boxed_local()
    }
}
