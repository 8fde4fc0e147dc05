use itertools::Itertools;
use log::{debug, warn};
use std::collections::HashSet;
use std::rc::Rc;

use super::repositories::SeenPoolRepository;
use crate::model::{GroupFilter, Round};
use crate::source::{BatchRequest, PoolDomain, PoolSource};

/// Lookahead queue of rounds not yet played.
#[derive(Debug, Clone, Default)]
pub struct PrefetchBuffer {
    rounds: Vec<Round>,
    index: usize,
}

impl PrefetchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(rounds: Vec<Round>) -> Self {
        Self { rounds, index: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.rounds.len().saturating_sub(self.index)
    }

    pub fn pending(&self) -> &[Round] {
        &self.rounds[self.index.min(self.rounds.len())..]
    }

    pub fn take_next(&mut self) -> Option<Round> {
        let round = self.rounds.get(self.index).cloned()?;
        self.index += 1;
        Some(round)
    }

    pub fn needs_refill(&self, threshold: usize) -> bool {
        self.remaining() <= threshold
    }

    /// Appends rounds not already pending, dropping the consumed prefix.
    pub fn append(&mut self, batch: Vec<Round>) -> usize {
        self.rounds.drain(..self.index.min(self.rounds.len()));
        self.index = 0;
        let pending: HashSet<String> = self.rounds.iter().map(|r| r.bucket_id.clone()).collect();
        let before = self.rounds.len();
        self.rounds.extend(
            batch
                .into_iter()
                .filter(|round| !pending.contains(&round.bucket_id)),
        );
        self.rounds.len() - before
    }

    /// Drops pending rounds the filter no longer admits.
    pub fn retain_admitted(&mut self, filter: GroupFilter) {
        self.rounds.drain(..self.index.min(self.rounds.len()));
        self.index = 0;
        self.rounds.retain(|round| filter.admits(round.category));
    }

    pub fn clear(&mut self) {
        self.rounds.clear();
        self.index = 0;
    }
}

/// Fetches a batch excluding the seen pool. When the source cannot satisfy
/// the exclusion the seen pool is cleared and the request repeated once
/// without it. Every returned id is added to the seen pool.
pub async fn draw_batch(
    source: Rc<dyn PoolSource>,
    seen: SeenPoolRepository,
    domain: PoolDomain,
    count: usize,
    group_filter: GroupFilter,
) -> Vec<Round> {
    let excluding = seen.load();
    let had_exclusions = !excluding.is_empty();
    let mut batch = fetch(&source, domain, count, excluding, group_filter).await;

    if batch.is_empty() && had_exclusions {
        debug!(target: "prefetch", "{:?} pool exhausted under exclusions; starting over", domain);
        seen.clear();
        batch = fetch(&source, domain, count, HashSet::new(), group_filter).await;
    }

    let batch: Vec<Round> = batch
        .into_iter()
        .filter(|round| group_filter.admits(round.category))
        .filter(|round| {
            let usable = round.is_renderable();
            if !usable {
                warn!(target: "prefetch", "Dropping unrenderable round {:?}", round.bucket_id);
            }
            usable
        })
        .unique_by(|round| round.bucket_id.clone())
        .collect();

    seen.extend(batch.iter().map(|round| &round.bucket_id));
    batch
}

async fn fetch(
    source: &Rc<dyn PoolSource>,
    domain: PoolDomain,
    count: usize,
    excluding: HashSet<String>,
    group_filter: GroupFilter,
) -> Vec<Round> {
    let request = BatchRequest {
        domain,
        count,
        excluding,
        group_filter,
    };
    match source.fetch_random_batch(request).await {
        Ok(batch) => batch,
        Err(err) => {
            warn!(target: "prefetch", "Batch fetch for {:?} failed: {}", domain, err);
            Vec::new()
        }
    }
}
