//! One repository per persisted concern; each owns its keys exclusively.

use log::{debug, warn};
use std::collections::HashSet;
use std::rc::Rc;

use crate::model::{BucketId, GameMode, GroupFilter, SessionSnapshot};
use crate::storage::{load_json, load_json_or_default, remove_key, save_json, KeyValueStore, StorageKey};

#[derive(Clone)]
pub struct SnapshotRepository {
    store: Rc<dyn KeyValueStore>,
    key: StorageKey,
}

impl SnapshotRepository {
    pub fn new(store: Rc<dyn KeyValueStore>, key: StorageKey) -> Self {
        Self { store, key }
    }

    pub fn load(&self) -> Option<SessionSnapshot> {
        load_json(self.store.as_ref(), self.key)
    }

    pub fn save(&self, snapshot: &SessionSnapshot) -> bool {
        save_json(self.store.as_ref(), self.key, snapshot)
    }

    pub fn clear(&self) {
        remove_key(self.store.as_ref(), self.key);
    }
}

/// Ids already shown in a variant. Only ever cleared as a whole.
#[derive(Clone)]
pub struct SeenPoolRepository {
    store: Rc<dyn KeyValueStore>,
    key: StorageKey,
}

impl SeenPoolRepository {
    pub fn new(store: Rc<dyn KeyValueStore>, key: StorageKey) -> Self {
        Self { store, key }
    }

    pub fn load(&self) -> HashSet<BucketId> {
        load_json_or_default(self.store.as_ref(), self.key)
    }

    pub fn extend<'a>(&self, ids: impl IntoIterator<Item = &'a BucketId>) {
        let mut seen = self.load();
        let before = seen.len();
        seen.extend(ids.into_iter().cloned());
        if seen.len() != before {
            save_json(self.store.as_ref(), self.key, &seen);
        }
    }

    pub fn clear(&self) {
        debug!(target: "prefetch", "Clearing seen pool {}", self.key);
        remove_key(self.store.as_ref(), self.key);
    }
}

/// User choices that outlive a session.
#[derive(Clone)]
pub struct Preferences {
    store: Rc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn selected_mode(&self) -> GameMode {
        load_json_or_default(self.store.as_ref(), StorageKey::SelectedMode)
    }

    pub fn set_selected_mode(&self, mode: GameMode) {
        save_json(self.store.as_ref(), StorageKey::SelectedMode, &mode);
    }

    pub fn group_filter(&self, key: StorageKey) -> GroupFilter {
        match key {
            StorageKey::PhotoGroupFilter | StorageKey::HangulGroupFilter => {
                load_json_or_default(self.store.as_ref(), key)
            }
            other => {
                warn!(target: "storage", "{} does not hold a group filter", other);
                GroupFilter::default()
            }
        }
    }

    pub fn set_group_filter(&self, key: StorageKey, filter: GroupFilter) {
        save_json(self.store.as_ref(), key, &filter);
    }

    pub fn is_first_visit(&self) -> bool {
        !load_json_or_default::<bool>(self.store.as_ref(), StorageKey::Visited)
    }

    pub fn mark_visited(&self) {
        save_json(self.store.as_ref(), StorageKey::Visited, &true);
    }
}
