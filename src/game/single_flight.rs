use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::rc::Rc;

type Flight<T> = Shared<LocalBoxFuture<'static, T>>;

/// Deduplicates concurrent runs of the same operation.
///
/// While an operation keyed `K` is outstanding, further requests for the same
/// key get the in-flight future instead of starting a second one. The entry
/// is released as soon as the operation completes.
pub struct SingleFlight<K, T: Clone> {
    inflight: Rc<RefCell<HashMap<K, Flight<T>>>>,
}

impl<K, T: Clone> Clone for SingleFlight<K, T> {
    fn clone(&self) -> Self {
        Self {
            inflight: Rc::clone(&self.inflight),
        }
    }
}

impl<K, T: Clone> Default for SingleFlight<K, T> {
    fn default() -> Self {
        Self {
            inflight: Rc::new(RefCell::new(HashMap::new())),
        }
    }
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Debug + 'static,
    T: Clone + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.borrow().contains_key(key)
    }

    /// `start` is only called when no flight for `key` is outstanding.
    pub fn run<F, Fut>(&self, key: K, start: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + 'static,
    {
        let existing = self.inflight.borrow().get(&key).cloned();
        if let Some(flight) = existing {
            debug!(target: "session", "Joining in-flight {:?}", key);
            return flight;
        }

        let task = start();
        let registry = Rc::downgrade(&self.inflight);
        let release_key = key.clone();
        let flight = async move {
            let output = task.await;
            if let Some(registry) = registry.upgrade() {
                registry.borrow_mut().remove(&release_key);
            }
            output
        }
        .boxed_local()
        .shared();
        self.inflight.borrow_mut().insert(key, flight.clone());
        flight
    }
}
