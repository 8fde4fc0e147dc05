use futures::task::LocalSpawn;
use std::rc::Rc;

use super::clock::Clock;
use crate::source::{PoolSource, Telemetry};
use crate::storage::KeyValueStore;

/// Collaborators shared by every controller on a page.
#[derive(Clone)]
pub struct Services {
    pub source: Rc<dyn PoolSource>,
    pub telemetry: Rc<dyn Telemetry>,
    pub store: Rc<dyn KeyValueStore>,
    pub clock: Rc<dyn Clock>,
    pub spawner: Rc<dyn LocalSpawn>,
}
