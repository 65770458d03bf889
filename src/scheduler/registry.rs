//! Capacity-keyed scheduler instances
//!
//! `Scheduler::get_instance(capacity)` memoizes one scheduler per capacity
//! key in a guarded static map: the first call for a key constructs the
//! instance, later calls return the same `Arc`.

use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use super::{Scheduler, SchedulerConfig};

static INSTANCES: Lazy<Mutex<HashMap<usize, Arc<Scheduler>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

pub(crate) fn get_or_create(capacity: usize) -> Arc<Scheduler> {
    let mut instances = INSTANCES.lock();
    instances
        .entry(capacity)
        .or_insert_with(|| {
            debug!(capacity, "constructing shared scheduler instance");
            Scheduler::with_config(SchedulerConfig { capacity })
        })
        .clone()
}
