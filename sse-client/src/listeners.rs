use log::*;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`Listeners::on`]; used to unsubscribe exactly one
/// listener without affecting others registered for the same event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Per-event-name listener registry. Dispatch clones the callback list out
/// of the lock first, so listeners may themselves subscribe or unsubscribe.
pub struct Listeners {
    next_id: AtomicU64,
    by_event: Mutex<HashMap<String, Vec<(ListenerId, Callback)>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            by_event: Mutex::new(HashMap::new()),
        }
    }

    pub fn on(&self, event: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut map) = self.by_event.lock() {
            map.entry(event.to_string())
                .or_default()
                .push((id, Arc::new(callback)));
        }
        id
    }

    /// Removes one listener; returns whether it was found.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let Ok(mut map) = self.by_event.lock() else {
            return false;
        };
        let Some(listeners) = map.get_mut(event) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() < before;
        if listeners.is_empty() {
            map.remove(event);
        }
        removed
    }

    /// Invokes every listener registered for `event`. A panicking listener
    /// is isolated and must not prevent delivery to the rest; returns the
    /// number of listeners that completed normally.
    pub fn dispatch(&self, event: &str, data: &Value) -> usize {
        let callbacks: Vec<Callback> = match self.by_event.lock() {
            Ok(map) => map
                .get(event)
                .map(|listeners| listeners.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return 0,
        };

        let mut completed = 0;
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(data))).is_ok() {
                completed += 1;
            } else {
                warn!("Listener for '{event}' panicked; continuing with remaining listeners");
            }
        }
        completed
    }
}

impl Default for Listeners {
    fn default() -> Self {
        Self::new()
    }
}
