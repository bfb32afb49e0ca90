//! The runner-side "stats" notification.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::report::TestReport;

pub type StatsListener = Arc<dyn Fn(TestReport) + Send + Sync>;

/// Something that fires a "stats" event for every result batch.
pub trait StatsNotifier {
    fn subscribe(&self, listener: StatsListener);
}

/// In-process notifier. Listeners run synchronously, in subscription order,
/// on the thread that calls [`EventEmitter::emit_stats`].
#[derive(Default, Clone)]
pub struct EventEmitter {
    listeners: Arc<Mutex<Vec<StatsListener>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_stats(&self, report: TestReport) {
        // Listeners are cloned out so one may subscribe another without deadlocking.
        let listeners: Vec<StatsListener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        debug!("emitting stats to {} listener(s)", listeners.len());

        for listener in listeners {
            listener(report.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl StatsNotifier for EventEmitter {
    fn subscribe(&self, listener: StatsListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}
