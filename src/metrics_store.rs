use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{Error, Result};

/// Per-campaign execution counters consulted by execution-count trigger conditions.
///
/// Trigger evaluation only reads from the store. Counters are advanced by the
/// [`Engine`](crate::Engine) when an event matches a campaign's condition, and cleared when the
/// user asks to be forgotten.
pub trait MetricsStore {
    /// Number of recorded executions for `campaign_id`.
    fn execution_count(&self, campaign_id: i64) -> u64;

    /// Record one more execution for `campaign_id`.
    fn record_execution(&self, campaign_id: i64) -> Result<()>;

    /// Remove all counters.
    fn clear(&self) -> Result<()>;
}

impl<T: MetricsStore + ?Sized> MetricsStore for Arc<T> {
    fn execution_count(&self, campaign_id: i64) -> u64 {
        (**self).execution_count(campaign_id)
    }

    fn record_execution(&self, campaign_id: i64) -> Result<()> {
        (**self).record_execution(campaign_id)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

/// [`MetricsStore`] that keeps counters in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsStore {
    executions: Mutex<HashMap<i64, u64>>,
}

impl InMemoryMetricsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        InMemoryMetricsStore::default()
    }
}

impl MetricsStore for InMemoryMetricsStore {
    fn execution_count(&self, campaign_id: i64) -> u64 {
        // A poisoned lock is reported as no executions rather than crashing the host app.
        self.executions
            .lock()
            .ok()
            .and_then(|executions| executions.get(&campaign_id).copied())
            .unwrap_or(0)
    }

    fn record_execution(&self, campaign_id: i64) -> Result<()> {
        let mut executions = self.executions.lock().map_err(|_| Error::StorePoisoned)?;
        *executions.entry(campaign_id).or_insert(0) += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.executions
            .lock()
            .map_err(|_| Error::StorePoisoned)?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{InMemoryMetricsStore, MetricsStore};

    #[test]
    fn counts_executions_per_campaign() {
        let store = InMemoryMetricsStore::new();
        assert_eq!(store.execution_count(1), 0);

        store.record_execution(1).unwrap();
        store.record_execution(1).unwrap();
        store.record_execution(2).unwrap();

        assert_eq!(store.execution_count(1), 2);
        assert_eq!(store.execution_count(2), 1);
        assert_eq!(store.execution_count(3), 0);
    }

    #[test]
    fn clear_resets_all_counters() {
        let store = InMemoryMetricsStore::new();
        store.record_execution(1).unwrap();
        store.clear().unwrap();
        assert_eq!(store.execution_count(1), 0);
    }

    #[test]
    fn can_record_from_another_thread() {
        let store = Arc::new(InMemoryMetricsStore::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.record_execution(7).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.execution_count(7), 4);
    }
}
