//! Periodic store maintenance.
//!
//! The maintenance task is registered with an externally owned scheduler;
//! the [`Task`] trait is the contract between the two. Growth is reactive
//! and coarse-grained on purpose: polling at a fixed interval keeps lock
//! contention off the hot read/write path, at the cost that a burst of
//! writes between polls can overshoot a partition's fill ratio before new
//! capacity appears.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::error::Error;
use crate::store::{MapDataStore, StoreState};

/// Outcome of a task run, reported back to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Never run, or skipped.
    Pending,
    /// Last run completed.
    Completed,
    /// Last run failed; see the log for the cause.
    Failed,
}

/// Contract between a periodic task and its externally owned scheduler.
pub trait Task: Send {
    /// True when the scheduler should invoke [`run`](Task::run) now.
    fn can_run(&self) -> bool;

    /// Executes one run and reports the updated task state.
    fn run(&mut self) -> TaskState;

    /// Releases the task's resources.
    fn dispose(&mut self);
}

/// Idempotent health check that grows a store's partition set when
/// existing partitions near capacity.
pub struct MaintenanceTask<K: 'static, V: 'static> {
    store: Weak<MapDataStore<K, V>>,
    interval: Duration,
    last_run: Option<Instant>,
    state: TaskState,
    last_error: Option<Error>,
}

impl<K: 'static, V: 'static> MaintenanceTask<K, V> {
    /// Builds the maintenance task for a store, using the store's
    /// configured interval. The task holds only a weak handle, so it never
    /// keeps a dropped store alive.
    pub fn for_store(store: &Arc<MapDataStore<K, V>>) -> Self {
        Self::new(Arc::downgrade(store), store.maintenance_interval())
    }

    fn new(store: Weak<MapDataStore<K, V>>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            last_run: None,
            state: TaskState::Pending,
            last_error: None,
        }
    }

    /// State reported by the last run.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Configured minimum interval between runs.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Failure captured by the most recent failed run, if any.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }
}

impl<K: 'static, V: 'static> Task for MaintenanceTask<K, V> {
    fn can_run(&self) -> bool {
        let due = self
            .last_run
            .map_or(true, |at| at.elapsed() >= self.interval);
        if !due {
            return false;
        }
        match self.store.upgrade() {
            Some(store) => store.state() == StoreState::Available,
            None => false,
        }
    }

    fn run(&mut self) -> TaskState {
        self.last_run = Some(Instant::now());
        let Some(store) = self.store.upgrade() else {
            debug!("store dropped; maintenance skipped");
            return self.state;
        };
        match store.state() {
            StoreState::Available => {}
            state => {
                debug!(store = %store.name(), %state, "maintenance skipped");
                return self.state;
            }
        }

        self.state = match store.run_check() {
            Ok(created) => {
                if created > 0 {
                    info!(store = %store.name(), created, "maintenance created partitions");
                }
                self.last_error = None;
                TaskState::Completed
            }
            Err(e) => {
                error!(store = %store.name(), error = %e, "maintenance run failed");
                self.last_error = Some(Error::Maintenance(e.to_string()));
                TaskState::Failed
            }
        };
        self.state
    }

    fn dispose(&mut self) {
        self.store = Weak::new();
        self.state = TaskState::Pending;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::config::{MapStoreConfig, PartitionsConfig};
    use crate::serializer::SerializerRegistry;

    fn config(dir: &TempDir) -> MapStoreConfig {
        MapStoreConfig {
            name: "maintenance-test".to_string(),
            key_serializer: None,
            value_serializer: None,
            partitions: PartitionsConfig {
                max_count: 3,
                min_count: 1,
                base_dir: dir.path().to_path_buf(),
                max_entries: 10,
                avg_key_size: 16,
                avg_value_size: 16,
                fill_percent: None,
            },
            maintenance_interval_secs: 0,
        }
    }

    fn available_store(dir: &TempDir) -> Arc<MapDataStore<String, String>> {
        let store = Arc::new(MapDataStore::new("maintenance-test"));
        store
            .configure(&config(dir), SerializerRegistry::global())
            .unwrap();
        store
    }

    #[test]
    fn test_can_run_requires_available_store() {
        let store: Arc<MapDataStore<String, String>> = Arc::new(MapDataStore::new("unconfigured"));
        let task = MaintenanceTask::for_store(&store);
        assert!(!task.can_run(), "unconfigured store must not run");

        let dir = TempDir::new().unwrap();
        let store = available_store(&dir);
        let task = MaintenanceTask::for_store(&store);
        assert!(task.can_run());

        store.dispose().unwrap();
        assert!(!task.can_run(), "disposed store must not run");
    }

    #[test]
    fn test_interval_gates_runs() {
        let dir = TempDir::new().unwrap();
        let store = available_store(&dir);

        let mut task = MaintenanceTask::new(Arc::downgrade(&store), Duration::from_secs(3600));
        assert!(task.can_run(), "never-run task is due");
        assert_eq!(task.run(), TaskState::Completed);
        assert!(!task.can_run(), "interval has not elapsed");
    }

    #[test]
    fn test_run_skips_disposed_store_without_failing() {
        let dir = TempDir::new().unwrap();
        let store = available_store(&dir);
        let mut task = MaintenanceTask::for_store(&store);
        store.dispose().unwrap();

        assert_eq!(task.run(), TaskState::Pending);
    }

    #[test]
    fn test_run_skips_dropped_store() {
        let store: Arc<MapDataStore<String, String>> = Arc::new(MapDataStore::new("dropped"));
        let mut task = MaintenanceTask::new(Arc::downgrade(&store), Duration::ZERO);
        drop(store);

        assert!(!task.can_run());
        assert_eq!(task.run(), TaskState::Pending);
    }

    #[test]
    fn test_run_grows_saturated_store() {
        let dir = TempDir::new().unwrap();
        let store = available_store(&dir);
        let mut task = MaintenanceTask::for_store(&store);

        // 7 of 10 entries reaches the default 0.7 threshold
        for n in 0..7 {
            store
                .put(&format!("key-{n}"), &"v".to_string(), Duration::from_secs(5))
                .unwrap();
        }
        assert_eq!(task.run(), TaskState::Completed);
        assert_eq!(store.sizes().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_scale_out_moves_store_to_exception() {
        use std::path::Path;
        use std::sync::atomic::{AtomicUsize, Ordering};

        use crate::engine::{DurableMap, Engine, EngineResult, LogEngine};

        // engine that opens one partition, then starts failing
        #[derive(Default)]
        struct FlakyEngine {
            opens: AtomicUsize,
        }

        impl Engine for FlakyEngine {
            fn open(
                &self,
                path: &Path,
                template: &crate::config::PartitionTemplate,
            ) -> EngineResult<Box<dyn DurableMap>> {
                if self.opens.fetch_add(1, Ordering::SeqCst) >= 1 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "disk gone",
                    )
                    .into());
                }
                LogEngine.open(path, template)
            }

            fn name(&self) -> &'static str {
                "flaky"
            }
        }

        let dir = TempDir::new().unwrap();
        let store: Arc<MapDataStore<String, String>> = Arc::new(MapDataStore::with_engine(
            "maintenance-test",
            Arc::new(FlakyEngine::default()),
        ));
        store
            .configure(&config(&dir), SerializerRegistry::global())
            .unwrap();
        let mut task = MaintenanceTask::for_store(&store);

        for n in 0..7 {
            store
                .put(&format!("key-{n}"), &"v".to_string(), Duration::from_secs(5))
                .unwrap();
        }

        assert_eq!(task.run(), TaskState::Failed);
        assert!(matches!(task.last_error(), Some(Error::Maintenance(_))));
        assert_eq!(store.state(), StoreState::Exception);

        // an exception store blocks key operations and further runs
        let result = store.get(&"key-0".to_string(), Duration::from_secs(5));
        assert!(matches!(result, Err(Error::InvalidState { .. })));
        assert!(!task.can_run());
    }

    #[test]
    fn test_dispose_detaches_from_store() {
        let dir = TempDir::new().unwrap();
        let store = available_store(&dir);
        let mut task = MaintenanceTask::for_store(&store);

        task.dispose();
        assert!(!task.can_run());
        assert_eq!(task.state(), TaskState::Pending);
    }
}
