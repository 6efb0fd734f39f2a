//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam (commands, batch substrate, transport,
//! notifier, input cache) plus fixtures that build an in-memory status
//! service, so whole cycles can run without a cluster.
//!
//! # Example
//!
//! ```rust,ignore
//! use reprocess_core::testing::{fixtures, MockSubstrate};
//!
//! let service = fixtures::in_memory_service();
//! let order = fixtures::order_on_cache(&service, &[fixtures::LANDSAT_SCENE]).await;
//!
//! let substrate = MockSubstrate::new();
//! substrate.fail_next_submit("jobtracker unreachable");
//! ```

mod mock_command_runner;
mod mock_finalizer;
mod mock_substrate;
mod mock_transport;

pub use mock_command_runner::MockCommandRunner;
pub use mock_finalizer::{MockInputAvailability, MockNotifier};
pub use mock_substrate::{MockSubstrate, RecordedSubmission};
pub use mock_transport::{MockTransport, RecordedDelivery};

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

// Mock state stays usable after a panicking test thread.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use crate::config::RetentionConfig;
    use crate::options::ProductOptions;
    use crate::sensor::SceneId;
    use crate::service::{LocalStatusService, OrderDetail, ReconcileReport, ServiceError, StatusService};
    use crate::status::{
        NewOrder, Order, PurgeCandidate, Scene, SceneCompletion, SceneRef, SceneStatus,
        SceneToProcess, SqliteStatusStore,
    };

    /// A Landsat 5 TM scene.
    pub const LANDSAT_SCENE: &str = "LT50440341996220XXX01";

    /// A MODIS Terra daily surface reflectance tile.
    pub const MODIS_SCENE: &str = "MOD09GA.A2014001.h10v04.005.2014002032553";

    /// Status service over an in-memory SQLite store with default retention.
    pub fn in_memory_service() -> Arc<LocalStatusService> {
        in_memory_service_with(RetentionConfig::default())
    }

    /// Status service whose purge window is `days` long.
    pub fn in_memory_service_with_retention(days: u32) -> Arc<LocalStatusService> {
        in_memory_service_with(RetentionConfig {
            days,
            ..RetentionConfig::default()
        })
    }

    pub fn in_memory_service_with(retention: RetentionConfig) -> Arc<LocalStatusService> {
        let store = SqliteStatusStore::in_memory().expect("in-memory store");
        Arc::new(LocalStatusService::new(Arc::new(store), retention))
    }

    /// Options valid for both sensors.
    pub fn source_options() -> ProductOptions {
        ProductOptions::new().with("include_customized_source_data", true)
    }

    /// Submit an order and move every scene to `on_cache`.
    pub async fn order_on_cache(service: &LocalStatusService, scenes: &[&str]) -> Order {
        let order = service
            .create_order(NewOrder {
                submitter: "ops@example.org".to_string(),
                options: source_options(),
                scenes: scenes.iter().map(|s| s.to_string()).collect(),
                note: None,
            })
            .await
            .expect("create order");
        for scene in scenes {
            let moved = service
                .update_status(&SceneRef::new(&order.id, *scene), "intake", SceneStatus::OnCache)
                .await
                .expect("update status");
            assert!(moved, "scene {} did not move to on_cache", scene);
        }
        order
    }

    /// Write a placeholder input file for `scene` below `input_dir`.
    pub fn write_input(input_dir: &Path, scene: &SceneId) -> PathBuf {
        let path = input_dir.join(scene.input_relative_path());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create input directory");
        }
        std::fs::write(&path, b"scene input").expect("write input");
        path
    }

    /// A status service that is never reachable.
    pub struct UnavailableStatusService;

    fn down<T>() -> Result<T, ServiceError> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }

    #[async_trait]
    impl StatusService for UnavailableStatusService {
        async fn get_scenes_to_process(&self, _: usize) -> Result<Vec<SceneToProcess>, ServiceError> {
            down()
        }
        async fn get_scenes_to_retry(&self, _: Option<&str>) -> Result<Vec<SceneToProcess>, ServiceError> {
            down()
        }
        async fn queue_scenes(&self, _: &[SceneRef], _: &str, _: &str) -> Result<usize, ServiceError> {
            down()
        }
        async fn update_status(&self, _: &SceneRef, _: &str, _: SceneStatus) -> Result<bool, ServiceError> {
            down()
        }
        async fn set_scene_error(&self, _: &SceneRef, _: &str, _: &str) -> Result<bool, ServiceError> {
            down()
        }
        async fn set_scene_unavailable(
            &self,
            _: &SceneRef,
            _: &str,
            _: &str,
            _: Option<&str>,
        ) -> Result<bool, ServiceError> {
            down()
        }
        async fn mark_scene_complete(&self, _: &SceneCompletion) -> Result<bool, ServiceError> {
            down()
        }
        async fn get_scenes_to_purge(&self) -> Result<Vec<PurgeCandidate>, ServiceError> {
            down()
        }
        async fn mark_scene_purged(&self, _: &SceneRef) -> Result<bool, ServiceError> {
            down()
        }
        async fn get_configuration(&self, _: &str) -> Result<Option<String>, ServiceError> {
            down()
        }
        async fn list_scenes(&self, _: SceneStatus, _: usize, _: usize) -> Result<Vec<Scene>, ServiceError> {
            down()
        }
        async fn finalize_orders(&self) -> Result<Vec<Order>, ServiceError> {
            down()
        }
        async fn mark_order_notified(&self, _: &str) -> Result<bool, ServiceError> {
            down()
        }
        async fn reconcile_stale_scenes(&self) -> Result<ReconcileReport, ServiceError> {
            down()
        }
        async fn create_order(&self, _: NewOrder) -> Result<Order, ServiceError> {
            down()
        }
        async fn get_order(&self, _: &str) -> Result<Option<OrderDetail>, ServiceError> {
            down()
        }
    }
}
