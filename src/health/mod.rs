//! 健康检查模块

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::auth::KvStore;

const STORE_COMPONENT: &str = "store";

/// 健康状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Serving,
    NotServing,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, HealthStatus>,
}

impl HealthReport {
    pub fn is_serving(&self) -> bool {
        self.status == HealthStatus::Serving
    }
}

/// 健康检查服务
///
/// Probes the shared store; the last observed status per component is kept for
/// [`HealthService::get_status`].
pub struct HealthService {
    store: Arc<dyn KvStore>,
    statuses: RwLock<BTreeMap<String, HealthStatus>>,
}

impl HealthService {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            statuses: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn get_status(&self, component: &str) -> HealthStatus {
        let statuses = self.statuses.read().await;
        statuses
            .get(component)
            .copied()
            .unwrap_or(HealthStatus::Unknown)
    }

    pub async fn check(&self) -> HealthReport {
        let store_status = match self.store.ping().await {
            Ok(()) => HealthStatus::Serving,
            Err(err) => {
                warn!(error = %err, "Store health probe failed");
                HealthStatus::NotServing
            }
        };

        let mut statuses = self.statuses.write().await;
        statuses.insert(STORE_COMPONENT.to_string(), store_status);

        let status = if statuses.values().all(|s| *s == HealthStatus::Serving) {
            HealthStatus::Serving
        } else {
            HealthStatus::NotServing
        };
        HealthReport {
            status,
            components: statuses.clone(),
        }
    }
}
