//! Health checks over the vector index.

use std::time::Instant;

use serde::Serialize;
use tether_core::memory::box_vector::BoxVectorIndex;
use tether_types::memory::UserId;

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Engine reachable.
    pub index_ok: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Present only when a user was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_index_exists: Option<bool>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.index_ok && self.error.is_none()
    }
}

/// Ping the index and, for a user, check that their semantic index exists.
pub async fn check_health(index: &BoxVectorIndex, user_id: Option<&UserId>) -> HealthReport {
    let started = Instant::now();
    let ping = index.ping().await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let mut report = HealthReport {
        index_ok: ping.is_ok(),
        latency_ms,
        error: ping.err().map(|e| e.to_string()),
        user_index_exists: None,
    };
    if !report.index_ok {
        tracing::warn!(error = ?report.error, "vector index ping failed");
        return report;
    }

    if let Some(user_id) = user_id {
        match index.index_exists(user_id).await {
            Ok(exists) => report.user_index_exists = Some(exists),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "index presence check failed");
                report.error = Some(e.to_string());
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::index::LanceVectorIndex;
    use crate::vector::lance::LanceVectorStore;

    #[tokio::test]
    async fn test_health_reports_user_index_presence() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LanceVectorStore::new(tmp.path().to_path_buf()).await.unwrap();
        let index = BoxVectorIndex::new(LanceVectorIndex::new(store, 8));
        let user = UserId::parse("health_user").unwrap();

        let report = check_health(&index, None).await;
        assert!(report.is_healthy());
        assert!(report.user_index_exists.is_none());

        let report = check_health(&index, Some(&user)).await;
        assert_eq!(report.user_index_exists, Some(false));

        index.create_index(&user).await.unwrap();
        let report = check_health(&index, Some(&user)).await;
        assert_eq!(report.user_index_exists, Some(true));
    }
}
