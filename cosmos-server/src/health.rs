//! Session readiness reporting.

use crate::session::{LoadStatus, SessionManager};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Offline,
    Loading,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub nim_ready: bool,
    pub model: String,
}

/// Report readiness, loading the session if nothing has loaded it yet.
///
/// While another caller's load is in flight this returns `loading` at once
/// rather than waiting on it. A failed load reports `offline`; this never errors.
pub async fn report(sessions: &SessionManager) -> HealthResponse {
    let model = sessions.model_name();

    if sessions.status() == LoadStatus::Loading {
        return HealthResponse {
            status: HealthStatus::Loading,
            nim_ready: false,
            model,
        };
    }

    match sessions.get_session().await {
        Ok(_) => HealthResponse {
            status: HealthStatus::Healthy,
            nim_ready: true,
            model,
        },
        Err(e) => {
            warn!("Health check: session unavailable: {}", e);
            HealthResponse {
                status: HealthStatus::Offline,
                nim_ready: false,
                model,
            }
        }
    }
}
