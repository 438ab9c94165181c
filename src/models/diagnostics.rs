use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_sessions: u32,
    pub n_subscribers: u32,
    pub n_watches: u32,
    pub started_at: DateTime<Utc>,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
