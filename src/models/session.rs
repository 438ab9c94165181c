use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A file currently under preview
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionInfo {
    pub id: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub subscribers: usize,
}
