//! Bucket rows kept by the local store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named container of objects.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    pub id: Uuid,

    /// Unique bucket name, validated against S3 naming rules on create.
    pub name: String,

    pub owner_id: Uuid,

    /// Always `local`.
    pub region: String,

    pub created_at: DateTime<Utc>,

    pub versioning_enabled: bool,
}

impl Bucket {
    /// Location string reported by create-bucket, e.g. `/my-bucket`.
    pub fn location(&self) -> String {
        format!("/{}", self.name)
    }
}
