//! Object metadata: the head view returned by every backend, and the row
//! the local store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Result of a head-object request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectHead {
    /// Content length in bytes.
    pub size: u64,

    /// Content fingerprint. Opaque; backends may omit it.
    pub etag: Option<String>,

    pub last_modified: DateTime<Utc>,
}

/// An object stored by the local store. Payload bytes live on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    pub id: Uuid,

    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Last segment of the key.
    pub filename: String,

    pub content_type: Option<String>,

    pub size_bytes: i64,

    /// Hex md5 for single-request writes, `<hex>-<parts>` after a multipart commit.
    pub etag: Option<String>,

    pub storage_class: String,

    pub last_modified: DateTime<Utc>,

    pub version_id: Option<String>,

    /// Soft-delete marker.
    pub is_deleted: bool,
}

impl Object {
    pub fn head(&self) -> ObjectHead {
        ObjectHead {
            size: self.size_bytes.max(0) as u64,
            etag: self.etag.clone(),
            last_modified: self.last_modified,
        }
    }
}
