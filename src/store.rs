//! Backend capabilities.
//!
//! [`CopyBackend`] is everything the copy engine may call: head, whole-object
//! copy and the multipart-copy primitives. [`ObjectStore`] adds the remaining
//! object operations the client facades expose. Any store (remote, local,
//! or a test double) plugs in by implementing these traits.
//!
//! Futures are required to be `Send` so part copies can be spawned onto the
//! runtime.

use crate::{
    errors::StoreResult,
    models::{
        multipart::{CompletedPart, PartRange},
        object::ObjectHead,
    },
    path::ObjectPath,
};
use bytes::Bytes;
use std::{future::Future, time::Duration};

/// Who pays for data transfer on a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestPayer {
    /// Bucket owner pays.
    #[default]
    Owner,
    /// Requester pays (`x-amz-request-payer: requester`).
    Requester,
}

impl RequestPayer {
    pub fn from_flag(requester_pays: bool) -> Self {
        if requester_pays {
            Self::Requester
        } else {
            Self::Owner
        }
    }

    /// Header value to send, if any.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            Self::Owner => None,
            Self::Requester => Some("requester"),
        }
    }
}

pub trait CopyBackend: Send + Sync {
    /// Size, ETag and modification time. Missing objects are `StoreError::NotFound`.
    fn head_object(
        &self,
        path: &ObjectPath,
        payer: RequestPayer,
    ) -> impl Future<Output = StoreResult<ObjectHead>> + Send;

    /// Single-request server-side copy. Returns the destination ETag if the
    /// store reported one.
    fn copy_object(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        payer: RequestPayer,
    ) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    /// Open a multipart session on `destination` and return its upload id.
    fn create_multipart_upload(
        &self,
        destination: &ObjectPath,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    /// Copy `range` of `source` into part `range.part_number` of the session.
    fn upload_part_copy(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        upload_id: &str,
        range: PartRange,
        payer: RequestPayer,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    /// Commit the session. `parts` must be in ascending part-number order.
    fn complete_multipart_upload(
        &self,
        destination: &ObjectPath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard the session and any staged parts.
    fn abort_multipart_upload(
        &self,
        destination: &ObjectPath,
        upload_id: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;
}

pub trait ObjectStore: CopyBackend {
    /// Create a bucket and return its location.
    fn create_bucket(&self, name: &str) -> impl Future<Output = StoreResult<String>> + Send;

    fn get_object(
        &self,
        path: &ObjectPath,
        payer: RequestPayer,
    ) -> impl Future<Output = StoreResult<Bytes>> + Send;

    /// Delete an object. Deleting a missing object is not an error.
    fn delete_object(&self, path: &ObjectPath) -> impl Future<Output = StoreResult<()>> + Send;

    /// A URL granting read access to `path` for `expires_in`.
    fn presign_get(
        &self,
        path: &ObjectPath,
        expires_in: Duration,
    ) -> impl Future<Output = StoreResult<String>> + Send;
}
