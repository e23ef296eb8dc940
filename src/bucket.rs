//! Bucket client: a [`StoreClient`] bound to one bucket, addressed by key.

use crate::{
    client::StoreClient,
    errors::ClientResult,
    path::ObjectPath,
    store::{ObjectStore, RequestPayer},
};
use bytes::Bytes;
use std::time::Duration;

pub struct BucketClient<S> {
    client: StoreClient<S>,
    bucket: String,
}

impl<S> Clone for BucketClient<S> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
        }
    }
}

impl<S: ObjectStore + 'static> BucketClient<S> {
    pub fn new(client: StoreClient<S>, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn client(&self) -> &StoreClient<S> {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn path(&self, key: &str) -> ObjectPath {
        ObjectPath::new(self.bucket.clone(), key)
    }

    /// Create this client's bucket.
    pub async fn create_bucket(&self) -> ClientResult<String> {
        self.client.create_bucket(&self.bucket).await
    }

    pub async fn exists(&self, key: &str) -> ClientResult<bool> {
        self.client.exists(&self.path(key)).await
    }

    pub async fn size(&self, key: &str, payer: RequestPayer) -> ClientResult<u64> {
        self.client.size(&self.path(key), payer).await
    }

    pub async fn etag(&self, key: &str) -> ClientResult<String> {
        self.client.etag(&self.path(key)).await
    }

    pub async fn get_object(&self, key: &str, payer: RequestPayer) -> ClientResult<Bytes> {
        self.client.get_object(&self.path(key), payer).await
    }

    pub async fn delete(&self, key: &str) -> ClientResult<()> {
        self.client.delete(&self.path(key)).await
    }

    pub async fn copy(
        &self,
        src_key: &str,
        dst_key: &str,
        validate_etag: bool,
        payer: RequestPayer,
    ) -> ClientResult<()> {
        self.client
            .copy(&self.path(src_key), &self.path(dst_key), validate_etag, payer)
            .await
    }

    pub async fn is_src_newer(
        &self,
        src_key: &str,
        dst_key: &str,
        payer: RequestPayer,
    ) -> ClientResult<bool> {
        self.client
            .is_src_newer(&self.path(src_key), &self.path(dst_key), payer)
            .await
    }

    pub async fn presigned_url(&self, key: &str, expires_in: Duration) -> ClientResult<String> {
        self.client.presigned_url(&self.path(key), expires_in).await
    }
}
