//! Store client: one handle over an [`ObjectStore`] and the copy engine.
//!
//! Everything here except `copy` is a single backend call with its error
//! tagged by operation and path.

use crate::{
    copy::{CopyEngine, CopyOptions, EngineConfig},
    errors::{ClientError, ClientResult, CopyResult, Operation, StoreError},
    path::ObjectPath,
    store::{ObjectStore, RequestPayer},
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tracing::debug;

pub struct StoreClient<S> {
    store: Arc<S>,
    engine: CopyEngine<S>,
}

impl<S> Clone for StoreClient<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            engine: self.engine.clone(),
        }
    }
}

impl<S: ObjectStore + 'static> StoreClient<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> CopyResult<Self> {
        let engine = CopyEngine::new(Arc::clone(&store), config)?;
        Ok(Self { store, engine })
    }

    /// Client using the default engine configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        let engine = CopyEngine::with_defaults(Arc::clone(&store));
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn engine(&self) -> &CopyEngine<S> {
        &self.engine
    }

    /// Create a bucket. An existing bucket counts as success and yields `/name`.
    pub async fn create_bucket(&self, name: &str) -> ClientResult<String> {
        match self.store.create_bucket(name).await {
            Ok(location) => Ok(location),
            Err(StoreError::BucketAlreadyExists(_)) => {
                debug!(bucket = %name, "bucket already exists");
                Ok(format!("/{}", name))
            }
            Err(err) => Err(ClientError::store(Operation::CreateBucket, name, err)),
        }
    }

    pub async fn exists(&self, path: &ObjectPath) -> ClientResult<bool> {
        match self.store.head_object(path, RequestPayer::Owner).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(ClientError::store(Operation::HeadObject, path, err)),
        }
    }

    /// Size in bytes.
    pub async fn size(&self, path: &ObjectPath, payer: RequestPayer) -> ClientResult<u64> {
        let head = self
            .store
            .head_object(path, payer)
            .await
            .map_err(|err| ClientError::store(Operation::HeadObject, path, err))?;
        Ok(head.size)
    }

    pub async fn etag(&self, path: &ObjectPath) -> ClientResult<String> {
        let head = self
            .store
            .head_object(path, RequestPayer::Owner)
            .await
            .map_err(|err| ClientError::store(Operation::HeadObject, path, err))?;
        head.etag.ok_or_else(|| ClientError::MissingEtag(path.clone()))
    }

    pub async fn get_object(&self, path: &ObjectPath, payer: RequestPayer) -> ClientResult<Bytes> {
        self.store
            .get_object(path, payer)
            .await
            .map_err(|err| ClientError::store(Operation::GetObject, path, err))
    }

    /// Delete an object; deleting a missing object succeeds.
    pub async fn delete(&self, path: &ObjectPath) -> ClientResult<()> {
        match self.store.delete_object(path).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(ClientError::store(Operation::DeleteObject, path, err)),
        }
    }

    /// Copy `source` to `destination`, verifying ETags when `validate_etag` is set.
    pub async fn copy(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        validate_etag: bool,
        payer: RequestPayer,
    ) -> ClientResult<()> {
        let options = CopyOptions {
            validate_etag,
            request_payer: payer,
        };
        self.engine.copy(source, destination, options).await?;
        Ok(())
    }

    /// True when `destination` is missing or older than `source`.
    ///
    /// The source must exist. Only the source head carries the payer option.
    pub async fn is_src_newer(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        payer: RequestPayer,
    ) -> ClientResult<bool> {
        let src_head = self
            .store
            .head_object(source, payer)
            .await
            .map_err(|err| ClientError::store(Operation::HeadObject, source, err))?;

        match self.store.head_object(destination, RequestPayer::Owner).await {
            Ok(dst_head) => Ok(src_head.last_modified > dst_head.last_modified),
            Err(err) if err.is_not_found() => Ok(true),
            Err(err) => Err(ClientError::store(Operation::HeadObject, destination, err)),
        }
    }

    pub async fn presigned_url(
        &self,
        path: &ObjectPath,
        expires_in: Duration,
    ) -> ClientResult<String> {
        self.store
            .presign_get(path, expires_in)
            .await
            .map_err(|err| ClientError::store(Operation::Presign, path, err))
    }
}
