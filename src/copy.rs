//! Copy engine.
//!
//! Copies an object within a store, choosing between one server-side copy
//! request and a parallel multipart copy from the source size:
//!
//! - `size <= single_part_copy_limit`: one copy-object request, optionally
//!   verified by comparing source and destination ETags.
//! - larger: the source is split into `chunk_size` byte ranges, each copied
//!   with upload-part-copy by a bounded pool of tasks, and the parts are
//!   committed in ascending order. Multipart ETags are not content hashes of
//!   the whole object, so ETag validation is refused for this path.

use crate::{
    errors::{CopyError, CopyResult, Operation, PartFailure},
    models::multipart::{CompletedPart, MAX_PART_NUMBER, MultipartSession, PartRange, partition},
    path::ObjectPath,
    store::{CopyBackend, RequestPayer},
};
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{Semaphore, mpsc},
    task::JoinSet,
};
use tracing::{debug, instrument, warn};

/// Largest object copied with a single request (4 GiB).
pub const SINGLE_PART_COPY_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

/// Default multipart chunk size (100 MiB).
pub const DEFAULT_MULTIPART_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Default number of part copies in flight at once.
pub const DEFAULT_MAX_CONCURRENT_PARTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Sources strictly larger than this are copied in parts.
    pub single_part_copy_limit: u64,
    pub chunk_size: u64,
    pub max_concurrent_parts: usize,
    /// Abort the multipart session when any part fails.
    pub abort_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            single_part_copy_limit: SINGLE_PART_COPY_LIMIT,
            chunk_size: DEFAULT_MULTIPART_CHUNK_SIZE,
            max_concurrent_parts: DEFAULT_MAX_CONCURRENT_PARTS,
            abort_on_failure: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> CopyResult<()> {
        if self.chunk_size == 0 {
            return Err(CopyError::InvalidConfig("chunk_size must be non-zero".into()));
        }
        if self.max_concurrent_parts == 0 {
            return Err(CopyError::InvalidConfig(
                "max_concurrent_parts must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-call copy parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOptions {
    /// Compare source and destination ETags after the copy.
    pub validate_etag: bool,
    pub request_payer: RequestPayer,
}

impl CopyOptions {
    pub fn new(validate_etag: bool, requester_pays: bool) -> Self {
        Self {
            validate_etag,
            request_payer: RequestPayer::from_flag(requester_pays),
        }
    }
}

pub struct CopyEngine<B> {
    backend: Arc<B>,
    config: EngineConfig,
}

impl<B> Clone for CopyEngine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
        }
    }
}

impl<B: CopyBackend + 'static> CopyEngine<B> {
    pub fn new(backend: Arc<B>, config: EngineConfig) -> CopyResult<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn with_defaults(backend: Arc<B>) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Copy `source` to `destination`.
    ///
    /// A missing source is reported as [`CopyError::SourceNotFound`]; every
    /// other backend failure is wrapped with the operation and path.
    #[instrument(level = "debug", skip_all, fields(source = %source, destination = %destination))]
    pub async fn copy(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        options: CopyOptions,
    ) -> CopyResult<()> {
        let payer = options.request_payer;
        let head = self
            .backend
            .head_object(source, payer)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    CopyError::SourceNotFound(source.clone())
                } else {
                    CopyError::store(Operation::HeadObject, source, err)
                }
            })?;

        let expected_etag = if options.validate_etag {
            let etag = head
                .etag
                .clone()
                .ok_or_else(|| CopyError::IntegrityUnavailable(source.clone()))?;
            Some(etag)
        } else {
            None
        };

        if head.size > self.config.single_part_copy_limit {
            if options.validate_etag {
                return Err(CopyError::ValidationUnsupportedForMultipart { size: head.size });
            }
            debug!(
                size = head.size,
                limit = self.config.single_part_copy_limit,
                "source exceeds single-request limit, copying in parts"
            );
            return self
                .copy_multipart(source, destination, head.size, self.config.chunk_size, payer)
                .await;
        }

        let copied_etag = self
            .backend
            .copy_object(source, destination, payer)
            .await
            .map_err(|err| CopyError::store(Operation::CopyObject, destination, err))?;
        debug!(size = head.size, etag = ?copied_etag, "copied in a single request");

        match expected_etag {
            Some(expected) => validate_copy_result(&expected, copied_etag, destination),
            None => Ok(()),
        }
    }

    /// Copy `size` bytes of `source` into `destination` as a multipart upload
    /// of `chunk_size` parts.
    ///
    /// Every part is attempted even if some fail. On failure nothing is
    /// committed and all part errors are returned together. More than
    /// [`MAX_PART_NUMBER`] parts is refused before a session is opened.
    pub async fn copy_multipart(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        size: u64,
        chunk_size: u64,
        payer: RequestPayer,
    ) -> CopyResult<()> {
        if chunk_size == 0 {
            return Err(CopyError::InvalidConfig("chunk_size must be non-zero".into()));
        }
        let part_count = size.div_ceil(chunk_size);
        if part_count > u64::from(MAX_PART_NUMBER) {
            return Err(CopyError::InvalidConfig(format!(
                "{size} bytes in {chunk_size}-byte chunks needs {part_count} parts, more than the limit of {MAX_PART_NUMBER}"
            )));
        }

        let upload_id = self
            .backend
            .create_multipart_upload(destination)
            .await
            .map_err(|err| CopyError::store(Operation::CreateMultipartUpload, destination, err))?;
        let session = MultipartSession {
            upload_id,
            destination: destination.clone(),
        };

        let parts = partition(size, chunk_size);
        debug!(
            upload_id = %session.upload_id,
            parts = parts.len(),
            chunk_size,
            "created multipart session"
        );

        let mut completed = match self.copy_parts(source, &session, &parts, payer).await {
            Ok(completed) => completed,
            Err(failures) => {
                if self.config.abort_on_failure {
                    self.abort_session(&session).await;
                }
                return Err(CopyError::PartsFailed {
                    upload_id: session.upload_id,
                    failures,
                });
            }
        };

        completed.sort_by_key(|part| part.part_number);
        self.backend
            .complete_multipart_upload(destination, &session.upload_id, &completed)
            .await
            .map_err(|err| {
                CopyError::store(Operation::CompleteMultipartUpload, destination, err)
            })?;
        debug!(upload_id = %session.upload_id, "multipart copy committed");
        Ok(())
    }

    /// Run one task per part with at most `max_concurrent_parts` in flight,
    /// wait for all of them, and collect their outcomes.
    async fn copy_parts(
        &self,
        source: &ObjectPath,
        session: &MultipartSession,
        parts: &[PartRange],
        payer: RequestPayer,
    ) -> Result<Vec<CompletedPart>, Vec<PartFailure>> {
        let capacity = parts.len().max(1);
        let (done_tx, mut done_rx) = mpsc::channel::<CompletedPart>(capacity);
        let (fail_tx, mut fail_rx) = mpsc::channel::<PartFailure>(capacity);
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_parts));

        let mut tasks = JoinSet::new();
        let mut task_parts = HashMap::with_capacity(parts.len());
        for &range in parts {
            let backend = Arc::clone(&self.backend);
            let permits = Arc::clone(&permits);
            let done_tx = done_tx.clone();
            let fail_tx = fail_tx.clone();
            let source = source.clone();
            let destination = session.destination.clone();
            let upload_id = session.upload_id.clone();

            let handle = tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    let _ = fail_tx
                        .send(PartFailure {
                            part_number: range.part_number,
                            error: "worker pool closed".into(),
                        })
                        .await;
                    return;
                };

                match backend
                    .upload_part_copy(&source, &destination, &upload_id, range, payer)
                    .await
                {
                    Ok(etag) => {
                        debug!(part = range.part_number, range = %range.header_value(), "part copied");
                        let _ = done_tx
                            .send(CompletedPart {
                                part_number: range.part_number,
                                etag,
                            })
                            .await;
                    }
                    Err(err) => {
                        debug!(part = range.part_number, error = %err, "part copy failed");
                        let _ = fail_tx
                            .send(PartFailure {
                                part_number: range.part_number,
                                error: format!("failed to copy {range}: {err}"),
                            })
                            .await;
                    }
                }
            });
            task_parts.insert(handle.id(), range.part_number);
        }
        drop(done_tx);
        drop(fail_tx);

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                let part_number = task_parts.get(&err.id()).copied().unwrap_or_default();
                failures.push(PartFailure {
                    part_number,
                    error: format!("part copy task did not finish: {err}"),
                });
            }
        }

        while let Some(failure) = fail_rx.recv().await {
            failures.push(failure);
        }
        if !failures.is_empty() {
            failures.sort_by_key(|failure| failure.part_number);
            return Err(failures);
        }

        let mut completed = Vec::with_capacity(parts.len());
        while let Some(part) = done_rx.recv().await {
            completed.push(part);
        }
        Ok(completed)
    }

    async fn abort_session(&self, session: &MultipartSession) {
        match self
            .backend
            .abort_multipart_upload(&session.destination, &session.upload_id)
            .await
        {
            Ok(()) => debug!(upload_id = %session.upload_id, "aborted multipart session"),
            Err(err) => warn!(
                upload_id = %session.upload_id,
                destination = %session.destination,
                error = %err,
                "failed to abort multipart session; it must be cleaned up out of band"
            ),
        }
    }
}

/// Compare the ETag reported by a single-request copy with the source's.
fn validate_copy_result(
    expected: &str,
    copied_etag: Option<String>,
    destination: &ObjectPath,
) -> CopyResult<()> {
    match copied_etag {
        None => Err(CopyError::IntegrityUnavailable(destination.clone())),
        Some(actual) if actual != expected => Err(CopyError::IntegrityMismatch {
            expected: expected.to_string(),
            actual,
        }),
        Some(_) => Ok(()),
    }
}
