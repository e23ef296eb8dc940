//! Error types for the store backends, the copy engine and the facades.
//!
//! Backends report [`StoreError`]. The engine wraps those with the operation
//! and path that failed ([`CopyError::Store`]) and adds its own
//! strategy/integrity failures. Nothing here is retried.

use crate::path::ObjectPath;
use std::{fmt, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("multipart upload `{0}` does not exist")]
    NoSuchUpload(String),
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: u32, reason: String },
    #[error("parts must be listed in strictly ascending order")]
    InvalidPartOrder,
    #[error("range {range} is not satisfiable for an object of {size} bytes")]
    InvalidRange { range: String, size: u64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn not_found(path: &ObjectPath) -> Self {
        Self::NotFound {
            bucket: path.bucket.clone(),
            key: path.key.clone(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Backend operation names used as error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    HeadObject,
    CopyObject,
    CreateMultipartUpload,
    UploadPartCopy,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    GetObject,
    DeleteObject,
    CreateBucket,
    Presign,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::HeadObject => "head-object",
            Operation::CopyObject => "copy-object",
            Operation::CreateMultipartUpload => "create-multipart-upload",
            Operation::UploadPartCopy => "upload-part-copy",
            Operation::CompleteMultipartUpload => "complete-multipart-upload",
            Operation::AbortMultipartUpload => "abort-multipart-upload",
            Operation::GetObject => "get-object",
            Operation::DeleteObject => "delete-object",
            Operation::CreateBucket => "create-bucket",
            Operation::Presign => "presign",
        };
        f.write_str(name)
    }
}

/// One failed part of a multipart copy.
#[derive(Debug)]
pub struct PartFailure {
    pub part_number: u32,
    pub error: String,
}

impl fmt::Display for PartFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[part {}: {}]", self.part_number, self.error)
    }
}

fn join_failures(failures: &[PartFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("source object `{0}` not found")]
    SourceNotFound(ObjectPath),
    #[error("{op} failed for `{path}`: {source}")]
    Store {
        op: Operation,
        path: ObjectPath,
        #[source]
        source: StoreError,
    },
    #[error(
        "object size {size} requires a multipart copy that cannot be verified using ETags"
    )]
    ValidationUnsupportedForMultipart { size: u64 },
    #[error("copy result ETag {actual} does not match source ETag {expected}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("no ETag available for `{0}`; copy cannot be verified")]
    IntegrityUnavailable(ObjectPath),
    #[error(
        "multipart upload {upload_id} failed on {} part(s): {}",
        .failures.len(),
        join_failures(.failures)
    )]
    PartsFailed {
        upload_id: String,
        failures: Vec<PartFailure>,
    },
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl CopyError {
    pub(crate) fn store(op: Operation, path: &ObjectPath, source: StoreError) -> Self {
        Self::Store {
            op,
            path: path.clone(),
            source,
        }
    }
}

pub type CopyResult<T> = Result<T, CopyError>;

/// Errors surfaced by `StoreClient` and `BucketClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{op} failed for `{path}`: {source}")]
    Store {
        op: Operation,
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("head returned no ETag for `{0}`")]
    MissingEtag(ObjectPath),
    #[error(transparent)]
    Copy(#[from] CopyError),
}

impl ClientError {
    pub(crate) fn store(op: Operation, path: impl ToString, source: StoreError) -> Self {
        Self::Store {
            op,
            path: path.to_string(),
            source,
        }
    }

    /// True when the failure is an expected not-found rather than a fault.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_not_found(),
            Self::Copy(CopyError::SourceNotFound(_)) => true,
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
