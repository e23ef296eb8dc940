//! src/services/local_store.rs
//!
//! LocalStore: an object store backed by SQLite for metadata and local disk
//! for payloads, sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//! Multipart sessions stage their parts under `base_path/.multipart/{upload_id}`
//! until they are completed or aborted.
//!
//! It implements the full `ObjectStore` capability, including server-side
//! range copies into multipart parts, so the copy engine can run against it
//! without a remote service.

use crate::{
    errors::{StoreError, StoreResult},
    models::{
        bucket::Bucket,
        multipart::{CompletedPart, MAX_PART_NUMBER, MultipartPart, MultipartUpload, PartRange},
        object::{Object, ObjectHead},
    },
    path::ObjectPath,
    store::{CopyBackend, ObjectStore, RequestPayer},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::HashMap,
    io::{self, ErrorKind, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const COPY_BUFFER_SIZE: u64 = 64 * 1024;
const DEFAULT_REGION: &str = "local";

/// Object store on local disk with SQLite metadata.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct LocalStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Key mixed into presigned URL signatures.
    presign_secret: String,
}

impl LocalStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            presign_secret: String::new(),
        }
    }

    pub fn with_presign_secret(mut self, secret: impl Into<String>) -> Self {
        self.presign_secret = secret.into();
        self
    }

    /// Create the metadata tables if they do not exist yet.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} schema statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Reject keys that are empty, oversized, absolute, contain `..`, or carry
    /// control characters or backslashes.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(StoreError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// S3 rules: 3-63 characters of lowercase letters, digits, dots and
    /// hyphens; starts and ends alphanumeric; no `..`, `.-` or `-.`; not an
    /// IPv4 address.
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let invalid = |reason: &str| StoreError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len()) {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }
        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// Two-level shard directories from MD5(bucket/key).
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// On-disk payload location of an object. Parents may not exist yet.
    fn object_file(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(".multipart").join(upload_id)
    }

    fn part_file(&self, upload_id: &str, part_number: u32) -> PathBuf {
        self.staging_dir(upload_id)
            .join(format!("part-{}", part_number))
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, owner_id, region, created_at, versioning_enabled
             FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::BucketNotFound(bucket.to_string()))
    }

    /// Fetch a live (not soft-deleted) object row.
    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StoreResult<Object> {
        sqlx::query_as::<_, Object>(
            "SELECT id, bucket_id, key, filename, content_type, size_bytes, etag,
                    storage_class, last_modified, version_id, is_deleted
             FROM objects
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            bucket: bucket.name.clone(),
            key: key.to_string(),
        })
    }

    async fn resolve_object(&self, path: &ObjectPath) -> StoreResult<(Bucket, Object)> {
        self.ensure_key_safe(&path.key)?;
        let bucket = self.fetch_bucket(&path.bucket).await?;
        let object = self.fetch_object(&bucket, &path.key).await?;
        Ok((bucket, object))
    }

    /// Fetch an open multipart session that targets `destination`.
    async fn fetch_open_upload(
        &self,
        destination: &ObjectPath,
        upload_id: &str,
    ) -> StoreResult<(Bucket, MultipartUpload)> {
        self.ensure_key_safe(&destination.key)?;
        let bucket = self.fetch_bucket(&destination.bucket).await?;
        let upload = sqlx::query_as::<_, MultipartUpload>(
            "SELECT id, bucket_id, key, upload_id, initiated_at, completed
             FROM multipart_uploads
             WHERE upload_id = ? AND completed = 0",
        )
        .bind(upload_id)
        .fetch_optional(&*self.db)
        .await?
        .filter(|upload| upload.bucket_id == bucket.id && upload.key == destination.key)
        .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
        Ok((bucket, upload))
    }

    /// Insert or overwrite the metadata row of `key`, clearing any delete marker.
    async fn upsert_object(
        &self,
        bucket: &Bucket,
        key: &str,
        content_type: Option<String>,
        size_bytes: i64,
        etag: &str,
    ) -> StoreResult<Object> {
        let filename = key.rsplit('/').next().unwrap_or(key).to_string();

        let object = sqlx::query_as::<_, Object>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, filename, content_type, size_bytes,
                etag, storage_class, last_modified, version_id, is_deleted
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                storage_class = excluded.storage_class,
                last_modified = excluded.last_modified,
                version_id = excluded.version_id,
                is_deleted = 0
            RETURNING id, bucket_id, key, filename, content_type, size_bytes,
                      etag, storage_class, last_modified, version_id, is_deleted
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket.id)
        .bind(key)
        .bind(&filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(etag)
        .bind("STANDARD")
        .bind(Utc::now())
        .bind::<Option<String>>(None)
        .fetch_one(&*self.db)
        .await?;
        Ok(object)
    }

    /// Temp file next to `final_path`, creating its parent directory.
    async fn temp_file_for(&self, final_path: &Path) -> StoreResult<PathBuf> {
        let parent = final_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent.join(format!(".tmp-{}", Uuid::new_v4())))
    }

    /// Stream-upload an object and record its metadata.
    ///
    /// Bytes go to a temp file while size and MD5 are computed; the file is
    /// fsynced and renamed into place, then the metadata row is upserted.
    /// The temp file is removed on any error, and the payload too when the
    /// upsert of a new key fails.
    pub async fn put_object_stream<S>(
        &self,
        path: &ObjectPath,
        content_type: Option<String>,
        stream: S,
    ) -> StoreResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(&path.key)?;
        let bucket = self.fetch_bucket(&path.bucket).await?;

        let file_path = self.object_file(&bucket.name, &path.key);
        let tmp_path = self.temp_file_for(&file_path).await?;
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = sync_file(&mut file).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        drop(file);

        let replacing = match self.fetch_object(&bucket, &path.key).await {
            Ok(_) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        commit_file(&tmp_path, &file_path).await?;

        let etag = format!("{:x}", digest.compute());
        match self
            .upsert_object(&bucket, &path.key, content_type, size_bytes, &etag)
            .await
        {
            Ok(object) => {
                debug!(path = %path, size = size_bytes, etag = %etag, "stored object");
                Ok(object)
            }
            Err(err) => {
                // A live row still points at this file when overwriting.
                if !replacing {
                    let _ = fs::remove_file(&file_path).await;
                }
                Err(err)
            }
        }
    }

    /// Store an in-memory payload.
    pub async fn put_object(
        &self,
        path: &ObjectPath,
        content_type: Option<String>,
        data: Bytes,
    ) -> StoreResult<Object> {
        self.put_object_stream(
            path,
            content_type,
            stream::once(async move { Ok::<_, io::Error>(data) }),
        )
            .await
    }

    /// Create a bucket row and its directory on disk.
    pub async fn create_local_bucket(&self, name: &str) -> StoreResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: Uuid::new_v4(),
            region: DEFAULT_REGION.to_string(),
            created_at: Utc::now(),
            versioning_enabled: false,
        };

        match sqlx::query(
            "INSERT INTO buckets (id, name, owner_id, region, created_at, versioning_enabled)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(bucket.id)
        .bind(&bucket.name)
        .bind(bucket.owner_id)
        .bind(&bucket.region)
        .bind(bucket.created_at)
        .bind(bucket.versioning_enabled)
        .execute(&*self.db)
        .await
        {
            Ok(_) => {
                debug!(bucket = %bucket.name, region = %bucket.region, "created bucket");
                Ok(bucket)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    /// Signature for a presigned read of `path` valid until `expires` (unix seconds).
    fn presign_signature(&self, path: &ObjectPath, expires: i64) -> String {
        let digest = md5::compute(format!(
            "{}\n{}\n{}",
            self.presign_secret,
            path.path(),
            expires
        ));
        URL_SAFE_NO_PAD.encode(digest.0)
    }

    /// Check a signature produced by `presign_get` at time `now`.
    pub fn verify_presigned_get(
        &self,
        path: &ObjectPath,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        now.timestamp() <= expires && self.presign_signature(path, expires) == signature
    }

    /// Walk up from `start` removing empty directories until `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    async fn remove_staging(&self, upload_id: &str) {
        let dir = self.staging_dir(upload_id);
        if let Err(err) = fs::remove_dir_all(&dir).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove staging directory {}: {}",
                    dir.display(),
                    err
                );
            }
        }
    }
}

impl CopyBackend for LocalStore {
    async fn head_object(&self, path: &ObjectPath, payer: RequestPayer) -> StoreResult<ObjectHead> {
        debug!(path = %path, payer = ?payer, "head object");
        match self.resolve_object(path).await {
            Ok((_, object)) => Ok(object.head()),
            // A head has no body to name the bucket; missing buckets read as 404.
            Err(StoreError::BucketNotFound(_)) => Err(StoreError::not_found(path)),
            Err(err) => Err(err),
        }
    }

    async fn copy_object(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        payer: RequestPayer,
    ) -> StoreResult<Option<String>> {
        let (src_bucket, src_object) = self.resolve_object(source).await?;
        self.ensure_key_safe(&destination.key)?;
        let dst_bucket = self.fetch_bucket(&destination.bucket).await?;

        let src_file = self.object_file(&src_bucket.name, &source.key);
        let dst_file = self.object_file(&dst_bucket.name, &destination.key);
        let tmp_path = self.temp_file_for(&dst_file).await?;

        if let Err(err) = fs::copy(&src_file, &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(missing_as_not_found(err, source));
        }
        commit_file(&tmp_path, &dst_file).await?;

        let etag = src_object.etag.clone().unwrap_or_default();
        let copied = self
            .upsert_object(
                &dst_bucket,
                &destination.key,
                src_object.content_type.clone(),
                src_object.size_bytes,
                &etag,
            )
            .await?;
        debug!(source = %source, destination = %destination, payer = ?payer, "copied object");
        Ok(copied.etag)
    }

    async fn create_multipart_upload(&self, destination: &ObjectPath) -> StoreResult<String> {
        self.ensure_key_safe(&destination.key)?;
        let bucket = self.fetch_bucket(&destination.bucket).await?;

        let upload = MultipartUpload {
            id: Uuid::new_v4(),
            bucket_id: bucket.id,
            key: destination.key.clone(),
            upload_id: Uuid::new_v4().to_string(),
            initiated_at: Utc::now(),
            completed: false,
        };
        fs::create_dir_all(self.staging_dir(&upload.upload_id)).await?;

        sqlx::query(
            "INSERT INTO multipart_uploads (id, bucket_id, key, upload_id, initiated_at, completed)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(upload.id)
        .bind(upload.bucket_id)
        .bind(&upload.key)
        .bind(&upload.upload_id)
        .bind(upload.initiated_at)
        .bind(upload.completed)
        .execute(&*self.db)
        .await?;

        debug!(upload_id = %upload.upload_id, destination = %destination, "created multipart upload");
        Ok(upload.upload_id)
    }

    async fn upload_part_copy(
        &self,
        source: &ObjectPath,
        destination: &ObjectPath,
        upload_id: &str,
        range: PartRange,
        payer: RequestPayer,
    ) -> StoreResult<String> {
        if !(1..=MAX_PART_NUMBER).contains(&range.part_number) {
            return Err(StoreError::InvalidPart {
                part_number: range.part_number,
                reason: format!("part number must be between 1 and {}", MAX_PART_NUMBER),
            });
        }

        let (_, upload) = self.fetch_open_upload(destination, upload_id).await?;
        let (src_bucket, src_object) = self.resolve_object(source).await?;
        let src_size = src_object.size_bytes.max(0) as u64;
        if range.start > range.end || range.end >= src_size {
            return Err(StoreError::InvalidRange {
                range: range.header_value(),
                size: src_size,
            });
        }

        let src_file = self.object_file(&src_bucket.name, &source.key);
        let part_path = self.part_file(upload_id, range.part_number);
        let tmp_path = self.temp_file_for(&part_path).await?;

        let etag = match copy_range(&src_file, range, &tmp_path).await {
            Ok(digest) => format!("{:x}", digest),
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        commit_file(&tmp_path, &part_path).await?;

        sqlx::query(
            "INSERT INTO multipart_parts (id, upload_id, part_number, size_bytes, etag, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(Uuid::new_v4())
        .bind(upload.id)
        .bind(range.part_number as i64)
        .bind(range.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!(
            upload_id = %upload_id,
            part = range.part_number,
            range = %range.header_value(),
            payer = ?payer,
            "copied part"
        );
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        destination: &ObjectPath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let (bucket, upload) = self.fetch_open_upload(destination, upload_id).await?;

        if parts.is_empty() {
            return Err(StoreError::InvalidPart {
                part_number: 0,
                reason: "at least one part is required".into(),
            });
        }
        if parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(StoreError::InvalidPartOrder);
        }

        let staged: HashMap<i64, MultipartPart> = sqlx::query_as::<_, MultipartPart>(
            "SELECT id, upload_id, part_number, size_bytes, etag, uploaded_at
             FROM multipart_parts WHERE upload_id = ?",
        )
        .bind(upload.id)
        .fetch_all(&*self.db)
        .await?
        .into_iter()
        .map(|part| (part.part_number, part))
        .collect();

        let mut part_files = Vec::with_capacity(parts.len());
        let mut digests = Vec::with_capacity(parts.len() * 16);
        let mut size_bytes: i64 = 0;
        for part in parts {
            let invalid = |reason: &str| StoreError::InvalidPart {
                part_number: part.part_number,
                reason: reason.to_string(),
            };
            let row = staged
                .get(&(part.part_number as i64))
                .ok_or_else(|| invalid("part was never uploaded"))?;
            if row.etag != part.etag.trim_matches('"') {
                return Err(invalid("ETag does not match the uploaded part"));
            }
            digests.extend(digest_bytes(&row.etag).ok_or_else(|| invalid("malformed ETag"))?);
            size_bytes += row.size_bytes;
            part_files.push(self.part_file(upload_id, part.part_number));
        }

        let dst_file = self.object_file(&bucket.name, &destination.key);
        let tmp_path = self.temp_file_for(&dst_file).await?;
        if let Err(err) = concat_files(&part_files, &tmp_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        commit_file(&tmp_path, &dst_file).await?;

        let etag = format!("{:x}-{}", md5::compute(&digests), parts.len());
        self.upsert_object(&bucket, &destination.key, None, size_bytes, &etag)
            .await?;

        sqlx::query("UPDATE multipart_uploads SET completed = 1 WHERE id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        self.remove_staging(upload_id).await;

        debug!(upload_id = %upload_id, parts = parts.len(), etag = %etag, "completed multipart upload");
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        destination: &ObjectPath,
        upload_id: &str,
    ) -> StoreResult<()> {
        let (_, upload) = self.fetch_open_upload(destination, upload_id).await?;

        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE id = ?")
            .bind(upload.id)
            .execute(&*self.db)
            .await?;
        self.remove_staging(upload_id).await;

        debug!(upload_id = %upload_id, "aborted multipart upload");
        Ok(())
    }
}

impl ObjectStore for LocalStore {
    async fn create_bucket(&self, name: &str) -> StoreResult<String> {
        let bucket = self.create_local_bucket(name).await?;
        Ok(bucket.location())
    }

    async fn get_object(&self, path: &ObjectPath, payer: RequestPayer) -> StoreResult<Bytes> {
        let (bucket, _) = self.resolve_object(path).await?;
        let data = fs::read(self.object_file(&bucket.name, &path.key))
            .await
            .map_err(|err| missing_as_not_found(err, path))?;
        debug!(path = %path, size = data.len(), payer = ?payer, "read object");
        Ok(Bytes::from(data))
    }

    /// Soft-delete the row, then remove the payload and prune empty shard
    /// directories. A missing object is not an error.
    async fn delete_object(&self, path: &ObjectPath) -> StoreResult<()> {
        let (bucket, _) = match self.resolve_object(path).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                debug!(path = %path, "delete of missing object");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        sqlx::query("UPDATE objects SET is_deleted = 1 WHERE key = ? AND bucket_id = ?")
            .bind(&path.key)
            .bind(bucket.id)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_file(&bucket.name, &path.key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    async fn presign_get(&self, path: &ObjectPath, expires_in: Duration) -> StoreResult<String> {
        self.ensure_key_safe(&path.key)?;
        self.ensure_bucket_name_safe(&path.bucket)?;
        let expires = Utc::now()
            .timestamp()
            .saturating_add(i64::try_from(expires_in.as_secs()).unwrap_or(i64::MAX));
        let signature = self.presign_signature(path, expires);
        Ok(format!(
            "local://{}?X-Expires={}&X-Signature={}",
            path.path(),
            expires,
            signature
        ))
    }
}

async fn sync_file(file: &mut File) -> StoreResult<()> {
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Rename a finished temp file into place, replacing any existing file.
async fn commit_file(tmp_path: &Path, final_path: &Path) -> StoreResult<()> {
    if let Err(err) = fs::rename(tmp_path, final_path).await {
        if err.kind() == ErrorKind::AlreadyExists {
            fs::remove_file(final_path).await?;
            fs::rename(tmp_path, final_path).await?;
        } else {
            let _ = fs::remove_file(tmp_path).await;
            return Err(StoreError::Io(err));
        }
    }
    Ok(())
}

/// Copy the inclusive byte range of `src` into a new file at `dst`,
/// returning the MD5 of the copied bytes.
async fn copy_range(src: &Path, range: PartRange, dst: &Path) -> StoreResult<md5::Digest> {
    let mut input = File::open(src).await?;
    input.seek(SeekFrom::Start(range.start)).await?;
    let mut output = File::create(dst).await?;

    let mut digest = Context::new();
    let mut remaining = range.len();
    let mut buf = vec![0u8; remaining.min(COPY_BUFFER_SIZE) as usize];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = input.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(StoreError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "source shorter than its recorded size",
            )));
        }
        digest.consume(&buf[..n]);
        output.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    sync_file(&mut output).await?;
    Ok(digest.compute())
}

/// Concatenate `parts` in order into a new file at `dst`.
async fn concat_files(parts: &[PathBuf], dst: &Path) -> StoreResult<()> {
    let mut output = File::create(dst).await?;
    for part in parts {
        let mut input = File::open(part).await?;
        tokio::io::copy(&mut input, &mut output).await?;
    }
    sync_file(&mut output).await
}

fn missing_as_not_found(err: io::Error, path: &ObjectPath) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::not_found(path)
    } else {
        StoreError::Io(err)
    }
}

/// Binary MD5 from a hex ETag.
fn digest_bytes(etag: &str) -> Option<Vec<u8>> {
    let hex = etag.trim_matches('"');
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
