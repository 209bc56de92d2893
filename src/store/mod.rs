//! FsStore — core S3-like operations backed entirely by the local
//! filesystem. Object content lives at `base_path/{bucket}/{key}`; each
//! object's metadata lives alongside it as a JSON sidecar. There is no
//! database: a bucket "exists" because its directory exists, an object
//! "exists" because both its blob and its sidecar exist.

pub mod config;
pub mod multipart;

use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::events::EventBus;
use crate::listing::{self, ListParams, ListResult};
use crate::models::bucket::Bucket;
use crate::models::event::{EventName, S3Event};
use crate::models::multipart::MultipartUpload;
use crate::models::object::{ObjectMetadata, ObjectSummary};
use crate::validation::ensure_key_safe;

const SIDECAR_SUFFIX: &str = ".s3rver_metadata.json";
pub const UPLOADS_DIR: &str = ".uploads";

#[derive(Clone)]
pub struct FsStore {
    base_path: PathBuf,
    events: EventBus,
    uploads: Arc<Mutex<BTreeMap<String, MultipartUpload>>>,
}

pub struct PutOutcome {
    pub etag: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl FsStore {
    pub fn new(base_path: impl Into<PathBuf>, events: EventBus) -> Self {
        Self {
            base_path: base_path.into(),
            events,
            uploads: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn bucket_root(&self, bucket: &str) -> PathBuf {
        self.base_path.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_root(bucket).join(key)
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.object_path(bucket, key).into_os_string();
        path.push(SIDECAR_SUFFIX);
        path.into()
    }

    pub async fn bucket_exists(&self, bucket: &str) -> bool {
        fs::metadata(self.bucket_root(bucket)).await.is_ok()
    }

    async fn require_bucket(&self, bucket: &str) -> Result<(), AppError> {
        if self.bucket_exists(bucket).await {
            Ok(())
        } else {
            Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            })
        }
    }

    // --- Buckets -----------------------------------------------------

    /// Creating a bucket that already exists is idempotent: this server owns
    /// its whole data root, so any directory found there was created by an
    /// earlier call to this same method, not by some other tenant.
    pub async fn create_bucket(&self, name: &str) -> Result<Bucket, AppError> {
        let root = self.bucket_root(name);
        if let Ok(existing) = fs::metadata(&root).await {
            let created = existing
                .created()
                .or_else(|_| existing.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            return Ok(Bucket::new(name, created));
        }
        fs::create_dir_all(&root).await?;
        Ok(Bucket::new(name, Utc::now()))
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<(), AppError> {
        self.require_bucket(name).await?;
        let object_count = self.count_objects(name).await?;
        if object_count > 0 {
            return Err(AppError::BucketNotEmpty {
                bucket: name.to_string(),
            });
        }
        fs::remove_dir_all(self.bucket_root(name)).await?;
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, AppError> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut buckets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let created = entry
                .metadata()
                .await
                .and_then(|m| m.created().or_else(|_| m.modified()))
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            buckets.push(Bucket::new(name, created));
        }
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn count_objects(&self, bucket: &str) -> Result<usize, AppError> {
        Ok(self.collect_object_keys(bucket).await?.len())
    }

    // --- Objects -------------------------------------------------------

    pub async fn put_object<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        user_metadata: BTreeMap<String, String>,
        stream: S,
    ) -> Result<PutOutcome, AppError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.put_object_checked(bucket, key, content_type, user_metadata, None, stream)
            .await
    }

    /// Same as [`Self::put_object`] but verifies the uploaded bytes against
    /// a base64-encoded `Content-MD5` header value, if one was supplied.
    pub async fn put_object_checked<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        user_metadata: BTreeMap<String, String>,
        content_md5_base64: Option<String>,
        stream: S,
    ) -> Result<PutOutcome, AppError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        ensure_key_safe(key)?;
        self.require_bucket(bucket).await?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::Internal("object path missing parent directory".into()))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(err.into());
                }
            };
            size += chunk.len() as u64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        let digest_bytes = digest.compute();
        if let Some(expected) = content_md5_base64 {
            use base64::Engine as _;
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(expected)
                .map_err(|_| AppError::InvalidDigest)?;
            if decoded != digest_bytes.0 {
                let _ = fs::remove_file(&file_path).await;
                return Err(AppError::InvalidDigest);
            }
        }
        let etag = format!("{:x}", digest_bytes);
        let last_modified = Utc::now();
        let mut sidecar = ObjectMetadata::new(etag.clone(), last_modified);
        sidecar.content_type = content_type.unwrap_or_else(|| "binary/octet-stream".to_string());
        sidecar.metadata = user_metadata;
        self.write_sidecar(bucket, key, &sidecar).await?;

        self.events.publish(
            S3Event::new(EventName::ObjectCreatedPut, bucket, key).with_object(size, &etag),
        );

        Ok(PutOutcome {
            etag,
            size,
            last_modified,
        })
    }

    async fn write_sidecar(
        &self,
        bucket: &str,
        key: &str,
        sidecar: &ObjectMetadata,
    ) -> Result<(), AppError> {
        let path = self.sidecar_path(bucket, key);
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(sidecar)
            .map_err(|err| AppError::Internal(err.to_string()))?;
        fs::write(&tmp_path, body).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    /// Blob and sidecar are renamed into place in that order, so a reader
    /// can observe the blob before its sidecar exists. A missing sidecar
    /// alongside a present blob is retried once (a brief write race) before
    /// being reported; a missing sidecar with no blob is a genuine miss.
    pub async fn read_sidecar(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, AppError> {
        match self.read_sidecar_once(bucket, key).await {
            Err(AppError::NoSuchKey { .. }) if fs::metadata(self.object_path(bucket, key)).await.is_ok() => {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                self.read_sidecar_once(bucket, key).await.map_err(|_| {
                    AppError::Internal(format!("blob present without metadata for `{key}`"))
                })
            }
            result => result,
        }
    }

    async fn read_sidecar_once(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, AppError> {
        let path = self.sidecar_path(bucket, key);
        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AppError::NoSuchKey {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&body).map_err(|err| AppError::Internal(err.to_string()))
    }

    pub async fn object_size(&self, bucket: &str, key: &str) -> Result<u64, AppError> {
        let path = self.object_path(bucket, key);
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn open_object(&self, bucket: &str, key: &str) -> Result<File, AppError> {
        let path = self.object_path(bucket, key);
        match File::open(&path).await {
            Ok(file) => Ok(file),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(AppError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(ObjectMetadata, u64), AppError> {
        self.require_bucket(bucket).await?;
        let sidecar = self.read_sidecar(bucket, key).await?;
        let size = self.object_size(bucket, key).await?;
        Ok((sidecar, size))
    }

    pub async fn copy_object(
        &self,
        dest_bucket: &str,
        dest_key: &str,
        source_bucket: &str,
        source_key: &str,
        replace_metadata: Option<(String, BTreeMap<String, String>)>,
    ) -> Result<PutOutcome, AppError> {
        ensure_key_safe(dest_key)?;
        self.require_bucket(source_bucket).await?;
        self.require_bucket(dest_bucket).await?;

        if source_bucket == dest_bucket
            && source_key == dest_key
            && replace_metadata.is_none()
        {
            return Err(AppError::InvalidRequest(
                "copy source and destination are identical".into(),
            ));
        }

        let mut sidecar = self.read_sidecar(source_bucket, source_key).await?;
        let source_path = self.object_path(source_bucket, source_key);
        if fs::metadata(&source_path).await.is_err() {
            return Err(AppError::NoSuchKey {
                bucket: source_bucket.to_string(),
                key: source_key.to_string(),
            });
        }

        if let Some((content_type, metadata)) = replace_metadata {
            sidecar.content_type = content_type;
            sidecar.metadata = metadata;
        }

        let dest_path = self.object_path(dest_bucket, dest_key);
        let parent = dest_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| AppError::Internal("object path missing parent directory".into()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        fs::copy(&source_path, &tmp_path).await?;
        fs::rename(&tmp_path, &dest_path).await?;

        sidecar.last_modified = Utc::now();
        self.write_sidecar(dest_bucket, dest_key, &sidecar).await?;

        let size = fs::metadata(&dest_path).await?.len();
        self.events.publish(
            S3Event::new(EventName::ObjectCreatedCopy, dest_bucket, dest_key)
                .with_object(size, &sidecar.etag),
        );

        Ok(PutOutcome {
            etag: sidecar.etag,
            size,
            last_modified: sidecar.last_modified,
        })
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<bool, AppError> {
        self.require_bucket(bucket).await?;
        let blob_path = self.object_path(bucket, key);
        let sidecar_path = self.sidecar_path(bucket, key);

        let mut removed = false;
        match fs::remove_file(&blob_path).await {
            Ok(_) => removed = true,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        match fs::remove_file(&sidecar_path).await {
            Ok(_) => removed = true,
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(parent) = blob_path.parent() {
            let bucket_root = self.bucket_root(bucket);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        if removed {
            self.events
                .publish(S3Event::new(EventName::ObjectRemovedDelete, bucket, key));
        }
        Ok(removed)
    }

    /// Delete every key in `keys`, reporting all of them (present or not)
    /// as deleted. Only genuine I/O failures are returned as errors.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<(Vec<String>, Vec<(String, AppError)>), AppError> {
        self.require_bucket(bucket).await?;
        let mut deleted = Vec::with_capacity(keys.len());
        let mut errors = Vec::new();
        for key in keys {
            match self.delete_object(bucket, key).await {
                Ok(_) => deleted.push(key.clone()),
                Err(err) => errors.push((key.clone(), err)),
            }
        }
        Ok((deleted, errors))
    }

    /// Walk up from `start` toward (but not including) `stop`, removing
    /// directories as they become empty. Stops at the first non-empty
    /// directory or once `stop` is reached.
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

    // --- Listing ---------------------------------------------------------

    pub async fn list_objects(
        &self,
        bucket: &str,
        params: ListParams,
    ) -> Result<ListResult, AppError> {
        self.require_bucket(bucket).await?;
        let keys = self.collect_object_keys(bucket).await?;
        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            let sidecar = self.read_sidecar(bucket, &key).await?;
            let size = self.object_size(bucket, &key).await?;
            summaries.push(ObjectSummary {
                key,
                size,
                etag: sidecar.etag,
                last_modified: sidecar.last_modified,
            });
        }
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listing::list(summaries, &params.clamp_max_keys()))
    }

    /// Enumerate object keys in `bucket`, skipping sidecar files and the
    /// multipart staging area. Keys are returned in arbitrary order.
    async fn collect_object_keys(&self, bucket: &str) -> Result<Vec<String>, AppError> {
        let root = self.bucket_root(bucket);
        let mut keys = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path.file_name().and_then(|n| n.to_str()) == Some(UPLOADS_DIR) {
                        continue;
                    }
                    stack.push(path);
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.ends_with(SIDECAR_SUFFIX)
                    || name.ends_with(".tmp")
                    || name.starts_with(".tmp-")
                    || name == config::BUCKET_CONFIG_FILE
                {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&root) {
                    keys.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), EventBus::new());
        (dir, store)
    }

    fn body(bytes: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> {
        stream::once(async move { Ok(Bytes::from_static(bytes)) })
    }

    #[tokio::test]
    async fn put_then_head_round_trips_etag() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        let outcome = store
            .put_object("b", "text", None, BTreeMap::new(), body(b"Hello!"))
            .await
            .unwrap();
        assert_eq!(outcome.etag, "952d2c56d0485958336747bcdd98590d");

        let (meta, size) = store.head_object("b", "text").await.unwrap();
        assert_eq!(size, 6);
        assert_eq!(meta.etag, "952d2c56d0485958336747bcdd98590d");
    }

    #[tokio::test]
    async fn put_against_missing_bucket_fails() {
        let (_dir, store) = store().await;
        let err = store
            .put_object("missing", "k", None, BTreeMap::new(), body(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoSuchBucket { .. }));
    }

    #[tokio::test]
    async fn delete_is_idempotent_for_missing_keys() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        assert!(!store.delete_object("b", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn delete_bucket_requires_empty() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        store
            .put_object("b", "k", None, BTreeMap::new(), body(b"x"))
            .await
            .unwrap();
        let err = store.delete_bucket("b").await.unwrap_err();
        assert!(matches!(err, AppError::BucketNotEmpty { .. }));

        store.delete_object("b", "k").await.unwrap();
        store.delete_bucket("b").await.unwrap();
        assert!(!store.bucket_exists("b").await);
    }

    #[tokio::test]
    async fn copy_preserves_metadata_by_default() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("somekey".to_string(), "value".to_string());
        store
            .put_object(
                "b",
                "src",
                Some("image/jpeg".to_string()),
                metadata,
                body(b"data"),
            )
            .await
            .unwrap();

        store
            .copy_object("b", "dst", "b", "src", None)
            .await
            .unwrap();

        let (meta, _) = store.head_object("b", "dst").await.unwrap();
        assert_eq!(meta.content_type, "image/jpeg");
        assert_eq!(meta.metadata.get("somekey").map(String::as_str), Some("value"));
    }

    #[tokio::test]
    async fn list_objects_partitions_with_delimiter() {
        let (_dir, store) = store().await;
        store.create_bucket("b").await.unwrap();
        for key in ["akey1", "akey2", "akey3", "key/key1", "key1", "key2", "key3"] {
            store
                .put_object("b", key, None, BTreeMap::new(), body(b"x"))
                .await
                .unwrap();
        }

        let params = ListParams {
            prefix: String::new(),
            delimiter: Some("/".to_string()),
            marker: String::new(),
            max_keys: 1000,
        };
        let result = store.list_objects("b", params).await.unwrap();
        assert_eq!(result.contents.len(), 6);
        assert_eq!(result.common_prefixes, vec!["key/".to_string()]);
    }
}
