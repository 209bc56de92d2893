//! Multipart upload staging and assembly.
//!
//! Parts are written under `<bucket>/.uploads/<upload-id>/<part-number>`,
//! outside the object namespace the listing engine ever walks. Completion
//! concatenates the named parts, in the caller-supplied order, into the
//! final object via the same atomic-rename path as a single-shot `PutObject`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use md5::Context;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{FsStore, PutOutcome, UPLOADS_DIR};
use crate::error::AppError;
use crate::models::event::{EventName, S3Event};
use crate::models::multipart::{MultipartUpload, PartSummary};
use crate::models::object::ObjectMetadata;
use crate::validation::ensure_key_safe;

impl FsStore {
    fn upload_dir(&self, bucket: &str, upload_id: &str) -> PathBuf {
        self.bucket_root(bucket).join(UPLOADS_DIR).join(upload_id)
    }

    fn part_path(&self, bucket: &str, upload_id: &str, part_number: u32) -> PathBuf {
        self.upload_dir(bucket, upload_id)
            .join(format!("part-{part_number:05}"))
    }

    pub async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: String,
        metadata: BTreeMap<String, String>,
    ) -> Result<String, AppError> {
        ensure_key_safe(key)?;
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let upload_id = Uuid::new_v4().to_string();
        fs::create_dir_all(self.upload_dir(bucket, &upload_id)).await?;

        let record = MultipartUpload {
            upload_id: upload_id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type,
            metadata,
            initiated_at: Utc::now(),
        };
        self.uploads.lock().await.insert(upload_id.clone(), record);
        Ok(upload_id)
    }

    pub async fn upload_part(
        &self,
        bucket: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<String, AppError> {
        self.ensure_upload_belongs(bucket, upload_id).await?;
        let path = self.part_path(bucket, upload_id, part_number);
        fs::write(&path, data).await?;
        Ok(format!("{:x}", md5::compute(data)))
    }

    async fn ensure_upload_belongs(&self, bucket: &str, upload_id: &str) -> Result<(), AppError> {
        let uploads = self.uploads.lock().await;
        match uploads.get(upload_id) {
            Some(record) if record.bucket == bucket => Ok(()),
            _ => Err(AppError::InvalidRequest(format!(
                "no such multipart upload `{upload_id}`"
            ))),
        }
    }

    /// Assemble `part_numbers`, in the given order, into the final object.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        upload_id: &str,
        part_numbers: &[u32],
    ) -> Result<PutOutcome, AppError> {
        let record = {
            let uploads = self.uploads.lock().await;
            uploads
                .get(upload_id)
                .filter(|r| r.bucket == bucket)
                .cloned()
                .ok_or_else(|| {
                    AppError::InvalidRequest(format!("no such multipart upload `{upload_id}`"))
                })
        }?;

        if part_numbers.is_empty() {
            return Err(AppError::InvalidRequest(
                "completed multipart upload must list at least one part".into(),
            ));
        }

        let target = self.object_path(bucket, &record.key);
        let parent = target
            .parent()
            .map(std::path::Path::to_path_buf)
            .ok_or_else(|| AppError::Internal("object path missing parent directory".into()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut digest = Context::new();
        let mut size: u64 = 0;
        for &part_number in part_numbers {
            let part_path = self.part_path(bucket, upload_id, part_number);
            let data = fs::read(&part_path).await.map_err(|_| {
                AppError::InvalidRequest(format!("missing part {part_number} for upload"))
            })?;
            digest.consume(&data);
            size += data.len() as u64;
            file.write_all(&data).await?;
        }
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, &target).await?;

        let etag = format!("{:x}", digest.compute());
        let last_modified = Utc::now();
        let mut sidecar = ObjectMetadata::new(etag.clone(), last_modified);
        sidecar.content_type = record.content_type.clone();
        sidecar.metadata = record.metadata.clone();
        self.write_sidecar(bucket, &record.key, &sidecar).await?;

        fs::remove_dir_all(self.upload_dir(bucket, upload_id))
            .await
            .ok();
        self.uploads.lock().await.remove(upload_id);

        self.events.publish(
            S3Event::new(EventName::ObjectCreatedPut, bucket, &record.key)
                .with_object(size, &etag),
        );

        Ok(PutOutcome {
            etag,
            size,
            last_modified,
        })
    }

    pub async fn abort_multipart_upload(
        &self,
        bucket: &str,
        upload_id: &str,
    ) -> Result<(), AppError> {
        self.ensure_upload_belongs(bucket, upload_id).await?;
        fs::remove_dir_all(self.upload_dir(bucket, upload_id))
            .await
            .ok();
        self.uploads.lock().await.remove(upload_id);
        Ok(())
    }

    pub async fn list_parts(
        &self,
        bucket: &str,
        upload_id: &str,
    ) -> Result<Vec<PartSummary>, AppError> {
        self.ensure_upload_belongs(bucket, upload_id).await?;
        let dir = self.upload_dir(bucket, upload_id);
        let mut entries = fs::read_dir(&dir).await?;
        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(number) = name.strip_prefix("part-").and_then(|n| n.parse::<u32>().ok()) {
                let size = entry.metadata().await?.len();
                parts.push(PartSummary { part_number: number, size });
            }
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use bytes::Bytes;
    use futures::stream;

    async fn store_with_bucket() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), EventBus::new());
        store.create_bucket("b").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn assembles_parts_in_order_matches_single_put() {
        let (_dir, store) = store_with_bucket().await;
        let upload_id = store
            .initiate_multipart_upload("b", "big.bin", "application/octet-stream".into(), Default::default())
            .await
            .unwrap();

        store.upload_part("b", &upload_id, 2, b"world").await.unwrap();
        store.upload_part("b", &upload_id, 1, b"hello ").await.unwrap();

        let outcome = store
            .complete_multipart_upload("b", &upload_id, &[1, 2])
            .await
            .unwrap();

        let direct = md5::compute(b"hello world");
        assert_eq!(outcome.etag, format!("{direct:x}"));
        assert_eq!(outcome.size, 11);

        let (_meta, size) = store.head_object("b", "big.bin").await.unwrap();
        assert_eq!(size, 11);
    }

    #[tokio::test]
    async fn abort_removes_staging_directory() {
        let (_dir, store) = store_with_bucket().await;
        let upload_id = store
            .initiate_multipart_upload("b", "k", "text/plain".into(), Default::default())
            .await
            .unwrap();
        store.upload_part("b", &upload_id, 1, b"data").await.unwrap();
        store.abort_multipart_upload("b", &upload_id).await.unwrap();
        assert!(store.list_parts("b", &upload_id).await.is_err());
    }

    #[tokio::test]
    async fn put_object_still_works_alongside_multipart_module() {
        let (_dir, store) = store_with_bucket().await;
        let body = stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"hi")) });
        let outcome = store
            .put_object("b", "k", None, Default::default(), body)
            .await
            .unwrap();
        assert_eq!(outcome.size, 2);
    }
}
