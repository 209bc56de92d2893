//! Per-bucket CORS and static-website configuration, persisted as a small
//! JSON sidecar at the bucket root so it survives a server restart.

use tokio::fs;

use super::FsStore;
use crate::error::AppError;
use crate::models::bucket::Bucket;
use crate::models::cors::CorsConfiguration;
use crate::models::website::WebsiteConfiguration;

pub(crate) const BUCKET_CONFIG_FILE: &str = ".bucket_config.json";

impl FsStore {
    fn config_path(&self, bucket: &str) -> std::path::PathBuf {
        self.bucket_root(bucket).join(BUCKET_CONFIG_FILE)
    }

    async fn read_config(&self, bucket: &str) -> Result<Bucket, AppError> {
        let path = self.config_path(bucket);
        match fs::read(&path).await {
            Ok(body) => {
                serde_json::from_slice(&body).map_err(|err| AppError::Internal(err.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Bucket::new(bucket, chrono::Utc::now()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_config(&self, bucket: &Bucket) -> Result<(), AppError> {
        let body =
            serde_json::to_vec_pretty(bucket).map_err(|err| AppError::Internal(err.to_string()))?;
        fs::write(self.config_path(&bucket.name), body).await?;
        Ok(())
    }

    pub async fn get_cors(&self, bucket: &str) -> Result<Option<CorsConfiguration>, AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(self.read_config(bucket).await?.cors)
    }

    pub async fn put_cors(
        &self,
        bucket: &str,
        cors: CorsConfiguration,
    ) -> Result<(), AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let mut config = self.read_config(bucket).await?;
        config.cors = Some(cors);
        self.write_config(&config).await
    }

    pub async fn delete_cors(&self, bucket: &str) -> Result<(), AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let mut config = self.read_config(bucket).await?;
        config.cors = None;
        self.write_config(&config).await
    }

    pub async fn get_website(
        &self,
        bucket: &str,
    ) -> Result<Option<WebsiteConfiguration>, AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        Ok(self.read_config(bucket).await?.website)
    }

    pub async fn put_website(
        &self,
        bucket: &str,
        website: WebsiteConfiguration,
    ) -> Result<(), AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let mut config = self.read_config(bucket).await?;
        config.website = Some(website);
        self.write_config(&config).await
    }

    pub async fn delete_website(&self, bucket: &str) -> Result<(), AppError> {
        if !self.bucket_exists(bucket).await {
            return Err(AppError::NoSuchBucket {
                bucket: bucket.to_string(),
            });
        }
        let mut config = self.read_config(bucket).await?;
        config.website = None;
        self.write_config(&config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::models::cors::CorsRule;

    async fn store() -> (tempfile::TempDir, FsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path(), EventBus::new());
        store.create_bucket("b").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn cors_config_round_trips() {
        let (_dir, store) = store().await;
        assert!(store.get_cors("b").await.unwrap().is_none());
        store
            .put_cors(
                "b",
                CorsConfiguration {
                    rules: vec![CorsRule::wildcard()],
                },
            )
            .await
            .unwrap();
        let cors = store.get_cors("b").await.unwrap().unwrap();
        assert_eq!(cors.rules.len(), 1);
        store.delete_cors("b").await.unwrap();
        assert!(store.get_cors("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn website_config_round_trips() {
        let (_dir, store) = store().await;
        store
            .put_website("b", WebsiteConfiguration::new("index.html", None))
            .await
            .unwrap();
        let website = store.get_website("b").await.unwrap().unwrap();
        assert_eq!(website.index_document, "index.html");
    }
}
