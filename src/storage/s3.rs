//! S3-backed object store.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use log::{debug, info, warn};

use crate::config::S3Config;

use super::ObjectStore;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    #[must_use]
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build a store from configuration. Credentials come from the default AWS
    /// provider chain (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, profiles).
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if config.endpoint.is_some() {
            builder = builder.force_path_style(true);
        }

        info!(
            "Using object store s3://{} in {}",
            config.bucket, config.region
        );

        Self::new(Client::from_conf(builder.build()), config.bucket.clone())
    }

    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, key: &str) -> Option<Vec<u8>> {
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    warn!("Object s3://{}/{key} does not exist", self.bucket);
                } else {
                    warn!(
                        "Failed to fetch s3://{}/{key}: {service_err}",
                        self.bucket
                    );
                }
                return None;
            }
        };

        let body = match response.body.collect().await {
            Ok(body) => body,
            Err(err) => {
                warn!("Failed to read body of s3://{}/{key}: {err}", self.bucket);
                return None;
            }
        };

        let bytes = body.into_bytes().to_vec();
        debug!(
            "Fetched {} bytes from s3://{}/{key}",
            bytes.len(),
            self.bucket
        );
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_keeps_its_bucket() {
        let client = Client::from_conf(
            aws_sdk_s3::Config::builder()
                .behavior_version_latest()
                .build(),
        );
        let store = S3ObjectStore::new(client, "travelplacesbucketjapan".to_string());
        assert_eq!(store.bucket(), "travelplacesbucketjapan");
    }
}
