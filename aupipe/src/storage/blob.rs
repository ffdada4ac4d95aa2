//! Blob object store client.
//!
//! Talks to an HTTP object gateway with bearer authentication. Transport
//! failures, 5xx and 429 map onto the transient `Network` kind so the
//! pipeline's retry wrapper can pick them up; other statuses are permanent.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{PipelineError, Result};

/// Object storage for raw audio and produced artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Bytes>;
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()>;
}

pub struct HttpBlobStore {
    base_url: String,
    bucket: String,
    token: String,
    client: reqwest::Client,
}

impl HttpBlobStore {
    pub fn new(base_url: &str, bucket: &str, token: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(PipelineError::config("blob store base url is required"));
        }
        if bucket.is_empty() {
            return Err(PipelineError::config("blob store bucket is required"));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        })
    }

    pub(crate) fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.bucket, key)
    }

    fn is_transient(status: reqwest::StatusCode) -> bool {
        status.is_server_error() || status.as_u16() == 429
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| PipelineError::network("blob fetch", e.to_string()))?;

        let status = response.status();
        if Self::is_transient(status) {
            return Err(PipelineError::network(
                "blob fetch",
                format!("HTTP {status} for object `{key}`"),
            ));
        }
        if !status.is_success() {
            return Err(PipelineError::fetch(key, format!("HTTP {status}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| PipelineError::network("blob fetch", e.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let mut request = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .body(data);
        if !content_type.is_empty() {
            request = request.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::network("blob put", e.to_string()))?;

        let status = response.status();
        if Self::is_transient(status) {
            return Err(PipelineError::network(
                "blob put",
                format!("HTTP {status} for object `{key}`"),
            ));
        }
        if !status.is_success() {
            return Err(PipelineError::storage(
                "put_object",
                format!("HTTP {status} for object `{key}`"),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn rejects_missing_configuration() {
        assert!(HttpBlobStore::new("", "bucket", "tok").is_err());
        assert!(HttpBlobStore::new("https://blobs.example.com", "", "tok").is_err());
    }

    #[test]
    fn object_url_joins_bucket_and_key() {
        let store = HttpBlobStore::new("https://blobs.example.com/", "recordings", "tok").unwrap();
        assert_eq!(
            store.object_url("u1/b1/raw-audio/recording.m4a"),
            "https://blobs.example.com/recordings/u1/b1/raw-audio/recording.m4a"
        );
    }

    #[test]
    fn server_errors_classify_as_transient() {
        assert!(HttpBlobStore::is_transient(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert!(HttpBlobStore::is_transient(
            reqwest::StatusCode::TOO_MANY_REQUESTS
        ));
        assert!(!HttpBlobStore::is_transient(reqwest::StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn unreachable_host_surfaces_network_kind() {
        let store = HttpBlobStore::new("http://127.0.0.1:1", "bucket", "tok").unwrap();
        let err = store.fetch("some/key").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
