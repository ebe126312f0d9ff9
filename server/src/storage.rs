use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use pagemark_shared::{decode_snapshot, encode_snapshot, DocumentSnapshot};

use crate::error::StorageError;

/// Durable home of per-document snapshots. `load` returns `None` for documents
/// nobody has written to yet.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self, document_id: &str) -> Result<Option<DocumentSnapshot>, StorageError>;
    async fn save(&self, document_id: &str, data: &DocumentSnapshot) -> Result<(), StorageError>;
}

fn decode(key: &str, payload: &[u8]) -> Result<DocumentSnapshot, StorageError> {
    decode_snapshot(payload).map_err(|error| StorageError::Corrupt {
        key: key.to_string(),
        reason: error.to_string(),
    })
}

pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn path(&self, document_id: &str) -> PathBuf {
        self.data_dir.join(format!("{document_id}.bin"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load(&self, document_id: &str) -> Result<Option<DocumentSnapshot>, StorageError> {
        let payload = match tokio::fs::read(self.path(document_id)).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: document_id.to_string(),
                    source,
                })
            }
        };
        decode(document_id, &payload).map(Some)
    }

    async fn save(&self, document_id: &str, data: &DocumentSnapshot) -> Result<(), StorageError> {
        let path = self.path(document_id);
        let staging = path.with_extension("bin.tmp");
        let io = |source| StorageError::Io {
            key: document_id.to_string(),
            source,
        };
        tokio::fs::write(&staging, encode_snapshot(data))
            .await
            .map_err(io)?;
        tokio::fs::rename(&staging, &path).await.map_err(io)
    }
}

#[derive(Clone, Debug)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3StorageConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

pub struct S3Storage {
    bucket: String,
    prefix: String,
    client: Client,
}

impl S3Storage {
    pub async fn new(config: S3StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let (Some(access_key_id), Some(secret_access_key)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) {
            let creds = Credentials::new(access_key_id, secret_access_key, None, None, "static");
            loader = loader.credentials_provider(creds);
        }
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint_url) = config.endpoint_url.as_ref() {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        Self {
            bucket: config.bucket,
            prefix: object_prefix(config.prefix),
            client,
        }
    }

    fn object_key(&self, document_id: &str) -> String {
        object_key(&self.prefix, document_id)
    }
}

fn object_prefix(prefix: Option<String>) -> String {
    prefix.unwrap_or_default().trim_matches('/').to_string()
}

fn object_key(prefix: &str, document_id: &str) -> String {
    if prefix.is_empty() {
        format!("{document_id}.bin")
    } else {
        format!("{prefix}/{document_id}.bin")
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn load(&self, document_id: &str) -> Result<Option<DocumentSnapshot>, StorageError> {
        let key = self.object_key(document_id);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;
        let output = match response {
            Ok(output) => output,
            Err(error) => {
                if error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_no_such_key())
                {
                    return Ok(None);
                }
                return Err(StorageError::S3 {
                    key,
                    reason: format!("{error:?}"),
                });
            }
        };
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|error| StorageError::S3 {
                key: key.clone(),
                reason: format!("{error:?}"),
            })?
            .into_bytes();
        decode(&key, &bytes).map(Some)
    }

    async fn save(&self, document_id: &str, data: &DocumentSnapshot) -> Result<(), StorageError> {
        let key = self.object_key(document_id);
        let body = ByteStream::from(encode_snapshot(data));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|error| StorageError::S3 {
                key: key.clone(),
                reason: format!("{error:?}"),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagemark_shared::UserSnapshot;

    fn snapshot() -> DocumentSnapshot {
        DocumentSnapshot {
            document_id: "doc-1".into(),
            users: vec![UserSnapshot {
                user_id: "reader".into(),
                in_reading_set: true,
                ..UserSnapshot::default()
            }],
        }
    }

    #[tokio::test]
    async fn file_storage_round_trips_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.load("doc-1").await.unwrap(), None);

        storage.save("doc-1", &snapshot()).await.unwrap();
        assert_eq!(storage.load("doc-1").await.unwrap(), Some(snapshot()));
        assert!(!dir.path().join("doc-1.bin.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("doc-1.bin"), b"nope").unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.load("doc-1").await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn object_keys_respect_the_prefix() {
        assert_eq!(object_prefix(Some("/backups/".into())), "backups");
        assert_eq!(object_key("backups", "doc-1"), "backups/doc-1.bin");
        assert_eq!(object_key("", "doc-1"), "doc-1.bin");
    }
}
