pub mod client_builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Grantee, ObjectCannedAcl};
use aws_smithy_runtime_api::http::Response;
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_smithy_types_convert::date_time::DateTimeExt;
use futures::TryStreamExt;
use http_body::Frame;
use http_body_util::StreamBody;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};
use urlencoding::encode;

use crate::config::Config;
use crate::storage::{Storage, StorageFactory, StorageTrait};
use crate::types::error::S3ToolError;
use crate::types::{
    Acl, Grant, ListEntry, ListPage, ListRequest, ObjectAcl, ObjectMetadata, ObjectOwner,
    ObjectSummary, TransferStatistics,
};

/// Read size of the upload body stream and granularity of upload progress.
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors (S3 API responses), returns the S3 error code
/// (e.g. "AccessDenied", "NoSuchKey") and the error message from the
/// response. For other error types (network, timeout, construction failure),
/// returns "N/A" as the code and the full error description as the message.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E, Response<SdkBody>>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

/// HeadObject reports a bare 404 without a code, the other calls use
/// `NoSuchKey`. Both mean the object does not exist.
fn is_not_found_sdk_error<E: ProvideErrorMetadata>(e: &SdkError<E, Response<SdkBody>>) -> bool {
    if let SdkError::ServiceError(service_err) = e {
        if matches!(service_err.err().code(), Some("NoSuchKey" | "NotFound")) {
            return true;
        }
        if service_err.raw().status().as_u16() == 404 {
            return true;
        }
    }
    false
}

pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(config: &Config, stats_sender: Sender<TransferStatistics>) -> Storage {
        let client = if let Some(ref client_config) = config.client_config {
            Some(Arc::new(client_config.create_client().await))
        } else {
            None
        };

        Box::new(S3Storage {
            bucket: config.bucket.clone(),
            client,
            stats_sender,
        })
    }
}

/// `aws-sdk-s3` backed implementation of [`StorageTrait`].
#[derive(Clone)]
struct S3Storage {
    bucket: String,
    client: Option<Arc<Client>>,
    stats_sender: Sender<TransferStatistics>,
}

impl S3Storage {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_deref()
            .ok_or_else(|| anyhow!(S3ToolError::InvalidConfig("S3 client is not configured.".to_string())))
    }

    fn not_found(&self, key: &str, operation: &str) -> anyhow::Error {
        debug!(
            bucket = self.bucket,
            key = key,
            "S3 {} reported that s3://{}/{} does not exist.",
            operation,
            self.bucket,
            key
        );
        anyhow!(S3ToolError::NotFound {
            key: key.to_string()
        })
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list_objects(
        &self,
        request: &ListRequest,
        continuation_token: Option<String>,
    ) -> Result<ListPage> {
        let output = self
            .client()?
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&request.prefix)
            .set_delimiter(request.delimiter.clone())
            .set_continuation_token(continuation_token)
            .max_keys(request.max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    prefix = request.prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    request.prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        let mut entries: Vec<ListEntry> = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ListEntry::Object(ObjectSummary {
                    key: key.to_string(),
                    size: object.size().unwrap_or_default().max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|last_modified| last_modified.to_chrono_utc().ok()),
                }))
            })
            .collect();
        entries.extend(
            output
                .common_prefixes()
                .iter()
                .filter_map(|common_prefix| common_prefix.prefix())
                .map(|prefix| ListEntry::CommonPrefix(prefix.to_string())),
        );
        entries.sort_by(|a, b| a.key().cmp(b.key()));

        let next_continuation_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata> {
        let output = self
            .client()?
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found_sdk_error(&e) {
                    return self.not_found(key, "HeadObject");
                }
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 HeadObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::head_object() failed.")
            })?;

        Ok(ObjectMetadata {
            key: key.to_string(),
            size: output.content_length().unwrap_or_default().max(0) as u64,
            content_type: output.content_type().map(String::from),
            last_modified: output
                .last_modified()
                .and_then(|last_modified| last_modified.to_chrono_utc().ok()),
        })
    }

    async fn get_object_acl(&self, key: &str) -> Result<ObjectAcl> {
        let output = self
            .client()?
            .get_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found_sdk_error(&e) {
                    return self.not_found(key, "GetObjectAcl");
                }
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectAcl API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::get_object_acl() failed.")
            })?;

        let owner = output.owner().map(|owner| ObjectOwner {
            display_name: owner.display_name().map(String::from),
            id: owner.id().map(String::from),
        });
        let grants = output
            .grants()
            .iter()
            .map(|grant| Grant {
                grantee: grant.grantee().map(describe_grantee).unwrap_or_default(),
                permission: grant
                    .permission()
                    .map(|permission| permission.as_str().to_string())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(ObjectAcl { owner, grants })
    }

    async fn put_object_acl(&self, key: &str, acl: Acl) -> Result<()> {
        self.client()?
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl))
            .send()
            .await
            .map_err(|e| {
                if is_not_found_sdk_error(&e) {
                    return self.not_found(key, "PutObjectAcl");
                }
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                warn!(
                    bucket = self.bucket,
                    key = key,
                    acl = acl.as_str(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObjectAcl API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object_acl() failed.")
            })?;

        Ok(())
    }

    async fn get_object(&self, key: &str, destination: &Path) -> Result<u64> {
        let mut output = self
            .client()?
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found_sdk_error(&e) {
                    return self.not_found(key, "GetObject");
                }
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::get_object() failed.")
            })?;

        let mut file = tokio::fs::File::create(destination)
            .await
            .with_context(|| format!("failed to create {}", destination.display()))?;

        let written: Result<u64> = async {
            let mut written = 0u64;
            while let Some(bytes) = output
                .body
                .try_next()
                .await
                .context("aws_sdk_s3::primitives::ByteStream::try_next() failed.")?
            {
                file.write_all(&bytes)
                    .await
                    .with_context(|| format!("failed to write {}", destination.display()))?;
                written += bytes.len() as u64;
                self.send_stats(TransferStatistics::TransferBytes {
                    key: key.to_string(),
                    bytes: bytes.len() as u64,
                })
                .await;
            }
            file.flush().await?;
            Ok(written)
        }
        .await;

        if written.is_err() {
            drop(file);
            let _ = tokio::fs::remove_file(destination).await;
        }

        written
    }

    async fn put_object(
        &self,
        key: &str,
        source: &Path,
        size: u64,
        content_type: Option<String>,
        acl: Acl,
    ) -> Result<u64> {
        let body = progress_body(
            source.to_path_buf(),
            key.to_string(),
            self.stats_sender.clone(),
        );

        self.client()?
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .set_content_type(content_type)
            .acl(ObjectCannedAcl::from(acl))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    key = key,
                    source = %source.display(),
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object() failed.")
            })?;

        Ok(size)
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str, acl: Acl) -> Result<()> {
        self.client()?
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, encode(source_key)))
            .key(destination_key)
            .acl(ObjectCannedAcl::from(acl))
            .send()
            .await
            .map_err(|e| {
                if is_not_found_sdk_error(&e) {
                    return self.not_found(source_key, "CopyObject");
                }
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                error!(
                    bucket = self.bucket,
                    source_key = source_key,
                    destination_key = destination_key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CopyObject API call failed for s3://{}/{} -> {}: {} ({}).",
                    self.bucket,
                    source_key,
                    destination_key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::copy_object() failed.")
            })?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client()?
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                warn!(
                    bucket = self.bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObject API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::delete_object() failed.")
            })?;

        Ok(())
    }

    fn get_client(&self) -> Option<Arc<Client>> {
        self.client.clone()
    }

    async fn send_stats(&self, stats: TransferStatistics) {
        let _ = self.stats_sender.send(stats).await;
    }
}

/// `Type:identifier` of an ACL grantee.
fn describe_grantee(grantee: &Grantee) -> String {
    let identifier = grantee
        .id()
        .or(grantee.uri())
        .or(grantee.email_address())
        .unwrap_or("-");
    format!("{}:{}", grantee.r#type().as_str(), identifier)
}

/// Build a retryable upload body that streams `path` from disk and reports
/// every chunk it hands to the HTTP client.
///
/// The file is reopened on each retry attempt, so progress for a retried
/// request is reported again from zero.
fn progress_body(
    path: PathBuf,
    key: String,
    stats_sender: Sender<TransferStatistics>,
) -> ByteStream {
    let body = SdkBody::retryable(move || {
        let file = match std::fs::File::open(&path) {
            Ok(file) => tokio::fs::File::from_std(file),
            Err(e) => {
                error!(
                    key = key,
                    path = %path.display(),
                    "failed to open upload source: {e}"
                );
                return SdkBody::taken();
            }
        };

        let key = key.clone();
        let stats_sender = stats_sender.clone();
        let stream = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE).map_ok(move |bytes| {
            let _ = stats_sender.try_send(TransferStatistics::TransferBytes {
                key: key.clone(),
                bytes: bytes.len() as u64,
            });
            Frame::data(bytes)
        });

        SdkBody::from_body_1_x(StreamBody::new(stream))
    });

    ByteStream::new(body)
}
