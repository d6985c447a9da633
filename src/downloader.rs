use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::executor::run_batch;
use crate::key_path::{KeyPathError, basename};
use crate::lister::list_folder_keys;
use crate::reporting::{ReportLine, error_line};
use crate::storage::Storage;
use crate::types::error::{S3ToolError, to_item_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{OperationResult, TransferStatistics};

/// Downloads objects into a local directory, one file per key.
pub struct ObjectDownloader {
    storage: Storage,
    config: DownloadConfig,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectDownloader {
    pub fn new(
        storage: Storage,
        config: DownloadConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancellation_token,
        }
    }

    /// Explicit keys followed by every object under the recursive prefix.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = self.config.keys.clone();
        if let Some(prefix) = &self.config.recursive_prefix {
            keys.extend(list_folder_keys(&self.storage, prefix, self.config.max_keys).await?);
        }
        Ok(keys)
    }

    pub async fn download(&self) -> Result<Vec<OperationResult>> {
        if self.config.keys.is_empty() && self.config.recursive_prefix.is_none() {
            return Err(anyhow!(S3ToolError::EmptyInput(
                "You must specify at least one S3 Key".to_string()
            )));
        }
        if !tokio::fs::metadata(&self.config.download_path)
            .await
            .map(|metadata| metadata.is_dir())
            .unwrap_or(false)
        {
            return Err(anyhow!(S3ToolError::InvalidConfig(format!(
                "download path is not a directory: {}",
                self.config.download_path.display()
            ))));
        }

        let keys = self.keys().await?;
        debug!(
            keys = keys.len(),
            download_path = %self.config.download_path.display(),
            "download has started."
        );

        let storage = self.storage.clone();
        let download_path = self.config.download_path.clone();
        let results = run_batch(
            keys,
            self.config.worker_size as usize,
            self.cancellation_token.clone(),
            move |key| {
                let storage = storage.clone();
                let download_path = download_path.clone();
                async move { download_object(&storage, &key, &download_path).await }
            },
        )
        .await;

        Ok(results)
    }
}

static PART_FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Hidden sibling of `destination` that receives the body until it is complete.
fn part_file_path(download_path: &Path, file_name: &str) -> PathBuf {
    let sequence = PART_FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    download_path.join(format!(".{file_name}.{}.{sequence}.part", std::process::id()))
}

/// Download one object to `download_path/<basename of key>`.
///
/// The object's existence is checked before any local file is created. The
/// body is written to a part file that is renamed over the destination only
/// once the transfer completes, so a failed transfer never touches an
/// existing file of the same name.
pub async fn download_object(storage: &Storage, key: &str, download_path: &Path) -> OperationResult {
    let file_name = basename(key);
    if file_name.is_empty() {
        return OperationResult::Failure(S3ToolError::InvalidKeyPath(
            KeyPathError::MissingFileName {
                path: key.to_string(),
            },
        ));
    }

    let metadata = match storage.head_object(key).await {
        Ok(metadata) => metadata,
        Err(e) => return download_failed(storage, key, &e).await,
    };

    let destination: PathBuf = download_path.join(file_name);
    storage
        .send_stats(TransferStatistics::TransferStart {
            key: key.to_string(),
            total_bytes: metadata.size,
        })
        .await;

    let part_file = part_file_path(download_path, file_name);
    let transfer = match storage.get_object(key, &part_file).await {
        Ok(written) => tokio::fs::rename(&part_file, &destination)
            .await
            .with_context(|| format!("failed to rename {}", part_file.display()))
            .map(|_| written),
        Err(e) => Err(e),
    };

    match transfer {
        Ok(written) => {
            info!(
                key = key,
                destination = %destination.display(),
                size = written,
                "download completed."
            );
            storage
                .send_stats(TransferStatistics::TransferComplete {
                    key: key.to_string(),
                })
                .await;
            storage
                .send_stats(TransferStatistics::ItemComplete {
                    key: key.to_string(),
                })
                .await;
            OperationResult::Success(format!(
                "Downloaded Key: {key} -> {}",
                destination.display()
            ))
        }
        Err(e) => {
            if tokio::fs::remove_file(&part_file).await.is_ok() {
                debug!(
                    part_file = %part_file.display(),
                    "partially downloaded file has been removed."
                );
            }
            download_failed(storage, key, &e).await
        }
    }
}

async fn download_failed(storage: &Storage, key: &str, e: &anyhow::Error) -> OperationResult {
    warn!(key = key, "download failed: {e:#}");
    storage
        .send_stats(TransferStatistics::ItemError {
            key: key.to_string(),
        })
        .await;

    let error = match to_item_error(e) {
        S3ToolError::Storage(message) => S3ToolError::Transfer {
            key: key.to_string(),
            message,
        },
        error => error,
    };
    OperationResult::Failure(error)
}

/// `Error downloading -> {key}` on stdout, the cause on stderr.
pub fn download_failure_lines(e: &S3ToolError) -> Vec<ReportLine> {
    match e {
        S3ToolError::NotFound { key } | S3ToolError::Transfer { key, .. } => vec![
            ReportLine::Out(format!("Error downloading -> {key}")),
            ReportLine::Err(e.to_string()),
        ],
        _ => error_line(e),
    }
}
