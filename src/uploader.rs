use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::{UploadConfig, UploadListConfig};
use crate::executor::run_batch;
use crate::key_path::upload_key;
use crate::storage::Storage;
use crate::types::error::{S3ToolError, to_item_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{Acl, OperationResult, TransferStatistics};

/// File written by [`create_upload_list`] inside the output directory.
pub const UPLOAD_LIST_FILE_NAME: &str = "upload.txt";
const UPLOAD_LIST_SEPARATOR: &str = ",";

/// Uploads local files under a key prefix, one object per file.
pub struct ObjectUploader {
    storage: Storage,
    config: UploadConfig,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectUploader {
    pub fn new(
        storage: Storage,
        config: UploadConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancellation_token,
        }
    }

    /// Every source file: the explicit paths first, then the list file's.
    pub async fn sources(&self) -> Result<Vec<PathBuf>> {
        let mut sources = self.config.files.clone();
        if let Some(list_path) = &self.config.from_list {
            let content = tokio::fs::read_to_string(list_path)
                .await
                .with_context(|| format!("failed to read upload list {}", list_path.display()))?;
            sources.extend(parse_upload_list(&content));
        }
        Ok(sources)
    }

    pub async fn upload(&self) -> Result<Vec<OperationResult>> {
        let sources = self.sources().await?;
        if sources.is_empty() {
            return Err(anyhow!(S3ToolError::EmptyInput(
                "No files provided".to_string()
            )));
        }

        debug!(
            files = sources.len(),
            upload_path = self.config.upload_path,
            acl = self.config.acl.as_str(),
            "upload has started."
        );

        let storage = self.storage.clone();
        let upload_path = self.config.upload_path.clone();
        let acl = self.config.acl;
        let results = run_batch(
            sources,
            self.config.worker_size as usize,
            self.cancellation_token.clone(),
            move |source| {
                let storage = storage.clone();
                let upload_path = upload_path.clone();
                async move { upload_file(&storage, &source, &upload_path, acl).await }
            },
        )
        .await;

        Ok(results)
    }
}

/// Upload one file to `upload_path/<file name>` with the given canned ACL.
pub async fn upload_file(
    storage: &Storage,
    source: &Path,
    upload_path: &str,
    acl: Acl,
) -> OperationResult {
    let source_display = source.display().to_string();

    let size = match tokio::fs::metadata(source).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => {
            warn!(path = source_display, "upload source is not a regular file.");
            storage
                .send_stats(TransferStatistics::ItemError {
                    key: source_display.clone(),
                })
                .await;
            return OperationResult::Failure(S3ToolError::FileNotFound {
                path: source_display,
            });
        }
    };

    let key = match upload_key(upload_path, source) {
        Ok(key) => key,
        Err(e) => return OperationResult::Failure(S3ToolError::InvalidKeyPath(e)),
    };
    let content_type = mime_guess::from_path(source)
        .first_raw()
        .map(str::to_string);

    storage
        .send_stats(TransferStatistics::TransferStart {
            key: key.clone(),
            total_bytes: size,
        })
        .await;

    match storage
        .put_object(&key, source, size, content_type, acl)
        .await
    {
        Ok(_) => {
            info!(
                path = source_display,
                key = key,
                size = size,
                "upload completed."
            );
            storage
                .send_stats(TransferStatistics::TransferComplete { key: key.clone() })
                .await;
            storage
                .send_stats(TransferStatistics::ItemComplete { key: key.clone() })
                .await;
            OperationResult::Success(format!("Uploaded Key: {key}"))
        }
        Err(e) => {
            warn!(path = source_display, key = key, "upload failed: {e:#}");
            storage
                .send_stats(TransferStatistics::ItemError { key: key.clone() })
                .await;
            OperationResult::Failure(to_item_error(&e))
        }
    }
}

/// Parse the content of an upload list file.
///
/// Entries are separated by commas; surrounding whitespace and double
/// quotes are stripped and empty entries ignored.
pub fn parse_upload_list(content: &str) -> Vec<PathBuf> {
    content
        .split(UPLOAD_LIST_SEPARATOR)
        .map(|entry| entry.trim().trim_matches('"').trim())
        .filter(|entry| !entry.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Scan `files_path` (not recursively) for files with the configured
/// extension and write their absolute paths to `output_path/upload.txt`.
///
/// Returns the path of the written list.
pub async fn create_upload_list(config: &UploadListConfig) -> Result<PathBuf> {
    let extension = config.file_extension.trim_start_matches('.');

    let mut entries = tokio::fs::read_dir(&config.files_path)
        .await
        .with_context(|| format!("failed to read directory {}", config.files_path.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let absolute = tokio::fs::canonicalize(&path)
            .await
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        files.push(absolute.display().to_string());
    }
    files.sort();

    let output = config.output_path.join(UPLOAD_LIST_FILE_NAME);
    tokio::fs::write(&output, files.join(UPLOAD_LIST_SEPARATOR))
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        files = files.len(),
        output = %output.display(),
        "upload list has been created."
    );

    Ok(output)
}
