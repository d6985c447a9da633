//! Delete policy.
//!
//! Every key is checked for a safe shape, optionally confirmed by the user,
//! checked for existence and then deleted. A key that fails any step fails
//! alone; the rest of the batch carries on.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::DeleteConfig;
use crate::executor::run_batch;
use crate::key_path::validate_deletable;
use crate::reporting::{ReportSink, error_line};
use crate::safety::{ConfirmationPort, StdioConfirmationPort, delete_prompt};
use crate::storage::Storage;
use crate::types::error::{S3ToolError, to_item_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{OperationResult, TransferStatistics};


pub const DECLINED_MESSAGE: &str = "Got cold feet?";

/// Deletes a list of keys on a bounded worker pool.
pub struct ObjectDeleter {
    storage: Storage,
    config: DeleteConfig,
    confirmation_port: Arc<dyn ConfirmationPort>,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectDeleter {
    /// Create an ObjectDeleter that confirms through stdin/stdout.
    pub fn new(
        storage: Storage,
        config: DeleteConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self::with_confirmation_port(
            storage,
            config,
            cancellation_token,
            Arc::new(StdioConfirmationPort),
        )
    }

    pub fn with_confirmation_port(
        storage: Storage,
        config: DeleteConfig,
        cancellation_token: PipelineCancellationToken,
        confirmation_port: Arc<dyn ConfirmationPort>,
    ) -> Self {
        Self {
            storage,
            config,
            confirmation_port,
            cancellation_token,
        }
    }

    /// The prompt reads a single shared input stream, so it only runs with
    /// one worker.
    pub fn is_prompt_enabled(&self) -> bool {
        self.config.prompt && self.config.worker_size <= 1
    }

    pub async fn delete(&self) -> Result<Vec<OperationResult>> {
        let confirmation_port = self.start()?;

        let storage = self.storage.clone();
        let results = run_batch(
            self.config.keys.clone(),
            self.config.worker_size as usize,
            self.cancellation_token.clone(),
            move |key| {
                let storage = storage.clone();
                let confirmation_port = confirmation_port.clone();
                async move { delete_key(&storage, &key, confirmation_port).await }
            },
        )
        .await;

        Ok(results)
    }

    /// Delete every key and write the result lines to `sink`.
    ///
    /// With the prompt enabled each key's line is written as soon as the key
    /// is done, before the next question is asked. Otherwise the lines are
    /// written in input order once the batch has finished.
    pub async fn delete_and_report(&self, sink: &mut ReportSink) -> Result<Vec<OperationResult>> {
        if !self.is_prompt_enabled() {
            let results = self.delete().await?;
            sink.emit_results(&results, error_line)?;
            return Ok(results);
        }

        let confirmation_port = self.start()?;
        let mut results = Vec::with_capacity(self.config.keys.len());
        for key in &self.config.keys {
            let result = if self.cancellation_token.is_cancelled() {
                OperationResult::Failure(S3ToolError::Cancelled)
            } else {
                delete_key(&self.storage, key, confirmation_port.clone()).await
            };
            sink.emit_results(std::slice::from_ref(&result), error_line)?;
            results.push(result);
        }

        Ok(results)
    }

    /// Check the input and pick the confirmation port for this run.
    fn start(&self) -> Result<Option<Arc<dyn ConfirmationPort>>> {
        if self.config.keys.is_empty() {
            return Err(anyhow!(S3ToolError::EmptyInput(
                "No files provided".to_string()
            )));
        }

        if self.config.prompt && !self.is_prompt_enabled() {
            warn!(
                worker_size = self.config.worker_size,
                "confirmation prompt is disabled when deleting with more than one thread."
            );
        }

        let confirmation_port = if self.is_prompt_enabled() {
            Some(self.confirmation_port.clone())
        } else {
            None
        };

        debug!(
            keys = self.config.keys.len(),
            prompt = confirmation_port.is_some(),
            "delete has started."
        );

        Ok(confirmation_port)
    }
}

/// Delete a single key.
///
/// With a confirmation port the user is asked first; declining yields
/// [`OperationResult::Aborted`]. The object must exist: S3 reports success
/// for deleting a missing key, so existence is checked beforehand.
pub async fn delete_key(
    storage: &Storage,
    key: &str,
    confirmation_port: Option<Arc<dyn ConfirmationPort>>,
) -> OperationResult {
    if let Err(e) = validate_deletable(key) {
        warn!(key = key, "refusing to delete: {e}");
        storage
            .send_stats(TransferStatistics::ItemError {
                key: key.to_string(),
            })
            .await;
        return OperationResult::Failure(S3ToolError::InvalidKeyPath(e));
    }

    if let Some(confirmation_port) = confirmation_port {
        let message = delete_prompt(key);
        let answer = tokio::task::spawn_blocking(move || confirmation_port.ask(&message)).await;
        match answer {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                info!(key = key, "deletion declined by user.");
                storage
                    .send_stats(TransferStatistics::ItemSkip {
                        key: key.to_string(),
                    })
                    .await;
                return OperationResult::Aborted(DECLINED_MESSAGE.to_string());
            }
            Ok(Err(e)) => return OperationResult::Failure(to_item_error(&e)),
            Err(e) => return OperationResult::Failure(S3ToolError::Worker(e.to_string())),
        }
    }

    let deleted = async {
        storage.head_object(key).await?;
        storage.delete_object(key).await
    }
    .await;

    match deleted {
        Ok(()) => {
            info!(key = key, "object has been deleted.");
            storage
                .send_stats(TransferStatistics::ItemComplete {
                    key: key.to_string(),
                })
                .await;
            OperationResult::Success(format!("Deleted Key: {key}"))
        }
        Err(e) => {
            warn!(key = key, "delete failed: {e:#}");
            storage
                .send_stats(TransferStatistics::ItemError {
                    key: key.to_string(),
                })
                .await;
            OperationResult::Failure(to_item_error(&e))
        }
    }
}
