use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::PermissionConfig;
use crate::executor::run_two_level;
use crate::lister::list_all_keys;
use crate::storage::Storage;
use crate::types::error::{S3ToolError, to_item_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{Acl, OperationResult, TransferStatistics};

/// Applies a canned ACL to every object under a set of prefixes.
///
/// Prefixes are listed concurrently by an outer pool; the objects of each
/// prefix are then updated by an inner pool. Success is silent, failures
/// are reported one line per object.
pub struct PermissionChanger {
    storage: Storage,
    config: PermissionConfig,
    cancellation_token: PipelineCancellationToken,
}

impl PermissionChanger {
    pub fn new(
        storage: Storage,
        config: PermissionConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancellation_token,
        }
    }

    pub async fn change_permissions(&self) -> Result<Vec<OperationResult>> {
        if self.config.prefixes.is_empty() {
            return Err(anyhow!(S3ToolError::EmptyInput(
                "You must specify at least one S3 Key".to_string()
            )));
        }

        debug!(
            prefixes = self.config.prefixes.len(),
            prefix_worker_size = self.config.prefix_worker_size,
            changer_worker_size = self.config.changer_worker_size,
            acl = %self.config.acl,
            "permission change has started."
        );

        let gather_storage = self.storage.clone();
        let max_keys = self.config.max_keys;
        let change_storage = self.storage.clone();
        let acl = self.config.acl;

        let results = run_two_level(
            self.config.prefixes.clone(),
            self.config.prefix_worker_size as usize,
            self.config.changer_worker_size as usize,
            self.cancellation_token.clone(),
            move |prefix: String| {
                let storage = gather_storage.clone();
                async move {
                    list_all_keys(&storage, &prefix, max_keys)
                        .await
                        .map_err(|e| {
                            warn!(prefix = prefix, "listing for permission change failed: {e:#}");
                            to_item_error(&e)
                        })
                }
            },
            move |key: String| {
                let storage = change_storage.clone();
                async move { change_permission(&storage, &key, acl).await }
            },
        )
        .await;

        Ok(results)
    }
}

pub async fn change_permission(storage: &Storage, key: &str, acl: Acl) -> OperationResult {
    match storage.put_object_acl(key, acl).await {
        Ok(()) => {
            info!(key = key, acl = %acl, "permission has been changed.");
            storage
                .send_stats(TransferStatistics::ItemComplete {
                    key: key.to_string(),
                })
                .await;
            OperationResult::Success(String::new())
        }
        Err(e) => {
            warn!(key = key, acl = %acl, "permission change failed: {e:#}");
            storage
                .send_stats(TransferStatistics::ItemError {
                    key: key.to_string(),
                })
                .await;
            OperationResult::Failure(to_item_error(&e))
        }
    }
}
