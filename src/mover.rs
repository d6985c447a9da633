use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::MoveConfig;
use crate::executor::run_batch;
use crate::key_path::{
    KeyPathError, check_destination_collisions, compose_destination_key, validate_move_request,
    validate_movable,
};
use crate::storage::Storage;
use crate::types::error::{S3ToolError, to_item_error};
use crate::types::token::PipelineCancellationToken;
use crate::types::{Acl, OperationResult, TransferStatistics};

/// Moves or renames objects with copy followed by delete.
pub struct ObjectMover {
    storage: Storage,
    config: MoveConfig,
    cancellation_token: PipelineCancellationToken,
}

impl ObjectMover {
    pub fn new(
        storage: Storage,
        config: MoveConfig,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            storage,
            config,
            cancellation_token,
        }
    }

    /// Reject malformed requests as a whole before any object is touched.
    pub fn validate(&self) -> Result<()> {
        self.plan().map(|_| ())
    }

    /// Pair every origin with its destination key.
    ///
    /// Fails on empty input, a malformed request or origin, and on any
    /// destination that would overwrite a key of the same request.
    fn plan(&self) -> Result<Vec<(String, String)>> {
        if self.config.origin_keys.is_empty() {
            return Err(anyhow!(S3ToolError::EmptyInput(
                "You must specify at least one S3 Key".to_string()
            )));
        }

        validate_move_request(
            self.config.destination_path.as_deref(),
            self.config.rename.as_deref(),
            self.config.origin_keys.len(),
        )
        .map_err(|e| anyhow!(S3ToolError::InvalidKeyPath(e)))?;

        let origin_count = self.config.origin_keys.len();
        let moves = self
            .config
            .origin_keys
            .iter()
            .map(|origin| {
                validate_movable(origin)?;
                let destination = compose_destination_key(
                    origin,
                    self.config.destination_path.as_deref(),
                    self.config.rename.as_deref(),
                    origin_count,
                )?;
                Ok((origin.clone(), destination))
            })
            .collect::<Result<Vec<_>, KeyPathError>>()
            .and_then(|moves| check_destination_collisions(&moves).map(|_| moves))
            .map_err(|e| anyhow!(S3ToolError::InvalidKeyPath(e)))?;

        Ok(moves)
    }

    pub async fn move_objects(&self) -> Result<Vec<OperationResult>> {
        let moves = self.plan()?;

        debug!(
            objects = moves.len(),
            acl = %self.config.acl,
            "move has started."
        );

        let storage = self.storage.clone();
        let acl = self.config.acl;
        let results = run_batch(
            moves,
            self.config.worker_size as usize,
            self.cancellation_token.clone(),
            move |(origin, destination)| {
                let storage = storage.clone();
                async move { move_object(&storage, &origin, &destination, acl).await }
            },
        )
        .await;

        Ok(results)
    }
}

/// Copy `origin` to `destination` with `acl`, then delete `origin`.
///
/// A failed delete after a successful copy leaves the object in both
/// places and is reported as [`S3ToolError::PartialMove`].
pub async fn move_object(
    storage: &Storage,
    origin: &str,
    destination: &str,
    acl: Acl,
) -> OperationResult {
    let copied = async {
        storage.head_object(origin).await?;
        storage.copy_object(origin, destination, acl).await
    }
    .await;

    if let Err(e) = copied {
        warn!(origin = origin, destination = destination, "move failed: {e:#}");
        send_item_error(storage, origin).await;
        return OperationResult::Failure(to_item_error(&e));
    }

    if let Err(e) = storage.delete_object(origin).await {
        warn!(
            origin = origin,
            destination = destination,
            "object was copied but the origin could not be deleted: {e:#}"
        );
        send_item_error(storage, origin).await;
        return OperationResult::Failure(S3ToolError::PartialMove {
            origin: origin.to_string(),
            destination: destination.to_string(),
            message: format!("{e:#}"),
        });
    }

    info!(origin = origin, destination = destination, "object has been moved.");
    storage
        .send_stats(TransferStatistics::ItemComplete {
            key: origin.to_string(),
        })
        .await;
    OperationResult::Success(format!("Moved Key: {origin} -> {destination}"))
}

async fn send_item_error(storage: &Storage, key: &str) {
    storage
        .send_stats(TransferStatistics::ItemError {
            key: key.to_string(),
        })
        .await;
}
