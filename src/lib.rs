/*!
# Overview
s3tool-rs runs bulk operations against a single S3 (or S3-compatible) bucket:
listing, uploading, downloading, deleting, moving/renaming and changing the
canned ACL of objects.

Every batch command fans its items out over a bounded worker pool. One item
failing never aborts the others; each item gets exactly one
[`OperationResult`](types::OperationResult), and the command's outcome is
derived from those results.

## As a Library
The s3tool CLI is a thin wrapper over this library.

```no_run
use std::sync::Arc;

use s3tool_rs::config::args::build_config_from_args;
use s3tool_rs::reporting::ReportSink;
use s3tool_rs::safety::StdioConfirmationPort;
use s3tool_rs::storage::create_storage;
use s3tool_rs::{create_pipeline_cancellation_token, run_command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = vec!["s3tool", "--bucket", "my-bucket", "list", "--prefix", "source/"];
    let config = build_config_from_args(args).map_err(anyhow::Error::msg)?;

    let (stats_sender, _stats_receiver) = async_channel::unbounded();
    let storage = create_storage(&config, stats_sender).await;

    run_command(
        &config,
        storage,
        create_pipeline_cancellation_token(),
        &mut ReportSink::stdio(),
        Arc::new(StdioConfirmationPort),
    )
    .await
}
```
*/

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

pub mod config;
pub mod deleter;
pub mod downloader;
pub mod executor;
pub mod key_path;
pub mod lister;
pub mod mover;
pub mod permission;
pub mod reporting;
pub mod safety;
pub mod storage;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use config::args::{CLIArgs, build_config_from_args, parse_from_args};
pub use types::error::{S3ToolError, exit_code_from_error, is_cancelled_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};

use config::CommandConfig;
use deleter::ObjectDeleter;
use downloader::{ObjectDownloader, download_failure_lines};
use lister::ObjectLister;
use mover::ObjectMover;
use permission::PermissionChanger;
use reporting::{BatchSummary, ReportSink, error_line};
use safety::ConfirmationPort;
use storage::Storage;
use uploader::{ObjectUploader, create_upload_list};

/// Run the command selected in `config` and write its result lines to `sink`.
///
/// Structural errors (bad input, invalid configuration) are returned before
/// any item runs. For batch commands, a failed item makes the call return
/// [`S3ToolError::PartialFailure`] after all result lines were written.
pub async fn run_command(
    config: &Config,
    storage: Storage,
    cancellation_token: PipelineCancellationToken,
    sink: &mut ReportSink,
    confirmation_port: Arc<dyn ConfirmationPort>,
) -> Result<()> {
    let command = config.command.name();

    let results = match &config.command {
        CommandConfig::List(list_config) => {
            let lister = ObjectLister::new(
                storage,
                list_config.clone(),
                config.http_prefix.clone(),
                cancellation_token.clone(),
            );
            let emitted = lister.list(sink).await?;
            info!(command = command, entries = emitted, "list finished.");
            return if cancellation_token.is_cancelled() {
                Err(anyhow::anyhow!(S3ToolError::Cancelled))
            } else {
                Ok(())
            };
        }
        CommandConfig::CreateUploadList(upload_list_config) => {
            create_upload_list(upload_list_config).await?;
            return Ok(());
        }
        CommandConfig::Upload(upload_config) => {
            let results = ObjectUploader::new(storage, upload_config.clone(), cancellation_token)
                .upload()
                .await?;
            sink.emit_results(&results, error_line)?;
            results
        }
        CommandConfig::Download(download_config) => {
            let results =
                ObjectDownloader::new(storage, download_config.clone(), cancellation_token)
                    .download()
                    .await?;
            sink.emit_results(&results, download_failure_lines)?;
            results
        }
        CommandConfig::Delete(delete_config) => {
            ObjectDeleter::with_confirmation_port(
                storage,
                delete_config.clone(),
                cancellation_token,
                confirmation_port,
            )
            .delete_and_report(sink)
            .await?
        }
        CommandConfig::Move(move_config) => {
            let results = ObjectMover::new(storage, move_config.clone(), cancellation_token)
                .move_objects()
                .await?;
            sink.emit_results(&results, error_line)?;
            results
        }
        CommandConfig::ChangePermissions(permission_config) => {
            let results =
                PermissionChanger::new(storage, permission_config.clone(), cancellation_token)
                    .change_permissions()
                    .await?;
            sink.emit_results(&results, error_line)?;
            results
        }
    };

    BatchSummary::from_results(&results).finish(command)?;
    Ok(())
}
