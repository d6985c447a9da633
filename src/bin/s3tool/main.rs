use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace};

use s3tool_rs::config::Config;
use s3tool_rs::reporting::ReportSink;
use s3tool_rs::safety::StdioConfirmationPort;
use s3tool_rs::storage::create_storage;
use s3tool_rs::{
    CLIArgs, S3ToolError, create_pipeline_cancellation_token, exit_code_from_error,
    is_cancelled_error, run_command,
};

mod ctrl_c_handler;
pub mod indicator;
mod tracing_init;
pub mod ui_config;

/// s3tool - Bulk operations on a single S3 bucket.
///
/// This binary is a thin wrapper over the s3tool-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3tool",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Run the configured command and map its outcome to a process exit code.
async fn run(config: Config) -> i32 {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!(command = config.command.name(), "s3tool start.");

    let (stats_sender, stats_receiver) = async_channel::unbounded();
    let storage = create_storage(&config, stats_sender).await;
    let indicator_join_handle = indicator::show_indicator(
        stats_receiver,
        ui_config::is_progress_indicator_needed(&config),
        ui_config::is_show_result_needed(&config),
    );

    // The storage owns the last stats sender, so the indicator finishes once
    // the command returns.
    let result = run_command(
        &config,
        storage,
        cancellation_token,
        &mut ReportSink::stdio(),
        Arc::new(StdioConfirmationPort),
    )
    .await;

    if let Err(e) = indicator_join_handle.await {
        error!("progress indicator failed: {e}");
    }

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    match result {
        Ok(()) => {
            debug!(duration_sec = duration_sec, "s3tool has been completed.");
            0
        }
        Err(e) if is_cancelled_error(&e) => {
            debug!(duration_sec = duration_sec, "s3tool cancelled by user.");
            exit_code_from_error(&e)
        }
        Err(e) => {
            let partial_failure = matches!(
                e.downcast_ref::<S3ToolError>(),
                Some(S3ToolError::PartialFailure { .. })
            );
            // Per-item failures were already written by the command.
            if !partial_failure {
                eprintln!("{e:#}");
            }
            error!(duration_sec = duration_sec, "s3tool failed: {e:#}");
            exit_code_from_error(&e)
        }
    }
}
