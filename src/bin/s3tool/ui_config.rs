// Decides whether the progress line and the final summary are shown.

use s3tool_rs::config::Config;

/// Whether to show the live-updating progress indicator.
///
/// Returns `false` when:
/// - the command is not a batch command (list output goes straight to stdout)
/// - `show_no_progress` is set
/// - Verbosity is above Warn (tracing takes over the terminal)
/// - JSON logging is enabled
pub fn is_progress_indicator_needed(config: &Config) -> bool {
    if !is_show_result_needed(config) {
        return false;
    }

    match &config.tracing_config {
        None => true,
        Some(tracing_config) => log::Level::Warn >= tracing_config.tracing_level,
    }
}

/// Whether to show the final summary line.
pub fn is_show_result_needed(config: &Config) -> bool {
    if config.show_no_progress || !config.command.is_batch() {
        return false;
    }

    config
        .tracing_config
        .as_ref()
        .is_none_or(|tracing_config| !tracing_config.json_tracing)
}
