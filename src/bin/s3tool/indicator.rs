// Progress indicator for batch commands.
//
// Reads TransferStatistics from an async channel and keeps a single status
// line on stderr, so result lines on stdout stay clean.

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};
use s3tool_rs::types::TransferStatistics;
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Totals returned by [`show_indicator`] after the stats channel closes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndicatorSummary {
    pub total_complete_count: u64,
    pub total_error_count: u64,
    pub total_skip_count: u64,
    pub total_transfer_bytes: u64,
    pub total_expected_bytes: u64,
}

impl IndicatorSummary {
    fn apply(&mut self, stats: TransferStatistics) -> u64 {
        match stats {
            TransferStatistics::TransferStart { total_bytes, .. } => {
                self.total_expected_bytes += total_bytes;
            }
            TransferStatistics::TransferBytes { bytes, .. } => {
                self.total_transfer_bytes += bytes;
                return bytes;
            }
            TransferStatistics::TransferComplete { .. } => {}
            TransferStatistics::ItemComplete { .. } => self.total_complete_count += 1,
            TransferStatistics::ItemSkip { .. } => self.total_skip_count += 1,
            TransferStatistics::ItemError { .. } => self.total_error_count += 1,
        }
        0
    }
}

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;

/// Spawn a task that tallies statistics and renders progress.
///
/// The task runs until every sender of `stats_receiver` is dropped; await
/// the handle after the command finishes.
pub fn show_indicator(
    stats_receiver: Receiver<TransferStatistics>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<IndicatorSummary> {
    let progress_text = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();
        let mut ma_transfer_bytes = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut summary = IndicatorSummary::default();

        loop {
            let mut period_bytes: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    period_bytes += summary.apply(stats);
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    let elapsed = start_time.elapsed();
                    let elapsed_secs_f64 = elapsed.as_secs_f64();

                    let bytes_per_sec = if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                        summary.total_transfer_bytes
                    } else {
                        (summary.total_transfer_bytes as f64 / elapsed_secs_f64) as u64
                    };

                    info!(
                        message = "transfer summary",
                        completed_objects = summary.total_complete_count,
                        skipped = summary.total_skip_count,
                        error = summary.total_error_count,
                        transferred_bytes = summary.total_transfer_bytes,
                        transferred_bytes_per_sec = bytes_per_sec,
                        duration_sec = elapsed_secs_f64,
                    );

                    if show_result {
                        if let Ok(style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(style);
                        }
                        progress_text.finish_with_message(format!(
                            "completed {:>3} objects,  skipped {} objects,  error {} objects,  transferred {:>3} | {:>3}/sec,  duration {}",
                            HumanCount(summary.total_complete_count),
                            summary.total_skip_count,
                            summary.total_error_count,
                            HumanBytes(summary.total_transfer_bytes),
                            HumanBytes(bytes_per_sec),
                            HumanDuration(elapsed),
                        ));
                    } else {
                        progress_text.finish_and_clear();
                    }

                    return summary;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(0.05)).await;
            }

            ma_transfer_bytes.add_sample(period_bytes);

            if show_progress {
                progress_text.set_message(format!(
                    "completed {:>3} objects,  skipped {} objects,  error {} objects,  transferred {:>3} of {:>3} | {:>3}/sec",
                    HumanCount(summary.total_complete_count),
                    summary.total_skip_count,
                    summary.total_error_count,
                    HumanBytes(summary.total_transfer_bytes),
                    HumanBytes(summary.total_expected_bytes),
                    HumanBytes(ma_transfer_bytes.get_average()),
                ));
            }
        }
    })
}
