// Cancels the running command on Ctrl+C.
//
// Items already running finish; items not yet started are reported as
// cancelled.

use s3tool_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received, waiting for running items to finish.");
                cancellation_token.cancel();
            }
        }
    })
}
