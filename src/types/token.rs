/// A cancellation token used to stop dispatching batch items.
///
/// This is a type alias for [`tokio_util::sync::CancellationToken`]. Pass the
/// token to a command and call
/// [`cancel()`](tokio_util::sync::CancellationToken::cancel) on it (e.g., in a
/// Ctrl+C handler). Items that have not started yet are reported as cancelled;
/// items already running finish and are joined.
pub type PipelineCancellationToken = tokio_util::sync::CancellationToken;

/// Create a new [`PipelineCancellationToken`].
///
/// # Example
///
/// ```
/// use s3tool_rs::create_pipeline_cancellation_token;
///
/// let token = create_pipeline_cancellation_token();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub fn create_pipeline_cancellation_token() -> PipelineCancellationToken {
    tokio_util::sync::CancellationToken::new()
}
