use anyhow::Result;

/// Tracking runs on a single thread, handles shared with the UI are not `Send`.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
