use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `cancellation` once the user interrupts the process, or returns
/// early if something else cancels it first.
pub async fn detect_interrupt(cancellation: CancellationToken) {
    select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received interrupt"),
                Err(e) => warn!("Failed to listen for interrupt {e:?}"),
            }
            cancellation.cancel();
        },
        _ = cancellation.cancelled() => {},
    };
}
