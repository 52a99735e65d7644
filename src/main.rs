use anyhow::Result;
use timestack::{cli::run_cli, utils::runtime::single_thread_runtime};
use tokio::task::LocalSet;
use tracing::error;

fn main() -> Result<()> {
    let runtime = single_thread_runtime()?;
    runtime
        .block_on(LocalSet::new().run_until(run_cli()))
        .inspect_err(|e| {
            error!("Error running cli {e:?}");
        })?;
    Ok(())
}
