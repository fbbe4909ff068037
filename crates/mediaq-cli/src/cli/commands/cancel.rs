//! `mediaq cancel <id>` – cancel a queued or running job.

use anyhow::Result;
use mediaq_core::queue::cancel_in_store;
use mediaq_core::store::JobStore;

use super::resolve_id;
use crate::cli::control_socket::{self, ControlCommand};

/// A running `mediaq run` stops the fetch itself; otherwise the stored job is
/// flipped to `cancelled` directly.
pub async fn run_cancel(store: &dyn JobStore, id: &str) -> Result<()> {
    let id = resolve_id(store, id).await?;
    if !control_socket::try_remote(&ControlCommand::Cancel(id)).await? {
        cancel_in_store(store, id).await?;
    }
    println!("Cancelled job {}", id.short());
    Ok(())
}
