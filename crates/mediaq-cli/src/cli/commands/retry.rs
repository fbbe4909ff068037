//! `mediaq retry <id>` – queue a failed or cancelled job again.

use anyhow::Result;
use mediaq_core::queue::requeue_in_store;
use mediaq_core::store::JobStore;

use super::resolve_id;
use crate::cli::control_socket::{self, ControlCommand};

pub async fn run_retry(store: &dyn JobStore, id: &str) -> Result<()> {
    let id = resolve_id(store, id).await?;
    if control_socket::try_remote(&ControlCommand::Retry(id)).await? {
        println!("Requeued job {} in the running queue", id.short());
    } else {
        requeue_in_store(store, id).await?;
        println!("Requeued job {}; run `mediaq run` to process it", id.short());
    }
    Ok(())
}
