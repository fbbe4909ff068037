//! `mediaq remove <id>` – remove a job and the files it produced.

use anyhow::Result;
use mediaq_core::queue::delete_in_store;
use mediaq_core::store::JobStore;
use std::path::Path;

use super::resolve_id;
use crate::cli::control_socket::{self, ControlCommand};

/// Outputs are only deleted when they lie under `root`.
pub async fn run_remove(store: &dyn JobStore, root: &Path, id: &str) -> Result<()> {
    let id = resolve_id(store, id).await?;
    if !control_socket::try_remote(&ControlCommand::Delete(id)).await? {
        delete_in_store(store, root, id).await?;
    }
    println!("Removed job {}", id.short());
    Ok(())
}
