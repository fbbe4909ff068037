//! `mediaq doctor` – tool versions and file locations.

use anyhow::Result;
use mediaq_core::config::{self, MediaqConfig};
use mediaq_core::fetch::probe_version;
use mediaq_core::logging;
use mediaq_core::queue::default_control_socket_path;
use mediaq_core::security::free_space;
use mediaq_core::store::default_db_path;
use std::path::Path;

/// Exits with an error when either external tool is missing.
pub async fn run_doctor(cfg: &MediaqConfig, root: &Path) -> Result<()> {
    let timeout = cfg.timeouts.probe();
    let fetch = probe_version(&cfg.tools.fetch_bin, timeout).await;
    let media = probe_version(&cfg.tools.media_bin, timeout).await;

    let tool = |bin: &Path, version: &Option<String>| match version {
        Some(v) => format!("{} ({})", bin.display(), v),
        None => format!("{} (NOT FOUND)", bin.display()),
    };
    println!("fetch tool     {}", tool(&cfg.tools.fetch_bin, &fetch));
    println!("media tool     {}", tool(&cfg.tools.media_bin, &media));

    let show = |r: Result<std::path::PathBuf>| match r {
        Ok(p) => p.display().to_string(),
        Err(e) => format!("unavailable ({e:#})"),
    };
    println!("config         {}", show(config::config_path()));
    println!("database       {}", show(default_db_path()));
    println!("log file       {}", show(logging::log_file_path()));
    println!("control socket {}", show(default_control_socket_path().map_err(Into::into)));
    match free_space(root) {
        Ok(free) => println!(
            "downloads      {} ({:.1} GiB free)",
            root.display(),
            free as f64 / 1_073_741_824.0
        ),
        Err(_) => println!("downloads      {} (not created yet)", root.display()),
    }

    if fetch.is_none() || media.is_none() {
        anyhow::bail!("required tools are missing; set [tools] in the config file");
    }
    Ok(())
}
