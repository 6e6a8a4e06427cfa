/// Native messaging host entry point
use anyhow::Result;
use sot_core::{config::get_data_dir, config::PolicyTiming, Daemon};
use sot_storage::Database;

/// Chrome passes the caller origin, Firefox the manifest path and extension id
pub fn launched_by_browser(args: &[String]) -> bool {
    args.get(1).is_some_and(|arg| {
        arg.starts_with("chrome-extension://")
            || arg.starts_with("moz-extension://")
            || arg.ends_with(".json")
    })
}

pub async fn run_host(origin: &[String]) -> Result<()> {
    // stdout carries the protocol, so logs go to a file
    setup_host_logging()?;
    log::info!(
        "Native host launched by {}",
        origin.first().map_or("command line", String::as_str)
    );

    let db = Database::new(None)?;
    let daemon = Daemon::new(db, PolicyTiming::default());
    if let Err(e) = daemon.run_with_signals().await {
        log::error!("Native host exited with a fatal error: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn setup_host_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join("host.log");

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}
