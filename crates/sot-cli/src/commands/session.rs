/// Session commands talking to the running host over its control socket
use anyhow::{bail, Result};
use chrono::Utc;
use sot_core::control::{ControlRequest, ControlResponse, IpcClient};
use sot_core::TabId;
use sot_storage::{FocusSession, Strictness};
use std::path::Path;

async fn send(sock_path: &Path, request: ControlRequest) -> Result<ControlResponse> {
    IpcClient::new(sock_path).send_command(&request).await
}

fn unexpected(response: &ControlResponse) -> anyhow::Error {
    anyhow::anyhow!("Unexpected response from host: {response:?}")
}

fn print_session(session: &FocusSession) {
    println!("  Goal:       {}", session.goal);
    println!("  Strictness: {}", session.strictness);
    println!("  Threshold:  {}", session.threshold);
    println!("  Started:    {}", session.describe_elapsed(Utc::now()));
}

/// Render seconds as HH:MM:SS
fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

pub async fn start_session(
    sock_path: &Path,
    goal: String,
    strictness: Option<Strictness>,
    threshold: Option<f64>,
) -> Result<()> {
    let request = ControlRequest::StartSession {
        goal,
        strictness,
        threshold,
    };
    match send(sock_path, request).await? {
        ControlResponse::Session {
            session: Some(session),
            ..
        } => {
            println!("Focus session started");
            print_session(&session);
            Ok(())
        }
        ControlResponse::Ack {
            success: false,
            error,
        } => bail!(error.unwrap_or_else(|| "Failed to start session".to_string())),
        other => Err(unexpected(&other)),
    }
}

pub async fn end_session(sock_path: &Path) -> Result<()> {
    match send(sock_path, ControlRequest::EndSession).await? {
        ControlResponse::Ack { success: true, .. } => {
            println!("Focus session ended.");
            Ok(())
        }
        other => Err(unexpected(&other)),
    }
}

pub async fn show_status(sock_path: &Path) -> Result<()> {
    if !sock_path.exists() {
        println!("Host Status: Not running");
        return Ok(());
    }

    match send(sock_path, ControlRequest::Status).await {
        Ok(ControlResponse::Status {
            running,
            session,
            pending_closures,
            uptime_seconds,
        }) => {
            println!(
                "Host Status: {}",
                if running { "Running" } else { "Stopped" }
            );
            println!("Uptime: {}", format_uptime(uptime_seconds));

            match session {
                Some(session) => {
                    println!("\nFocus Session:");
                    print_session(&session);
                }
                None => println!("\nNo active focus session"),
            }

            if !pending_closures.is_empty() {
                let tabs: Vec<String> = pending_closures.iter().map(ToString::to_string).collect();
                println!("\nTabs closing soon: {}", tabs.join(", "));
            }
        }
        Ok(other) => return Err(unexpected(&other)),
        Err(e) => {
            log::error!("Failed to get status: {e:#}");
            println!("Host Status: Not running (or not responding)");
        }
    }
    Ok(())
}

pub async fn cancel_closure(sock_path: &Path, tab_id: TabId) -> Result<()> {
    match send(sock_path, ControlRequest::CancelClosure { tab_id }).await? {
        ControlResponse::Closure {
            cancelled: true, ..
        } => println!("Tab {tab_id} will stay open."),
        ControlResponse::Closure {
            cancelled: false, ..
        } => println!("Tab {tab_id} had no pending closure."),
        other => return Err(unexpected(&other)),
    }
    Ok(())
}

pub async fn close_tab(sock_path: &Path, tab_id: TabId) -> Result<()> {
    match send(sock_path, ControlRequest::CloseThisTab { tab_id }).await? {
        ControlResponse::Closed { outcome, .. } => {
            println!("Tab {tab_id}: {outcome:?}");
            Ok(())
        }
        ControlResponse::Ack { error, .. } => {
            bail!(error.unwrap_or_else(|| format!("Failed to close tab {tab_id}")))
        }
        other => Err(unexpected(&other)),
    }
}

pub async fn stop_host(sock_path: &Path) -> Result<()> {
    if !sock_path.exists() {
        log::info!("Host is not running (no control socket).");
        return Ok(());
    }

    match send(sock_path, ControlRequest::Shutdown).await {
        Ok(ControlResponse::Shutdown) => log::info!("Host shutdown signal sent."),
        Ok(other) => log::error!("Received unexpected response from host: {other:?}"),
        Err(e) => {
            log::warn!("Host not responding ({e:#}), removing stale socket.");
            std::fs::remove_file(sock_path)?;
        }
    }
    Ok(())
}
