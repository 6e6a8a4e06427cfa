use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
};

use crate::browser::{CloseOutcome, TabId};
use crate::monitor::TabMonitor;
use sot_storage::{FocusSession, Strictness};

/// Largest request accepted on the control socket
const MAX_REQUEST_BYTES: u64 = 64 * 1024;

/// Request from the popup (over the bridge) or the CLI (over the socket)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlRequest {
    StartSession {
        goal: String,
        #[serde(default)]
        strictness: Option<Strictness>,
        #[serde(default)]
        threshold: Option<f64>,
    },
    EndSession,
    GetSession,
    CheckSession,
    #[serde(rename_all = "camelCase")]
    CancelClosure { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    CloseThisTab { tab_id: TabId },
    Status,
    Shutdown,
}

/// Answer to a [`ControlRequest`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlResponse {
    Ack {
        success: bool,
        error: Option<String>,
    },
    Session {
        active: bool,
        session: Option<FocusSession>,
    },
    #[serde(rename_all = "camelCase")]
    Closure { tab_id: TabId, cancelled: bool },
    #[serde(rename_all = "camelCase")]
    Closed { tab_id: TabId, outcome: CloseOutcome },
    #[serde(rename_all = "camelCase")]
    Status {
        running: bool,
        session: Option<FocusSession>,
        pending_closures: Vec<TabId>,
        uptime_seconds: u64,
    },
    Shutdown,
}

impl ControlResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self::Ack {
            success: true,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Ack {
            success: false,
            error: Some(error.into()),
        }
    }

    fn session(session: Option<FocusSession>) -> Self {
        Self::Session {
            active: session.is_some(),
            session,
        }
    }
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request to the running host and wait for its answer
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not running or the exchange fails
    pub async fn send_command(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let mut stream = UnixStream::connect(&self.sock_path)
            .await
            .with_context(|| {
                format!(
                    "Stay On Track host is not running ({})",
                    self.sock_path.display()
                )
            })?;

        let encoded = bincode::serialize(request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: ControlResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

/// Applies control requests to the running host
pub struct ControlHandler {
    monitor: Arc<TabMonitor>,
    started_at: DateTime<Utc>,
    shutdown_signal: Arc<AtomicBool>,
}

impl ControlHandler {
    #[must_use]
    pub fn new(monitor: Arc<TabMonitor>, shutdown_signal: Arc<AtomicBool>) -> Self {
        Self {
            monitor,
            started_at: Utc::now(),
            shutdown_signal,
        }
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let policy = self.monitor.policy();

        match request {
            ControlRequest::StartSession {
                goal,
                strictness,
                threshold,
            } => match policy.start_session(&goal, strictness, threshold).await {
                Ok(session) => {
                    // Scan in the background; the caller gets its answer right away
                    let monitor = self.monitor.clone();
                    tokio::spawn(async move {
                        if let Err(e) = monitor.scan_all().await {
                            log::warn!("Initial scan failed: {e:#}");
                        }
                    });
                    ControlResponse::session(Some(session))
                }
                Err(e) => {
                    log::info!("Rejected session start: {e}");
                    ControlResponse::failure(e.to_string())
                }
            },
            ControlRequest::EndSession => {
                policy.end_session().await;
                ControlResponse::ok()
            }
            ControlRequest::GetSession | ControlRequest::CheckSession => {
                ControlResponse::session(policy.current_session().await)
            }
            ControlRequest::CancelClosure { tab_id } => ControlResponse::Closure {
                tab_id,
                cancelled: policy.cancel_closure(tab_id).await,
            },
            ControlRequest::CloseThisTab { tab_id } => match policy.close_tab(tab_id).await {
                Ok(outcome) => ControlResponse::Closed { tab_id, outcome },
                Err(e) => {
                    log::warn!("Failed to close tab {tab_id}: {e:#}");
                    ControlResponse::failure(format!("Failed to close tab {tab_id}: {e}"))
                }
            },
            ControlRequest::Status => {
                let uptime = Utc::now().signed_duration_since(self.started_at);
                ControlResponse::Status {
                    running: true,
                    session: policy.current_session().await,
                    pending_closures: policy.pending_closures().await,
                    uptime_seconds: u64::try_from(uptime.num_seconds()).unwrap_or(0),
                }
            }
            ControlRequest::Shutdown => {
                log::info!("Shutdown requested over control socket");
                self.shutdown_signal.store(true, Ordering::SeqCst);
                ControlResponse::Shutdown
            }
        }
    }

    async fn serve(&self, stream: &mut UnixStream) -> Result<()> {
        let mut buffer = Vec::new();
        (&mut *stream)
            .take(MAX_REQUEST_BYTES)
            .read_to_end(&mut buffer)
            .await?;
        if buffer.is_empty() {
            return Ok(());
        }

        let request: ControlRequest = bincode::deserialize(&buffer)?;
        log::debug!("Control request: {request:?}");
        let response = self.handle(request).await;

        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Bind the control socket, replacing a stale one
///
/// # Errors
///
/// Returns an error if the stale socket cannot be removed or binding fails
pub fn bind(sock_path: &Path) -> io::Result<UnixListener> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    if let Some(parent) = sock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    UnixListener::bind(sock_path)
}

/// Accept control connections forever, one request per connection
pub async fn serve(handler: Arc<ControlHandler>, listener: UnixListener) {
    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.serve(&mut stream).await {
                        log::error!("Control connection error: {e:#}");
                    }
                });
            }
            Err(e) => {
                log::error!("Control accept error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::TabSnapshot;
    use crate::config::PolicyTiming;
    use crate::ignore::IgnoreFilter;
    use crate::policy::PolicyMachine;
    use crate::test_support::{MemoryStore, MockActuator, MockSource};
    use std::time::Duration;

    fn handler_with(actuator: &Arc<MockActuator>, source: MockSource) -> (ControlHandler, Arc<AtomicBool>) {
        let policy = PolicyMachine::new(
            actuator.clone(),
            Arc::new(MemoryStore::default()),
            Arc::new(IgnoreFilter::default()),
            PolicyTiming::default(),
        );
        let monitor = Arc::new(TabMonitor::new(Arc::new(source), policy));
        let shutdown = Arc::new(AtomicBool::new(false));
        (ControlHandler::new(monitor, shutdown.clone()), shutdown)
    }

    fn start(goal: &str, strictness: Strictness) -> ControlRequest {
        ControlRequest::StartSession {
            goal: goal.to_string(),
            strictness: Some(strictness),
            threshold: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_lifecycle_over_control() {
        let actuator = Arc::new(MockActuator::default());
        let (handler, _) = handler_with(&actuator, MockSource::default());

        assert_eq!(
            handler.handle(ControlRequest::GetSession).await,
            ControlResponse::Session {
                active: false,
                session: None
            }
        );

        let response = handler.handle(start("learn rust", Strictness::Soft)).await;
        let ControlResponse::Session {
            active: true,
            session: Some(session),
        } = response
        else {
            panic!("unexpected response: {response:?}");
        };
        assert_eq!(session.goal, "learn rust");

        assert_eq!(
            handler.handle(ControlRequest::CheckSession).await,
            ControlResponse::Session {
                active: true,
                session: Some(session)
            }
        );

        assert_eq!(
            handler.handle(ControlRequest::EndSession).await,
            ControlResponse::ok()
        );
        assert!(matches!(
            handler.handle(ControlRequest::GetSession).await,
            ControlResponse::Session { active: false, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_start_is_acknowledged_as_failure() {
        let actuator = Arc::new(MockActuator::default());
        let (handler, _) = handler_with(&actuator, MockSource::default());

        assert_eq!(
            handler.handle(start("  ", Strictness::Hard)).await,
            ControlResponse::failure("Please enter a focus goal")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_scans_open_tabs() {
        let actuator = Arc::new(MockActuator::with_open_tabs(&[7]));
        let source = MockSource::new(vec![TabSnapshot::new(
            7,
            "Funny Cat Videos Compilation",
            "https://cats.example/",
        )]);
        let (handler, _) = handler_with(&actuator, source);

        handler
            .handle(start("learn rust programming", Strictness::Hard))
            .await;
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(actuator.delivered().len(), 1);
        assert_eq!(actuator.closed(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_close_requests() {
        let actuator = Arc::new(MockActuator::with_open_tabs(&[7, 8]));
        let source = MockSource::new(vec![
            TabSnapshot::new(7, "Funny Cat Videos Compilation", "https://cats.example/"),
            TabSnapshot::new(8, "Celebrity Gossip Daily", "https://gossip.example/"),
        ]);
        let (handler, _) = handler_with(&actuator, source);

        handler
            .handle(start("learn rust programming", Strictness::Hard))
            .await;
        // Let the background scan schedule both closures
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            handler.handle(ControlRequest::CancelClosure { tab_id: 7 }).await,
            ControlResponse::Closure {
                tab_id: 7,
                cancelled: true
            }
        );
        assert_eq!(
            handler.handle(ControlRequest::CloseThisTab { tab_id: 8 }).await,
            ControlResponse::Closed {
                tab_id: 8,
                outcome: CloseOutcome::Closed
            }
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(actuator.closed(), vec![8]);
        assert_eq!(
            handler.handle(ControlRequest::CancelClosure { tab_id: 7 }).await,
            ControlResponse::Closure {
                tab_id: 7,
                cancelled: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_shutdown() {
        let actuator = Arc::new(MockActuator::default());
        let (handler, shutdown) = handler_with(&actuator, MockSource::default());

        let ControlResponse::Status {
            running,
            session,
            pending_closures,
            ..
        } = handler.handle(ControlRequest::Status).await
        else {
            panic!("expected status");
        };
        assert!(running);
        assert!(session.is_none());
        assert!(pending_closures.is_empty());

        assert_eq!(
            handler.handle(ControlRequest::Shutdown).await,
            ControlResponse::Shutdown
        );
        assert!(shutdown.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_socket_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("sot.sock");

        let actuator = Arc::new(MockActuator::default());
        let (handler, _) = handler_with(&actuator, MockSource::default());
        let listener = bind(&sock_path).unwrap();
        let server = tokio::spawn(serve(Arc::new(handler), listener));

        let client = IpcClient::new(&sock_path);
        let response = client
            .send_command(&ControlRequest::StartSession {
                goal: "write the parser".to_string(),
                strictness: None,
                threshold: Some(0.25),
            })
            .await
            .unwrap();
        assert!(matches!(
            response,
            ControlResponse::Session {
                active: true,
                session: Some(ref s)
            } if s.goal == "write the parser"
        ));

        let response = client.send_command(&ControlRequest::Status).await.unwrap();
        assert!(matches!(
            response,
            ControlResponse::Status { running: true, session: Some(_), .. }
        ));

        server.abort();
    }

    #[tokio::test]
    async fn test_client_reports_missing_host() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(&dir.path().join("absent.sock"));
        let err = client
            .send_command(&ControlRequest::Status)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not running"));
    }
}
