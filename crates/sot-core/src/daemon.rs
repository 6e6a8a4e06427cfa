use crate::{
    browser::native::NativeBridge,
    config::{get_socket_path, PolicyTiming},
    control::{self, ControlHandler},
    ignore::IgnoreFilter,
    monitor::TabMonitor,
    policy::PolicyMachine,
};
use anyhow::{Context, Result};
use chrono::Utc;
use sot_storage::{Database, Settings};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    io::AsyncRead,
    sync::mpsc,
    time::{interval, interval_at, Instant},
};

/// Period of the settings refresh / expiry / shutdown check
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// The native-messaging host process
pub struct Daemon {
    bridge: Arc<NativeBridge>,
    ignore: Arc<IgnoreFilter>,
    monitor: Arc<TabMonitor>,
    control: Arc<ControlHandler>,
    shutdown_signal: Arc<AtomicBool>,
    timing: PolicyTiming,
}

impl Daemon {
    /// Host talking to the browser over stdout
    #[must_use]
    pub fn new(db: Database, timing: PolicyTiming) -> Self {
        Self::with_bridge(db, NativeBridge::stdout(timing.reply_timeout), timing)
    }

    #[must_use]
    pub fn with_bridge(db: Database, bridge: NativeBridge, timing: PolicyTiming) -> Self {
        let database = Arc::new(db);
        let settings = database.get_settings().unwrap_or_else(|e| {
            log::warn!("Failed to read settings, using defaults: {e:#}");
            Settings::default()
        });

        let bridge = Arc::new(bridge);
        let ignore = Arc::new(IgnoreFilter::from_settings(&settings));
        let policy = PolicyMachine::new(bridge.clone(), database, ignore.clone(), timing);
        let monitor = Arc::new(TabMonitor::new(bridge.clone(), policy));
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let control = Arc::new(ControlHandler::new(
            monitor.clone(),
            shutdown_signal.clone(),
        ));

        Self {
            bridge,
            ignore,
            monitor,
            control,
            shutdown_signal,
            timing,
        }
    }

    /// Run on stdin with the control socket in the data directory until the
    /// browser disconnects, Ctrl-C, or a shutdown request
    ///
    /// # Errors
    ///
    /// Returns an error if the control socket cannot be set up
    pub async fn run_with_signals(&self) -> Result<()> {
        let sock_path = get_socket_path()?;
        self.run(tokio::io::stdin(), &sock_path).await
    }

    /// Main loop over an arbitrary browser input stream
    ///
    /// # Errors
    ///
    /// Returns an error if the control socket cannot be bound
    pub async fn run<R>(&self, reader: R, sock_path: &Path) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.restore().await;

        let listener = control::bind(sock_path)
            .with_context(|| format!("Failed to bind control socket {}", sock_path.display()))?;
        let server = tokio::spawn(control::serve(self.control.clone(), listener));

        let (event_tx, mut events) = mpsc::channel(64);
        let (control_tx, mut controls) = mpsc::channel(16);
        let bridge = self.bridge.clone();
        let mut reader_task =
            tokio::spawn(async move { bridge.run_reader(reader, event_tx, control_tx).await });

        let mut housekeeping = interval(HOUSEKEEPING_INTERVAL);
        let scan_every = self.timing.scan_interval;
        let mut scans = interval_at(Instant::now() + scan_every, scan_every);
        log::info!("Native host started, control socket at {}", sock_path.display());

        loop {
            tokio::select! {
                _ = housekeeping.tick() => self.housekeeping().await,
                _ = scans.tick() => self.spawn_scan(Duration::ZERO),
                Some(event) = events.recv() => {
                    self.monitor.handle_event(&event).await;
                }
                Some((request_id, request)) = controls.recv() => {
                    let control = self.control.clone();
                    let bridge = self.bridge.clone();
                    tokio::spawn(async move {
                        let response = control.handle(request).await;
                        if let Err(e) = bridge.reply_control(request_id, response).await {
                            log::warn!("Failed to answer control request {request_id}: {e}");
                        }
                    });
                }
                result = &mut reader_task => {
                    match result {
                        Ok(Ok(())) => log::info!("Browser disconnected, shutting down"),
                        Ok(Err(e)) => log::error!("Browser connection failed: {e}"),
                        Err(e) => log::error!("Browser reader task failed: {e}"),
                    }
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    self.shutdown_signal.store(true, Ordering::SeqCst);
                }
            }

            if self.shutdown_signal.load(Ordering::SeqCst) {
                break;
            }
        }

        server.abort();
        reader_task.abort();
        self.monitor.policy().shutdown().await;
        if let Err(e) = std::fs::remove_file(sock_path) {
            log::debug!("Control socket already removed: {e}");
        }
        log::info!("Native host shut down gracefully.");
        Ok(())
    }

    /// Pick up a session saved by a previous run and scan once the extension is ready
    async fn restore(&self) {
        if self
            .monitor
            .policy()
            .restore_session(Utc::now())
            .await
            .is_some()
        {
            self.spawn_scan(self.timing.restore_scan_delay);
        }
    }

    fn spawn_scan(&self, delay: Duration) {
        let monitor = self.monitor.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = monitor.scan_all().await {
                log::warn!("Tab scan failed: {e:#}");
            }
        });
    }

    async fn housekeeping(&self) {
        let policy = self.monitor.policy();
        self.ignore.update_settings(&policy.settings());
        policy.expire_if_due(Utc::now()).await;
    }
}
