//! Native-messaging bridge to the browser extension.
//!
//! Frames are a `u32` length in native byte order followed by that many bytes
//! of UTF-8 JSON, in both directions over the host's stdin/stdout.

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, Mutex};

use super::{
    CloseOutcome, Delivery, TabActuator, TabEvent, TabId, TabSnapshot, TabSource, TabStatus,
    WarningPayload,
};
use crate::control::{ControlRequest, ControlResponse};

/// Largest message the browser accepts from a native host
pub const MAX_OUTGOING_FRAME: usize = 1024 * 1024;

/// Largest message the browser sends to a native host
pub const MAX_INCOMING_FRAME: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
    #[error("Browser did not reply within {0:?}")]
    Timeout(Duration),
    #[error("Browser connection closed")]
    Closed,
    #[error("Native messaging I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed native message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read one frame. Returns `None` when the browser closed the pipe between frames.
///
/// # Errors
///
/// Returns an error on I/O failure, a truncated length or payload, or an
/// oversized length
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, BridgeError> {
    let mut len_buf = [0u8; 4];
    // Only EOF before the first length byte is a clean disconnect
    if reader.read(&mut len_buf[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1..]).await?;

    let size = u32::from_ne_bytes(len_buf) as usize;
    if size > MAX_INCOMING_FRAME {
        return Err(BridgeError::FrameTooLarge {
            size,
            limit: MAX_INCOMING_FRAME,
        });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

/// Write one frame and flush it
///
/// # Errors
///
/// Returns an error if the payload is over [`MAX_OUTGOING_FRAME`] or the write fails
pub async fn write_frame<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), BridgeError> {
    let size = payload.len();
    let len = u32::try_from(size)
        .ok()
        .filter(|_| size <= MAX_OUTGOING_FRAME)
        .ok_or(BridgeError::FrameTooLarge {
            size,
            limit: MAX_OUTGOING_FRAME,
        })?;

    writer.write_all(&len.to_ne_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Answer from the extension to a host request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserReply {
    pub success: bool,
    pub tabs: Option<Vec<TabSnapshot>>,
    pub tab: Option<TabSnapshot>,
    pub error: Option<String>,
}

/// Messages the extension sends to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrowserMessage {
    #[serde(rename_all = "camelCase")]
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        title: String,
        #[serde(default)]
        url: String,
        status: TabStatus,
    },
    #[serde(rename_all = "camelCase")]
    Reply { request_id: u64, reply: BrowserReply },
    #[serde(rename_all = "camelCase")]
    Control {
        request_id: u64,
        request: ControlRequest,
    },
}

/// Messages the host sends to the extension
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    #[serde(rename_all = "camelCase")]
    ListTabs { request_id: u64 },
    #[serde(rename_all = "camelCase")]
    GetTab { request_id: u64, tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    OffTopic {
        request_id: u64,
        tab_id: TabId,
        #[serde(flatten)]
        payload: WarningPayload,
    },
    #[serde(rename_all = "camelCase")]
    RemoveTab { request_id: u64, tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    ControlReply {
        request_id: u64,
        response: ControlResponse,
    },
}

type FrameWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Request/reply channel to the extension over native messaging
pub struct NativeBridge {
    writer: Mutex<FrameWriter>,
    pending: Mutex<HashMap<u64, oneshot::Sender<BrowserReply>>>,
    next_id: AtomicU64,
    reply_timeout: Duration,
}

impl NativeBridge {
    pub fn new<W>(writer: W, reply_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            reply_timeout,
        }
    }

    /// Bridge writing to the host process's stdout
    #[must_use]
    pub fn stdout(reply_timeout: Duration) -> Self {
        Self::new(tokio::io::stdout(), reply_timeout)
    }

    /// Send a message without waiting for an answer
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write fails
    pub async fn send(&self, message: &HostMessage) -> Result<(), BridgeError> {
        let payload = serde_json::to_vec(message)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut **writer, &payload).await
    }

    /// Send a message and wait for the reply carrying its request id
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] if no reply arrives in time,
    /// [`BridgeError::Closed`] if the reader stopped, or a write error
    pub async fn request(
        &self,
        build: impl FnOnce(u64) -> HostMessage + Send,
    ) -> Result<BrowserReply, BridgeError> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if let Err(e) = self.send(&build(request_id)).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(BridgeError::Timeout(self.reply_timeout))
            }
        }
    }

    /// Hand a reply to the request waiting for it
    pub async fn resolve(&self, request_id: u64, reply: BrowserReply) -> bool {
        match self.pending.lock().await.remove(&request_id) {
            Some(tx) => tx.send(reply).is_ok(),
            None => {
                log::debug!("Late or unknown reply for request {request_id}");
                false
            }
        }
    }

    /// Answer a control request that came in over the bridge
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub async fn reply_control(
        &self,
        request_id: u64,
        response: ControlResponse,
    ) -> Result<(), BridgeError> {
        self.send(&HostMessage::ControlReply {
            request_id,
            response,
        })
        .await
    }

    /// Read frames from the browser until it disconnects.
    ///
    /// Tab updates and control requests are forwarded to the channels; replies
    /// complete their pending requests. Requests still waiting when the pipe
    /// closes fail with [`BridgeError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is corrupt or unreadable
    pub async fn run_reader<R>(
        &self,
        mut reader: R,
        events: mpsc::Sender<TabEvent>,
        controls: mpsc::Sender<(u64, ControlRequest)>,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let result = self.read_loop(&mut reader, &events, &controls).await;
        self.pending.lock().await.clear();
        log::info!("Browser connection closed");
        result
    }

    async fn read_loop<R>(
        &self,
        reader: &mut R,
        events: &mpsc::Sender<TabEvent>,
        controls: &mpsc::Sender<(u64, ControlRequest)>,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin + Send,
    {
        while let Some(frame) = read_frame(reader).await? {
            let message = match serde_json::from_slice::<BrowserMessage>(&frame) {
                Ok(message) => message,
                Err(e) => {
                    self.reject_unreadable(&frame, &e).await;
                    continue;
                }
            };

            match message {
                BrowserMessage::TabUpdated {
                    tab_id,
                    title,
                    url,
                    status,
                } => {
                    let event = TabEvent {
                        tab: TabSnapshot::new(tab_id, title, url),
                        status,
                    };
                    if events.send(event).await.is_err() {
                        return Ok(());
                    }
                }
                BrowserMessage::Reply { request_id, reply } => {
                    self.resolve(request_id, reply).await;
                }
                BrowserMessage::Control {
                    request_id,
                    request,
                } => {
                    if controls.send((request_id, request)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// A control request that fails to decode still gets a failure reply when
    /// its request id can be recovered; anything else is dropped.
    async fn reject_unreadable(&self, frame: &[u8], error: &serde_json::Error) {
        let request_id = serde_json::from_slice::<serde_json::Value>(frame)
            .ok()
            .filter(|value| value["type"] == "CONTROL")
            .and_then(|value| value["requestId"].as_u64());

        let Some(request_id) = request_id else {
            log::warn!("Skipping unreadable browser message: {error}");
            return;
        };

        log::warn!("Rejecting malformed control request {request_id}: {error}");
        let response = ControlResponse::failure(format!("Invalid control request: {error}"));
        if let Err(e) = self.reply_control(request_id, response).await {
            log::warn!("Failed to answer control request {request_id}: {e}");
        }
    }
}

/// Whether a failed removal means the tab was already gone
fn is_missing_tab(error: &str) -> bool {
    let error = error.to_lowercase();
    error.contains("no tab with id") || error.contains("tab not found")
}

#[async_trait]
impl TabSource for NativeBridge {
    async fn list_open_tabs(&self) -> anyhow::Result<Vec<TabSnapshot>> {
        let reply = self
            .request(|request_id| HostMessage::ListTabs { request_id })
            .await?;
        if !reply.success {
            bail!(
                "Browser refused to list tabs: {}",
                reply.error.unwrap_or_default()
            );
        }
        Ok(reply.tabs.unwrap_or_default())
    }
}

#[async_trait]
impl TabActuator for NativeBridge {
    async fn send_warning(
        &self,
        tab_id: TabId,
        payload: &WarningPayload,
    ) -> anyhow::Result<Delivery> {
        let payload = payload.clone();
        let result = self
            .request(move |request_id| HostMessage::OffTopic {
                request_id,
                tab_id,
                payload,
            })
            .await;

        match result {
            Ok(reply) if reply.success => Ok(Delivery::Delivered),
            Ok(reply) => {
                log::debug!(
                    "Tab {tab_id} did not take the warning: {}",
                    reply.error.unwrap_or_default()
                );
                Ok(Delivery::Unreachable)
            }
            Err(BridgeError::Timeout(_)) => Ok(Delivery::Unreachable),
            Err(e) => Err(e.into()),
        }
    }

    async fn tab_exists(&self, tab_id: TabId) -> anyhow::Result<bool> {
        let reply = self
            .request(|request_id| HostMessage::GetTab { request_id, tab_id })
            .await?;
        Ok(reply.success && reply.tab.is_some())
    }

    async fn close_tab(&self, tab_id: TabId) -> anyhow::Result<CloseOutcome> {
        let reply = self
            .request(|request_id| HostMessage::RemoveTab { request_id, tab_id })
            .await?;
        if reply.success {
            return Ok(CloseOutcome::Closed);
        }

        let error = reply.error.unwrap_or_default();
        if is_missing_tab(&error) {
            log::debug!("Tab {tab_id} was already gone: {error}");
            Ok(CloseOutcome::AlreadyClosed)
        } else {
            bail!("Browser refused to close tab {tab_id}: {error}")
        }
    }
}

#[cfg(test)]
mod tests;
