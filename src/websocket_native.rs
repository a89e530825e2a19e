//! Native WebSocket client for the hit stream
//!
//! Uses tokio-tungstenite. Binary frames are forwarded to the render thread,
//! which ingests them; this side only tracks the connection lifecycle and
//! reconnects after the configured backoff.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::connection::ConnectionManager;

/// Shared handle on the connection manager
pub type SharedManager = Arc<Mutex<ConnectionManager>>;

/// Connect, forward frames, reconnect on close, until `cancel` fires.
///
/// `on_frame` returns false when the receiving side is gone, which stops
/// the loop.
pub async fn run_connection<F>(manager: SharedManager, cancel: CancellationToken, mut on_frame: F)
where
    F: FnMut(Vec<u8>) -> bool,
{
    use futures_util::StreamExt;
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    let url = manager.lock().endpoint().to_string();

    loop {
        let reason = tokio::select! {
            _ = cancel.cancelled() => break,
            connected = connect_async(url.as_str()) => match connected {
                Ok((mut stream, _)) => {
                    manager.lock().on_open();

                    let reason = loop {
                        let msg = tokio::select! {
                            _ = cancel.cancelled() => return,
                            msg = stream.next() => msg,
                        };
                        match msg {
                            Some(Ok(Message::Binary(bytes))) => {
                                if !on_frame(bytes.to_vec()) {
                                    debug!("Frame receiver dropped, stopping connection");
                                    return;
                                }
                            }
                            Some(Ok(Message::Close(frame))) => {
                                warn!(?frame, "WebSocket closed by server");
                                break "closed by server".to_string();
                            }
                            Some(Ok(Message::Text(text))) => {
                                debug!(len = text.len(), "Ignoring text message");
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                error!(error = %e, "WebSocket error");
                                break e.to_string();
                            }
                            None => break "stream ended".to_string(),
                        }
                    };
                    reason
                }
                Err(e) => {
                    error!(error = %e, url = %url, "Failed to connect");
                    e.to_string()
                }
            },
        };

        let delay = {
            let mut manager = manager.lock();
            manager.on_close(&reason).unwrap_or(manager.reconnect_delay())
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        manager.lock().begin_reconnect();
    }

    debug!("Connection loop cancelled");
}

/// Native WebSocket client that runs in a background thread
pub struct NativeWsClient {
    /// Receiver for incoming binary frames
    pub rx: Receiver<Vec<u8>>,
    /// Shared connection manager
    pub manager: SharedManager,
    cancel: CancellationToken,
}

impl NativeWsClient {
    /// Spawn a background thread with a tokio runtime driving [`run_connection`]
    pub fn connect(manager: ConnectionManager) -> Self {
        let (tx, rx): (Sender<Vec<u8>>, Receiver<Vec<u8>>) = mpsc::channel();
        let manager = Arc::new(Mutex::new(manager));
        let cancel = CancellationToken::new();

        let manager_clone = manager.clone();
        let cancel_clone = cancel.clone();
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "Failed to create tokio runtime");
                    manager_clone.lock().on_close(&e.to_string());
                    return;
                }
            };
            rt.block_on(run_connection(manager_clone, cancel_clone, move |frame| {
                tx.send(frame).is_ok()
            }));
        });

        Self {
            rx,
            manager,
            cancel,
        }
    }
}

impl Drop for NativeWsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
