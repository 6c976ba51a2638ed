//! The session as a log sink.
//!
//! [`BotSession::write`] is the byte-stream contract; [`SinkWriter`] adapts it
//! to `std::io::Write` so synchronous logging pipelines can feed the chat
//! without blocking on network retries.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::MakeWriter;

use crate::{errors::Error, session::BotSession, Result};

impl BotSession {
    /// Send a log line unless the same bytes are still in the history window.
    ///
    /// Writes are serialized, so identical concurrent lines go out once.
    /// A bad remote call comes back as [`Error::BadWriter`] so the pipeline can
    /// drop this sink.
    pub async fn write(&self, msg: &[u8]) -> Result<usize> {
        let _gate = self.write_gate.lock().await;
        if self.history.contains(msg) {
            return Ok(msg.len());
        }

        let text = String::from_utf8_lossy(msg);
        match self.send_message(&text, false, None).await {
            Ok(_) => {}
            Err(Error::BadRemoteCall { status, response }) => {
                tracing::error!(status, %response, "log sink rejected by remote");
                return Err(Error::BadWriter);
            }
            Err(e) => return Err(e),
        }

        self.history.record(msg);
        Ok(msg.len())
    }
}

/// Cloneable `io::Write` feeding a background task that calls
/// [`BotSession::write`]. Disabled for good after a [`Error::BadWriter`].
#[derive(Clone, Debug)]
pub struct SinkWriter {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    disabled: Arc<AtomicBool>,
}

/// The delivery task behind a [`SinkWriter`].
#[derive(Debug)]
pub struct SinkTask {
    close: CancellationToken,
    handle: JoinHandle<()>,
}

impl SinkWriter {
    /// Must be called inside a tokio runtime. The task ends once every writer
    /// clone is dropped, the sink is disabled, or [`SinkTask::shutdown`] runs.
    pub fn spawn(session: Arc<BotSession>) -> (Self, SinkTask) {
        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let disabled = Arc::new(AtomicBool::new(false));
        let close = CancellationToken::new();

        let handle = tokio::spawn(deliver(session, rx, close.clone(), disabled.clone()));

        (Self { tx, disabled }, SinkTask { close, handle })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}

impl SinkTask {
    /// Stop accepting lines and wait up to `grace` for the queued ones.
    ///
    /// Returns `false` if the queue was not drained in time; the task is then
    /// aborted and the rest is lost.
    pub async fn shutdown(self, grace: Duration) -> bool {
        self.close.cancel();
        let mut handle = self.handle;
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "log sink task failed");
                false
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(?grace, "log sink not drained in time");
                false
            }
        }
    }
}

async fn deliver(
    session: Arc<BotSession>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    close: CancellationToken,
    disabled: Arc<AtomicBool>,
) {
    let mut closing = false;
    loop {
        let next = tokio::select! {
            next = rx.recv() => next,
            _ = close.cancelled(), if !closing => {
                // Queued lines are still handed out by recv().
                closing = true;
                rx.close();
                continue;
            }
        };
        let Some(buf) = next else {
            break;
        };

        match session.write(&buf).await {
            Ok(_) => {}
            Err(Error::BadWriter) => {
                disabled.store(true, Ordering::SeqCst);
                tracing::warn!("log sink disabled");
                break;
            }
            Err(e) => tracing::warn!(error = %e, "log sink write failed"),
        }
    }
}

impl io::Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.is_disabled() {
            return Err(io::Error::new(io::ErrorKind::Other, Error::BadWriter));
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "log sink closed"))?;
        Ok(buf.len())
    }

    /// Returns at once. Delivery is asynchronous; [`SinkTask::shutdown`]
    /// is the way to wait for the queue.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
