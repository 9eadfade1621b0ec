/*
[INPUT]:  Send requests from the client, the session and the health check
[OUTPUT]: Frames written one at a time, in submission order, to the session socket
[POS]:    WebSocket layer - single-writer funnel per session
[UPDATE]: When changing outbound queueing or writer shutdown
*/

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::codec::OutboundRequest;
use super::transport::{Frame, FrameWriter};
use crate::error::{Result, WsError};

const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Cloneable handle onto one session's writer queue
#[derive(Debug, Clone)]
pub struct Outbound {
    session_id: Uuid,
    tx: mpsc::Sender<Frame>,
}

impl Outbound {
    /// Queue a frame; fails once the writer has stopped
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| WsError::NotConnected)
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(Frame::Text(text.into())).await
    }

    pub async fn send_request(&self, request: &OutboundRequest) -> Result<()> {
        let text = request.encode()?;
        debug!(session_id = %self.session_id, op = ?request.op, args = request.args.len(), "queue request");
        self.send_text(text).await
    }
}

/// Start the writer task that owns `writer`.
///
/// The first write error is reported on `failures` and stops the task. When
/// every [`Outbound`] clone is dropped the socket is closed.
pub fn spawn_writer(
    session_id: Uuid,
    mut writer: Box<dyn FrameWriter>,
    failures: mpsc::UnboundedSender<WsError>,
) -> (Outbound, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Frame>(OUTBOUND_QUEUE_CAPACITY);

    let handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = writer.write(frame).await {
                warn!(%session_id, error = %err, "write failed; stopping writer");
                let _ = failures.send(err);
                return;
            }
        }

        if let Err(err) = writer.close().await {
            debug!(%session_id, error = %err, "close after writer drain failed");
        }
        debug!(%session_id, "writer stopped");
    });

    (Outbound { session_id, tx }, handle)
}

/// The outbound handle of the session that is currently `Ready`, if any.
///
/// Holding the lock while mutating the registry and enqueueing keeps a
/// subscription from being both replayed and sent by the client.
#[derive(Debug, Clone, Default)]
pub struct OutboundSlot {
    inner: Arc<Mutex<Option<Outbound>>>,
}

impl OutboundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, Option<Outbound>> {
        self.inner.lock().await
    }

    pub async fn current(&self) -> Option<Outbound> {
        self.inner.lock().await.clone()
    }

    /// Clear the slot if it still belongs to `session_id`
    pub async fn release(&self, session_id: Uuid) {
        let mut guard = self.inner.lock().await;
        if guard.as_ref().is_some_and(|o| o.session_id == session_id) {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ws::codec::ChannelArg;

    #[derive(Debug)]
    struct RecordingWriter {
        written: mpsc::UnboundedSender<Frame>,
        fail_after: Option<usize>,
        count: usize,
    }

    #[async_trait]
    impl FrameWriter for RecordingWriter {
        async fn write(&mut self, frame: Frame) -> Result<()> {
            if self.fail_after.is_some_and(|n| self.count >= n) {
                return Err(WsError::Transport("broken pipe".into()));
            }
            self.count += 1;
            let _ = self.written.send(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn writer(fail_after: Option<usize>) -> (Box<dyn FrameWriter>, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Box::new(RecordingWriter {
                written: tx,
                fail_after,
                count: 0,
            }),
            rx,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_senders_are_serialized_fifo_per_sender() {
        let (w, mut written) = writer(None);
        let (fail_tx, _fail_rx) = mpsc::unbounded_channel();
        let (outbound, handle) = spawn_writer(Uuid::new_v4(), w, fail_tx);

        let mut tasks = Vec::new();
        for sender in 0..4 {
            let outbound = outbound.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    outbound.send_text(format!("{sender}:{i}")).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        drop(outbound);
        handle.await.unwrap();

        let mut last_seen = [-1i64; 4];
        let mut total = 0;
        while let Ok(Frame::Text(text)) = written.try_recv() {
            let (sender, seq) = text.split_once(':').unwrap();
            let sender: usize = sender.parse().unwrap();
            let seq: i64 = seq.parse().unwrap();
            assert!(seq > last_seen[sender]);
            last_seen[sender] = seq;
            total += 1;
        }
        assert_eq!(total, 200);
    }

    #[tokio::test]
    async fn test_send_request_encodes_json() {
        let (w, mut written) = writer(None);
        let (fail_tx, _fail_rx) = mpsc::unbounded_channel();
        let (outbound, _handle) = spawn_writer(Uuid::new_v4(), w, fail_tx);

        let request = OutboundRequest::subscribe([ChannelArg::new("SPOT", "ticker", "BTCUSDT")]);
        outbound.send_request(&request).await.unwrap();

        match written.recv().await {
            Some(Frame::Text(text)) => assert!(text.contains(r#""op":"subscribe""#)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_failure_is_reported_and_stops_writer() {
        let (w, _written) = writer(Some(1));
        let (fail_tx, mut fail_rx) = mpsc::unbounded_channel();
        let (outbound, handle) = spawn_writer(Uuid::new_v4(), w, fail_tx);

        outbound.send_text("one").await.unwrap();
        outbound.send_text("two").await.unwrap();

        let err = fail_rx.recv().await.unwrap();
        assert!(err.is_retryable());
        handle.await.unwrap();
        assert!(matches!(
            outbound.send_text("three").await,
            Err(WsError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_slot_release_only_clears_own_session() {
        let (w, _written) = writer(None);
        let (fail_tx, _fail_rx) = mpsc::unbounded_channel();
        let session_id = Uuid::new_v4();
        let (outbound, _handle) = spawn_writer(session_id, w, fail_tx);

        let slot = OutboundSlot::new();
        *slot.lock().await = Some(outbound);

        slot.release(Uuid::new_v4()).await;
        assert!(slot.current().await.is_some());

        slot.release(session_id).await;
        assert!(slot.current().await.is_none());
    }
}
