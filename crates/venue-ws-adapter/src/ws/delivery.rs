/*
[INPUT]:  Handler callbacks and items routed by the read loop
[OUTPUT]: Handler invocations on a dedicated task per handler
[POS]:    WebSocket layer - fire-and-forget delivery off the read path
[UPDATE]: When changing handler signatures or delivery guarantees
*/

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Result, WsError};

/// Per-subscription and client-wide message callback, receives the raw frame text
pub type MessageHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Client-wide error callback
pub type ErrorHandler = Arc<dyn Fn(&WsError) + Send + Sync>;

/// Queue drained by one task that invokes a handler.
///
/// Items reach the handler in post order. Dropping every clone of the mailbox
/// lets the task finish the backlog and exit.
pub struct Mailbox<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<T: Send + 'static> Mailbox<T> {
    /// Spawn the delivery task on the current Tokio runtime
    pub fn spawn<F>(name: &'static str, handler: F) -> Result<Self>
    where
        F: Fn(T) + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| WsError::Config(format!("{name} handler needs a Tokio runtime")))?;
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();

        runtime.spawn(async move {
            while let Some(item) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(|| handler(item))).is_err() {
                    warn!(handler = name, "handler panicked; continuing with next item");
                }
            }
            debug!(handler = name, "mailbox drained");
        });

        Ok(Self { tx })
    }

    /// Queue an item; returns false when the delivery task is gone
    pub fn post(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Mailbox for a [`MessageHandler`]
pub fn message_mailbox(name: &'static str, handler: MessageHandler) -> Result<Mailbox<Arc<str>>> {
    Mailbox::spawn(name, move |raw: Arc<str>| handler(&raw))
}

/// Mailbox for an [`ErrorHandler`]
pub fn error_mailbox(handler: ErrorHandler) -> Result<Mailbox<Arc<WsError>>> {
    Mailbox::spawn("error", move |err: Arc<WsError>| handler(&err))
}

/// Client-wide fallback callbacks for messages and errors
#[derive(Debug, Default)]
pub struct Listeners {
    message: RwLock<Option<Mailbox<Arc<str>>>>,
    error: RwLock<Option<Mailbox<Arc<WsError>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_message(&self, handler: MessageHandler) -> Result<()> {
        let mailbox = message_mailbox("message", handler)?;
        *self.message.write() = Some(mailbox);
        Ok(())
    }

    pub fn set_error(&self, handler: ErrorHandler) -> Result<()> {
        let mailbox = error_mailbox(handler)?;
        *self.error.write() = Some(mailbox);
        Ok(())
    }

    pub fn message(&self) -> Option<Mailbox<Arc<str>>> {
        self.message.read().clone()
    }

    /// Deliver a non-data frame (acks, login result) to the message listener
    pub fn notify_message(&self, raw: Arc<str>) -> bool {
        match self.message() {
            Some(mailbox) => mailbox.post(raw),
            None => false,
        }
    }

    /// Deliver an error to the error listener, or log it when none is set
    pub fn notify_error(&self, err: WsError) {
        let mailbox = self.error.read().clone();
        match mailbox {
            Some(mailbox) => {
                if !mailbox.post(Arc::new(err)) {
                    warn!("error listener not accepting errors");
                }
            }
            None => debug!(error = %err, "no error listener set"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_mailbox_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::spawn("test", move |n: u32| {
            let _ = tx.send(n);
        })
        .unwrap();

        for n in 0..100 {
            assert!(mailbox.post(n));
        }

        for expected in 0..100 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_slow_handler_does_not_block_poster() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slow = Mailbox::spawn("slow", |_: u32| {
            std::thread::sleep(Duration::from_millis(200));
        })
        .unwrap();
        let fast = Mailbox::spawn("fast", move |n: u32| {
            let _ = tx.send(n);
        })
        .unwrap();

        let started = std::time::Instant::now();
        slow.post(1);
        slow.post(2);
        fast.post(7);
        assert!(started.elapsed() < Duration::from_millis(100));

        let got = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(7));
    }

    #[tokio::test]
    async fn test_handler_panic_keeps_mailbox_alive() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mailbox = Mailbox::spawn("panicky", move |n: u32| {
            if n == 0 {
                panic!("boom");
            }
            let _ = tx.send(n);
        })
        .unwrap();

        mailbox.post(0);
        mailbox.post(1);
        assert_eq!(rx.recv().await, Some(1));
    }

    #[test]
    fn test_spawn_outside_runtime_is_config_error() {
        let result = Mailbox::spawn("orphan", |_: u32| {});
        assert!(matches!(result, Err(WsError::Config(_))));
    }

    #[tokio::test]
    async fn test_listeners_route_errors_and_messages() {
        let listeners = Listeners::new();
        assert!(!listeners.notify_message(Arc::from("ack")));
        listeners.notify_error(WsError::Closed);

        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        listeners
            .set_message(Arc::new(move |raw: &str| {
                let _ = msg_tx.send(raw.to_string());
            }))
            .unwrap();
        listeners
            .set_error(Arc::new(move |err: &WsError| {
                let _ = err_tx.send(err.to_string());
            }))
            .unwrap();

        assert!(listeners.notify_message(Arc::from("ack")));
        listeners.notify_error(WsError::Closed);

        assert_eq!(msg_rx.recv().await.as_deref(), Some("ack"));
        assert_eq!(
            err_rx.recv().await.as_deref(),
            Some("WebSocket closed by peer")
        );
    }

    #[tokio::test]
    async fn test_message_mailbox_passes_raw_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: MessageHandler = Arc::new(move |raw: &str| {
            let _ = tx.send(raw.to_string());
        });
        let mailbox = message_mailbox("message", handler).unwrap();
        mailbox.post(Arc::from("hello"));
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }
}
