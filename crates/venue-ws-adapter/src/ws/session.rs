/*
[INPUT]:  Shared client context (config, signer, connector, registry, listeners)
[OUTPUT]: One physical connection driven from dial to close, with an exit reason
[POS]:    WebSocket layer - per-connection state machine, login, replay, read loop
[UPDATE]: When changing the login handshake, replay, liveness, or frame routing
*/

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::codec::{self, EventKind, OutboundRequest, PING, PONG};
use super::delivery::Listeners;
use super::dispatcher::{Outbound, OutboundSlot, spawn_writer};
use super::registry::SubscriptionRegistry;
use super::transport::{Connector, Frame, FrameReader};
use crate::auth::{Signer, login_request};
use crate::config::ClientConfig;
use crate::error::{Result, WsError, truncate_for_log};

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const MIN_HEALTH_TICK: Duration = Duration::from_millis(10);
const RAW_LOG_MAX_BYTES: usize = 512;

/// Lifecycle of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Ready,
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum Termination {
    /// The client was closed
    Explicit,
    /// The connection failed and should be re-established
    Failure(WsError),
}

#[derive(Debug)]
pub struct SessionExit {
    pub termination: Termination,
    pub reached_ready: bool,
}

/// One-shot notification for whoever is waiting on the first `Ready`
pub(crate) type ReadySignal = Option<oneshot::Sender<Result<()>>>;

/// State shared by the client facade, the supervisor and every session
#[derive(Debug)]
pub(crate) struct SessionContext {
    pub config: ClientConfig,
    pub signer: Option<Signer>,
    pub connector: Arc<dyn Connector>,
    pub registry: Arc<SubscriptionRegistry>,
    pub outbound: OutboundSlot,
    pub listeners: Arc<Listeners>,
    pub state: watch::Sender<SessionState>,
    pub shutdown: CancellationToken,
}

enum FrameOutcome {
    Continue,
    LoggedIn,
}

/// A single connection attempt and, if it succeeds, its lifetime
pub(crate) struct Session {
    id: Uuid,
    ctx: Arc<SessionContext>,
}

impl Session {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drive the connection until it fails or the client is closed
    pub async fn run(self, ready_signal: &mut ReadySignal) -> SessionExit {
        let mut reached_ready = false;
        let result = self.drive(&mut reached_ready, ready_signal).await;

        let termination = match result {
            _ if self.ctx.shutdown.is_cancelled() => Termination::Explicit,
            Ok(()) | Err(WsError::Stopped) => Termination::Explicit,
            Err(err) => Termination::Failure(err),
        };

        match &termination {
            Termination::Explicit => info!(session_id = %self.id, "session closed"),
            Termination::Failure(err) => {
                warn!(session_id = %self.id, error = %err, reached_ready, "session failed")
            }
        }
        self.set_state(SessionState::Closed);

        SessionExit {
            termination,
            reached_ready,
        }
    }

    async fn drive(&self, reached_ready: &mut bool, ready_signal: &mut ReadySignal) -> Result<()> {
        let config = &self.ctx.config;
        self.set_state(SessionState::Connecting);
        info!(session_id = %self.id, url = %config.url, "connecting");

        let (writer, mut reader) = tokio::select! {
            _ = self.ctx.shutdown.cancelled() => return Err(WsError::Stopped),
            dialed = tokio::time::timeout(config.connect_timeout, self.ctx.connector.dial(&config.url)) => {
                match dialed {
                    Ok(halves) => halves?,
                    Err(_) => {
                        return Err(WsError::Timeout {
                            what: "connect",
                            duration: config.connect_timeout,
                        });
                    }
                }
            }
        };
        info!(session_id = %self.id, "connected");

        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();
        let (outbound, writer_handle) = spawn_writer(self.id, writer, failure_tx.clone());
        let activity = Arc::new(Mutex::new(Instant::now()));
        let health = spawn_health_check(
            self.id,
            outbound.clone(),
            activity.clone(),
            config.ping_interval,
            config.health_check_interval,
            failure_tx,
        );

        let result = self
            .read_loop(
                &outbound,
                reader.as_mut(),
                &mut failure_rx,
                &activity,
                reached_ready,
                ready_signal,
            )
            .await;

        self.set_state(SessionState::Closing);
        health.abort();
        self.ctx.outbound.release(self.id).await;
        drop(outbound);
        drop(reader);

        let abort = writer_handle.abort_handle();
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_handle)
            .await
            .is_err()
        {
            debug!(session_id = %self.id, "writer did not drain in time; aborting");
            abort.abort();
        }

        result
    }

    async fn read_loop(
        &self,
        outbound: &Outbound,
        reader: &mut dyn FrameReader,
        failures: &mut mpsc::UnboundedReceiver<WsError>,
        activity: &Mutex<Instant>,
        reached_ready: &mut bool,
        ready_signal: &mut ReadySignal,
    ) -> Result<()> {
        let config = &self.ctx.config;

        let mut login_deadline = match (&config.credentials, &self.ctx.signer) {
            (Some(credentials), Some(signer)) => {
                self.set_state(SessionState::Authenticating);
                let request = login_request(credentials, signer)?;
                outbound.send_request(&request).await?;
                info!(session_id = %self.id, api_key = %credentials.api_key, "login sent");
                Some(Instant::now() + config.login_timeout)
            }
            (Some(_), None) => {
                return Err(WsError::Signing("credentials configured without a signer".into()));
            }
            (None, _) => {
                self.become_ready(outbound, ready_signal).await?;
                *reached_ready = true;
                None
            }
        };

        loop {
            let login_timer = async move {
                match login_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => return Ok(()),
                Some(err) = failures.recv() => return Err(err),
                _ = login_timer => {
                    return Err(WsError::Timeout {
                        what: "login",
                        duration: config.login_timeout,
                    });
                }
                frame = reader.read_next() => {
                    let frame = frame?;
                    *activity.lock() = Instant::now();

                    let awaiting_login = login_deadline.is_some();
                    match self.handle_frame(frame, outbound, awaiting_login).await? {
                        FrameOutcome::Continue => {}
                        FrameOutcome::LoggedIn => {
                            login_deadline = None;
                            info!(session_id = %self.id, "login acknowledged");
                            self.become_ready(outbound, ready_signal).await?;
                            *reached_ready = true;
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        outbound: &Outbound,
        awaiting_login: bool,
    ) -> Result<FrameOutcome> {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => {
                    warn!(session_id = %self.id, error = %err, "binary frame is not utf-8; dropped");
                    self.ctx
                        .listeners
                        .notify_error(WsError::decode(err.to_string(), ""));
                    return Ok(FrameOutcome::Continue);
                }
            },
            Frame::Ping(_) | Frame::Pong(_) => return Ok(FrameOutcome::Continue),
        };

        let envelope = match codec::decode(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "frame decode failed; dropped");
                self.ctx.listeners.notify_error(err);
                return Ok(FrameOutcome::Continue);
            }
        };

        match envelope.event {
            EventKind::Ping => {
                outbound.send_text(PONG).await?;
            }
            EventKind::Pong => {
                debug!(session_id = %self.id, "pong");
            }
            EventKind::LoginAck if awaiting_login => {
                if envelope.is_success() {
                    self.ctx.listeners.notify_message(envelope.raw);
                    return Ok(FrameOutcome::LoggedIn);
                }
                return Err(WsError::Authentication {
                    code: envelope.code.unwrap_or_default(),
                    message: envelope.message.unwrap_or_default(),
                });
            }
            EventKind::Error if awaiting_login => {
                return Err(WsError::Authentication {
                    code: envelope.code.unwrap_or_default(),
                    message: envelope.message.unwrap_or_default(),
                });
            }
            EventKind::Error => {
                warn!(
                    session_id = %self.id,
                    code = envelope.code.unwrap_or_default(),
                    message = envelope.message.as_deref().unwrap_or(""),
                    "venue error"
                );
                self.ctx.listeners.notify_error(WsError::Venue {
                    code: envelope.code.unwrap_or_default(),
                    message: envelope.message.unwrap_or_default(),
                });
            }
            EventKind::LoginAck | EventKind::SubscribeAck | EventKind::UnsubscribeAck => {
                debug!(
                    session_id = %self.id,
                    event = ?envelope.event,
                    frame = %truncate_for_log(&envelope.raw, RAW_LOG_MAX_BYTES),
                    "ack"
                );
                self.ctx.listeners.notify_message(envelope.raw);
            }
            EventKind::Data => {
                if let Some(arg) = &envelope.arg {
                    let listener = self.ctx.listeners.message();
                    self.ctx
                        .registry
                        .dispatch(arg, envelope.raw.clone(), listener.as_ref());
                }
            }
        }

        Ok(FrameOutcome::Continue)
    }

    /// Publish `outbound` as the ready session's handle and replay the registry.
    ///
    /// Runs under the slot lock so concurrent subscribe calls either land in the
    /// snapshot or are sent after it, never both.
    async fn become_ready(&self, outbound: &Outbound, ready_signal: &mut ReadySignal) -> Result<()> {
        let mut slot = self.ctx.outbound.lock().await;
        let snapshot = self.ctx.registry.snapshot();
        for chunk in snapshot.chunks(self.ctx.config.replay_batch_size) {
            outbound
                .send_request(&OutboundRequest::subscribe(chunk.iter().cloned()))
                .await?;
        }
        *slot = Some(outbound.clone());
        drop(slot);

        self.set_state(SessionState::Ready);
        info!(session_id = %self.id, replayed = snapshot.len(), "session ready");

        if let Some(signal) = ready_signal.take() {
            let _ = signal.send(Ok(()));
        }
        Ok(())
    }

    fn set_state(&self, state: SessionState) {
        self.ctx.state.send_replace(state);
    }
}

/// Periodic liveness task for one session.
///
/// Sends `"ping"` every `ping_interval` and reports `IdleTimeout` on `failures`
/// once nothing has been received for `idle_timeout`.
fn spawn_health_check(
    session_id: Uuid,
    outbound: Outbound,
    activity: Arc<Mutex<Instant>>,
    ping_interval: Duration,
    idle_timeout: Duration,
    failures: mpsc::UnboundedSender<WsError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = ping_interval.min(idle_timeout / 4).max(MIN_HEALTH_TICK);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_ping = Instant::now();

        loop {
            ticker.tick().await;

            let idle = activity.lock().elapsed();
            if idle >= idle_timeout {
                warn!(%session_id, ?idle, "no inbound traffic; declaring connection dead");
                let _ = failures.send(WsError::IdleTimeout { idle });
                return;
            }

            if last_ping.elapsed() >= ping_interval {
                if outbound.send_text(PING).await.is_err() {
                    return;
                }
                last_ping = Instant::now();
                debug!(%session_id, "ping");
            }
        }
    })
}
