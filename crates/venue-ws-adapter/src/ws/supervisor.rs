/*
[INPUT]:  Session exit reasons and the client's shutdown token
[OUTPUT]: A fresh session after each failure, spaced by capped exponential backoff
[POS]:    WebSocket layer - reconnection supervision (at most one live session)
[UPDATE]: When changing the backoff curve or restart policy
*/

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use super::session::{ReadySignal, Session, SessionContext, SessionState, Termination};

/// Capped exponential backoff with uniform jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            initial,
            max,
            jitter,
            attempt: 0,
        }
    }

    /// Consecutive failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// `initial * 2^attempt`, capped at `max`, without jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(31);
        self.initial.saturating_mul(factor).min(self.max)
    }

    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        base + self.sample_jitter()
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn sample_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let max_ms = self.jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Runs sessions back to back until the client is closed
pub(crate) struct Supervisor {
    ctx: Arc<SessionContext>,
    backoff: Backoff,
}

impl Supervisor {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        let config = &ctx.config;
        let backoff = Backoff::new(
            config.reconnect_initial_delay,
            config.reconnect_timeout,
            config.reconnect_jitter,
        );
        Self { ctx, backoff }
    }

    /// Supervise until shutdown.
    ///
    /// `ready_signal` resolves with `Ok` when the first session becomes ready, or
    /// with the first session's error if it fails before that.
    pub async fn run(mut self, mut ready_signal: ReadySignal) {
        loop {
            if self.ctx.shutdown.is_cancelled() {
                break;
            }

            let session = Session::new(self.ctx.clone());
            let session_id = session.id();
            let exit = session.run(&mut ready_signal).await;

            if exit.reached_ready {
                self.backoff.reset();
            }

            let err = match exit.termination {
                Termination::Explicit => break,
                Termination::Failure(err) => err,
            };

            self.ctx.listeners.notify_error(err.clone());
            if let Some(signal) = ready_signal.take() {
                let _ = signal.send(Err(err));
            }

            let delay = self.backoff.next_delay();
            warn!(
                %session_id,
                attempt = self.backoff.attempt(),
                ?delay,
                "reconnecting after backoff"
            );

            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.ctx.state.send_replace(SessionState::Closed);
        info!(url = %self.ctx.config.url, "supervisor stopped");
    }
}
