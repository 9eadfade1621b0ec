/*
[INPUT]:  Client configuration, subscriptions and handlers from collaborators
[OUTPUT]: Delivered channel payloads, listener callbacks, connection state
[POS]:    WebSocket layer - public client facade
[UPDATE]: When adding public operations or changing connect/close semantics
*/

use std::sync::Arc;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::codec::{ChannelArg, OutboundRequest};
use super::delivery::{ErrorHandler, Listeners, MessageHandler};
use super::dispatcher::{Outbound, OutboundSlot};
use super::registry::{Subscription, SubscriptionRegistry};
use super::session::{SessionContext, SessionState};
use super::supervisor::Supervisor;
use super::transport::{Connector, TungsteniteConnector};
use crate::auth::Signer;
use crate::config::ClientConfig;
use crate::error::{Result, WsError};

/// WebSocket client for one venue endpoint.
///
/// Subscriptions live in the client, not in the connection: they may be added
/// before `connect`, and every reconnect replays them.
#[derive(Debug)]
pub struct WsClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriptionRegistry>,
    outbound: OutboundSlot,
    listeners: Arc<Listeners>,
    state: watch::Sender<SessionState>,
    shutdown: CancellationToken,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsClient {
    /// Create a client using the tokio-tungstenite connector
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Create a client with a custom connector
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _rx) = watch::channel(SessionState::Closed);
        Self {
            config,
            connector,
            registry: Arc::new(SubscriptionRegistry::new()),
            outbound: OutboundSlot::new(),
            listeners: Arc::new(Listeners::new()),
            state,
            shutdown: CancellationToken::new(),
            supervisor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the connection and wait until the first session is ready.
    ///
    /// Invalid configuration fails before anything is spawned. If the first
    /// attempt fails, its error is returned (and also reaches the error
    /// listener) while reconnection keeps running in the background until
    /// [`WsClient::close`].
    pub async fn connect(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(WsError::Stopped);
        }
        self.config.validate()?;
        let signer = self.config.credentials.as_ref().map(Signer::new).transpose()?;

        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut supervisor = self.supervisor.lock().await;
            if supervisor.is_some() {
                return Err(WsError::AlreadyConnected);
            }

            let ctx = Arc::new(SessionContext {
                config: self.config.clone(),
                signer,
                connector: self.connector.clone(),
                registry: self.registry.clone(),
                outbound: self.outbound.clone(),
                listeners: self.listeners.clone(),
                state: self.state.clone(),
                shutdown: self.shutdown.clone(),
            });
            info!(url = %self.config.url, login = self.config.requires_login(), "starting websocket client");
            *supervisor = Some(tokio::spawn(Supervisor::new(ctx).run(Some(ready_tx))));
        }

        match ready_rx.await {
            Ok(result) => result,
            Err(_) => Err(WsError::Stopped),
        }
    }

    /// Subscribe `arg` with its own handler.
    ///
    /// Subscribing an existing key replaces its handler without sending a new
    /// request.
    pub async fn subscribe<F>(&self, arg: ChannelArg, handler: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        let subscription = Subscription::with_handler(arg, false, handler)?;
        self.add_subscriptions(vec![subscription]).await
    }

    /// Subscribe an account channel that needs a logged-in session.
    ///
    /// Fails with [`WsError::Config`] when the client has no credentials.
    pub async fn subscribe_private<F>(&self, arg: ChannelArg, handler: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        if !self.config.requires_login() {
            return Err(WsError::Config(format!(
                "private channel {arg} needs credentials"
            )));
        }
        let handler: MessageHandler = Arc::new(handler);
        let subscription = Subscription::with_handler(arg, true, handler)?;
        self.add_subscriptions(vec![subscription]).await
    }

    /// Subscribe `arg` and deliver its data to the client-wide message listener
    pub async fn subscribe_default(&self, arg: ChannelArg) -> Result<()> {
        let subscription = Subscription::with_listener(arg, false);
        self.add_subscriptions(vec![subscription]).await
    }

    /// Subscribe several args sharing one handler, sent as a single request
    pub async fn subscribe_many<F>(&self, args: Vec<ChannelArg>, handler: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        let subscriptions = args
            .into_iter()
            .map(|arg| Subscription::with_handler(arg, false, handler.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.add_subscriptions(subscriptions).await
    }

    async fn add_subscriptions(&self, subscriptions: Vec<Subscription>) -> Result<()> {
        let slot = self.outbound.lock().await;
        let mut fresh = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let arg = subscription.arg.clone();
            if !self.registry.add(subscription) {
                fresh.push(arg);
            }
        }

        let Some(outbound) = slot.as_ref() else {
            debug!(count = fresh.len(), "subscriptions recorded; sent once a session is ready");
            return Ok(());
        };
        for chunk in fresh.chunks(self.config.replay_batch_size) {
            let request = OutboundRequest::subscribe(chunk.iter().cloned());
            send_or_defer(outbound, &request).await?;
        }
        Ok(())
    }

    /// Remove a subscription; unknown keys are a no-op
    pub async fn unsubscribe(&self, arg: &ChannelArg) -> Result<()> {
        let slot = self.outbound.lock().await;
        if !self.registry.remove(arg) {
            debug!(channel = %arg.channel, inst_id = %arg.inst_id, "unsubscribe for unknown key ignored");
            return Ok(());
        }

        if let Some(outbound) = slot.as_ref() {
            send_or_defer(outbound, &OutboundRequest::unsubscribe([arg.clone()])).await?;
        }
        Ok(())
    }

    /// Send raw text on the ready session, bypassing the registry
    pub async fn send_raw(&self, text: impl Into<String>) -> Result<()> {
        let outbound = self.outbound.current().await.ok_or(WsError::NotConnected)?;
        outbound.send_text(text).await
    }

    /// Send an encoded request on the ready session, bypassing the registry
    pub async fn send_request(&self, request: &OutboundRequest) -> Result<()> {
        let outbound = self.outbound.current().await.ok_or(WsError::NotConnected)?;
        outbound.send_request(request).await
    }

    /// Install the client-wide message and error listeners.
    ///
    /// The message listener receives acks and data of `subscribe_default`
    /// subscriptions; the error listener receives decode, venue, login and
    /// connection errors.
    pub fn set_listeners<M, E>(&self, on_message: M, on_error: E) -> Result<()>
    where
        M: Fn(&str) + Send + Sync + 'static,
        E: Fn(&WsError) + Send + Sync + 'static,
    {
        self.set_message_listener(on_message)?;
        self.set_error_listener(on_error)
    }

    pub fn set_message_listener<M>(&self, on_message: M) -> Result<()>
    where
        M: Fn(&str) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(on_message);
        self.listeners.set_message(handler)
    }

    pub fn set_error_listener<E>(&self, on_error: E) -> Result<()>
    where
        E: Fn(&WsError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(on_error);
        self.listeners.set_error(handler)
    }

    /// Stop reconnecting, close the socket, wait for background tasks and
    /// forget every subscription.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let handle = self.supervisor.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                debug!(error = %err, "supervisor task ended abnormally");
            }
            info!(url = %self.config.url, "websocket client closed");
        }
        self.registry.clear();
        self.state.send_replace(SessionState::Closed);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Watch session state transitions
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current subscriptions in replay order
    pub fn subscriptions(&self) -> Vec<ChannelArg> {
        self.registry.snapshot()
    }

    /// Whether `arg` was subscribed through [`WsClient::subscribe_private`];
    /// `None` when it is not subscribed
    pub fn is_private(&self, arg: &ChannelArg) -> Option<bool> {
        self.registry.is_private(arg)
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A dead writer means the session is ending; the next one replays the registry
async fn send_or_defer(outbound: &Outbound, request: &OutboundRequest) -> Result<()> {
    match outbound.send_request(request).await {
        Err(WsError::NotConnected) => {
            debug!(op = ?request.op, "session writer gone; request deferred to next session");
            Ok(())
        }
        other => other,
    }
}
