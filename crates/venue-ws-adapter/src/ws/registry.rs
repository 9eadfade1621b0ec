/*
[INPUT]:  Subscribe/unsubscribe calls from the client, data envelopes from the read loop
[OUTPUT]: Ordered snapshot for replay, handler delivery per subscription
[POS]:    WebSocket layer - desired subscription state that outlives sessions
[UPDATE]: When changing subscription identity, ordering, or routing
*/

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::codec::ChannelArg;
use super::delivery::{Mailbox, MessageHandler, message_mailbox};
use crate::error::Result;

/// Where data for a subscription goes
#[derive(Debug, Clone)]
enum Route {
    Handler(Mailbox<Arc<str>>),
    /// Client-wide message listener
    Listener,
}

/// One desired subscription
#[derive(Debug, Clone)]
pub struct Subscription {
    pub arg: ChannelArg,
    pub is_private: bool,
    route: Route,
}

impl Subscription {
    /// Subscription with its own handler; spawns the handler's delivery task
    pub fn with_handler(arg: ChannelArg, is_private: bool, handler: MessageHandler) -> Result<Self> {
        Ok(Self {
            arg,
            is_private,
            route: Route::Handler(message_mailbox("subscription", handler)?),
        })
    }

    /// Subscription delivered to the client-wide message listener
    pub fn with_listener(arg: ChannelArg, is_private: bool) -> Self {
        Self {
            arg,
            is_private,
            route: Route::Listener,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    /// Insertion order; a replaced subscription keeps its slot
    slots: BTreeMap<u64, Subscription>,
    index: HashMap<ChannelArg, u64>,
}

/// Thread-safe set of desired subscriptions keyed by [`ChannelArg`]
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; returns true when an existing entry was replaced
    pub fn add(&self, subscription: Subscription) -> bool {
        let mut inner = self.inner.write();
        if let Some(seq) = inner.index.get(&subscription.arg).copied() {
            inner.slots.insert(seq, subscription);
            return true;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.index.insert(subscription.arg.clone(), seq);
        inner.slots.insert(seq, subscription);
        false
    }

    /// Remove by key; returns false when nothing was subscribed
    pub fn remove(&self, arg: &ChannelArg) -> bool {
        let mut inner = self.inner.write();
        match inner.index.remove(arg) {
            Some(seq) => {
                inner.slots.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, arg: &ChannelArg) -> bool {
        self.inner.read().index.contains_key(arg)
    }

    pub fn is_private(&self, arg: &ChannelArg) -> Option<bool> {
        let inner = self.inner.read();
        let seq = inner.index.get(arg)?;
        inner.slots.get(seq).map(|sub| sub.is_private)
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.index.clear();
    }

    /// Keys in first-subscription order
    pub fn snapshot(&self) -> Vec<ChannelArg> {
        self.inner
            .read()
            .slots
            .values()
            .map(|sub| sub.arg.clone())
            .collect()
    }

    /// Route a data payload to its subscription.
    ///
    /// Unknown keys are ignored: the venue may still deliver a few frames for a
    /// subscription that was just removed.
    pub fn dispatch(
        &self,
        arg: &ChannelArg,
        payload: Arc<str>,
        listener: Option<&Mailbox<Arc<str>>>,
    ) -> bool {
        let route = {
            let inner = self.inner.read();
            let Some(seq) = inner.index.get(arg) else {
                debug!(channel = %arg.channel, inst_id = %arg.inst_id, "dispatch miss; no subscription");
                return false;
            };
            match inner.slots.get(seq) {
                Some(sub) => sub.route.clone(),
                None => return false,
            }
        };

        let mailbox = match (&route, listener) {
            (Route::Handler(mailbox), _) => mailbox,
            (Route::Listener, Some(mailbox)) => mailbox,
            (Route::Listener, None) => {
                debug!(channel = %arg.channel, inst_id = %arg.inst_id, "no message listener set; dropping");
                return false;
            }
        };
        let delivered = mailbox.post(payload);
        if !delivered {
            warn!(channel = %arg.channel, inst_id = %arg.inst_id, "handler not accepting messages");
        }
        delivered
    }
}
