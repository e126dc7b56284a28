//! Notification subscriptions

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Create a connected sink/subscription pair for one characteristic
///
/// The link keeps the sink and pushes every notification into it; the
/// subscriber reads them from the [`Subscription`].
pub fn notification_channel(characteristic: Uuid) -> (NotificationSink, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SubscriptionHandle::new();

    let sink = NotificationSink {
        tx,
        handle: handle.clone(),
    };
    let subscription = Subscription {
        characteristic,
        rx,
        handle,
    };

    (sink, subscription)
}

/// Cancels a subscription from anywhere
///
/// Cancellation is synchronous and idempotent.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    cancelled: Arc<watch::Sender<bool>>,
}

impl SubscriptionHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            cancelled: Arc::new(tx),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// Link-side end of a subscription
#[derive(Debug)]
pub struct NotificationSink {
    tx: mpsc::UnboundedSender<Bytes>,
    handle: SubscriptionHandle,
}

impl NotificationSink {
    /// Push one notification; returns false once the subscriber is gone
    pub fn deliver(&self, notification: impl Into<Bytes>) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }
        self.tx.send(notification.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_cancelled() || self.tx.is_closed()
    }
}

/// A stream of raw notification buffers from one characteristic
#[derive(Debug)]
pub struct Subscription {
    characteristic: Uuid,
    rx: mpsc::UnboundedReceiver<Bytes>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    /// Handle that can cancel this subscription while it is being awaited
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Next notification
    ///
    /// Returns `None` once the subscription is cancelled or the link drops
    /// its sink. Notifications still queued at cancellation are discarded.
    pub async fn recv(&mut self) -> Option<Bytes> {
        let mut cancelled = self.handle.cancelled.subscribe();
        if *cancelled.borrow_and_update() {
            return None;
        }

        tokio::select! {
            biased;
            _ = cancelled.changed() => None,
            notification = self.rx.recv() => notification,
        }
    }

    /// Next already-queued notification, without waiting
    pub fn try_recv(&mut self) -> Option<Bytes> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
