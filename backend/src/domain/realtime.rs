//! Keeps today's aggregate live by merging per-category change feeds.
//!
//! The merger is the only writer of the aggregate. It opens one subscription
//! per category, all feeding a single channel created for that subscription
//! generation. Tearing a generation down drops its receiver, so messages
//! still in flight from old subscriptions can never reach the aggregate.
//!
//! Each subscription moves through
//! `Idle -> Subscribing -> Subscribed -> Disconnected`; a failed subscribe or
//! a channel error lands in `Disconnected` until the next manual refresh.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use super::ports::{ChangeFeed, ChannelStatus, FeedMessage, FeedPayload, SubscriptionHandle};
use super::today_fetch::date_filter;
use super::{Appointment, Category, MergeOutcome, TodayAggregate};

/// Lifecycle of one category subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    #[default]
    Idle,
    Subscribing,
    Subscribed,
    Disconnected,
}

/// Live/offline indicator derived from the subscription states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// Rule deriving [`ConnectionState`] from the per-category states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPolicy {
    /// Connected only while every category is subscribed.
    #[default]
    AllSubscribed,
    /// Connected while at least one category is subscribed.
    AnySubscribed,
}

/// Raised when a connection policy name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown connection policy {0}; expected all or any")]
pub struct UnknownConnectionPolicy(pub String);

impl FromStr for ConnectionPolicy {
    type Err = UnknownConnectionPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::AllSubscribed),
            "any" => Ok(Self::AnySubscribed),
            other => Err(UnknownConnectionPolicy(other.to_owned())),
        }
    }
}

impl ConnectionPolicy {
    fn derive<I>(self, mut states: I) -> ConnectionState
    where
        I: Iterator<Item = SubscriptionState>,
    {
        let subscribed = |state: SubscriptionState| state == SubscriptionState::Subscribed;
        let connected = match self {
            Self::AllSubscribed => states.all(subscribed),
            Self::AnySubscribed => states.any(subscribed),
        };
        if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[derive(Debug, Default)]
struct Subscription {
    state: SubscriptionState,
    handle: Option<SubscriptionHandle>,
}

/// Owns the aggregate and the subscriptions that keep it current.
pub struct RealtimeMerger {
    feed: Arc<dyn ChangeFeed>,
    policy: ConnectionPolicy,
    aggregate: TodayAggregate,
    subscriptions: BTreeMap<Category, Subscription>,
    receiver: Option<UnboundedReceiver<FeedMessage>>,
}

impl RealtimeMerger {
    /// Merger over `aggregate` with every subscription idle.
    pub fn new(feed: Arc<dyn ChangeFeed>, policy: ConnectionPolicy, aggregate: TodayAggregate) -> Self {
        Self {
            feed,
            policy,
            aggregate,
            subscriptions: Category::ALL
                .into_iter()
                .map(|category| (category, Subscription::default()))
                .collect(),
            receiver: None,
        }
    }

    pub fn aggregate(&self) -> &TodayAggregate {
        &self.aggregate
    }

    /// Swap in a freshly fetched aggregate.
    pub fn replace_aggregate(&mut self, aggregate: TodayAggregate) {
        self.aggregate = aggregate;
    }

    pub fn subscription_state(&self, category: Category) -> SubscriptionState {
        self.subscriptions
            .get(&category)
            .map(|subscription| subscription.state)
            .unwrap_or_default()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.policy
            .derive(self.subscriptions.values().map(|subscription| subscription.state))
    }

    /// Open one subscription per category, scoped to the aggregate's date.
    ///
    /// Any live generation is torn down first. A category whose subscribe
    /// call fails is marked disconnected; the others carry on.
    pub async fn subscribe_all(&mut self) {
        self.teardown().await;

        let (sink, receiver) = mpsc::unbounded_channel();
        self.receiver = Some(receiver);
        let today = self.aggregate.today();

        for (category, subscription) in &mut self.subscriptions {
            subscription.state = SubscriptionState::Subscribing;
            match self
                .feed
                .subscribe(*category, vec![date_filter(today)], sink.clone())
                .await
            {
                Ok(handle) => {
                    debug!(table = %category, subscription = %handle, "subscription requested");
                    subscription.handle = Some(handle);
                }
                Err(error) => {
                    warn!(table = %category, error = %error, "subscription failed");
                    subscription.state = SubscriptionState::Disconnected;
                }
            }
        }
        info!(date = %today, state = %self.connection_state(), "change subscriptions opened");
    }

    /// Close every open subscription and drop the current channel.
    ///
    /// Safe to call repeatedly and for subscriptions that never reached
    /// `Subscribed`. Unsubscribe failures are logged.
    pub async fn teardown(&mut self) {
        let mut closed = 0_usize;
        for (category, subscription) in &mut self.subscriptions {
            if let Some(handle) = subscription.handle.take() {
                if let Err(error) = self.feed.unsubscribe(handle).await {
                    warn!(table = %category, subscription = %handle, error = %error, "unsubscribe failed");
                }
                closed += 1;
            }
            subscription.state = SubscriptionState::Idle;
        }
        if self.receiver.take().is_some() || closed > 0 {
            info!(closed, "change subscriptions closed");
        }
    }

    /// Wait for the next message of the current generation and apply it.
    ///
    /// Returns `None` once no generation is open or every sender is gone.
    pub async fn process_next_message(&mut self) -> Option<MergeOutcome> {
        let message = self.receiver.as_mut()?.recv().await?;
        Some(self.handle_message(message))
    }

    /// Apply every message already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(message) = self
            .receiver
            .as_mut()
            .and_then(|receiver| receiver.try_recv().ok())
        {
            self.handle_message(message);
            applied += 1;
        }
        applied
    }

    /// Apply one feed message.
    pub fn handle_message(&mut self, message: FeedMessage) -> MergeOutcome {
        let category = message.category;
        match message.payload {
            FeedPayload::Status(status) => {
                self.apply_status(category, status);
                MergeOutcome::Ignored
            }
            FeedPayload::Change(event) => match self.aggregate.apply(category, &event) {
                Ok(outcome) => {
                    debug!(table = %category, kind = ?event.kind, outcome = ?outcome, "change applied");
                    outcome
                }
                Err(error) => {
                    warn!(table = %category, error = %error, "ignoring undecodable change");
                    MergeOutcome::Ignored
                }
            },
        }
    }

    /// Show a locally written appointment before its echo arrives.
    ///
    /// The echoed row later overwrites the entry like any other update.
    pub fn apply_local(&mut self, appointment: Appointment) -> MergeOutcome {
        let key = appointment.key();
        let outcome = self.aggregate.upsert(appointment);
        debug!(appointment = %key, outcome = ?outcome, "optimistic update applied");
        outcome
    }

    fn apply_status(&mut self, category: Category, status: ChannelStatus) {
        let Some(subscription) = self.subscriptions.get_mut(&category) else {
            return;
        };
        if subscription.state == SubscriptionState::Idle {
            debug!(table = %category, "status for an idle subscription ignored");
            return;
        }
        subscription.state = match status {
            ChannelStatus::Subscribed => {
                info!(table = %category, "subscribed");
                SubscriptionState::Subscribed
            }
            ChannelStatus::ChannelError { message } => {
                warn!(table = %category, error = %message, "change channel failed");
                SubscriptionState::Disconnected
            }
            ChannelStatus::Closed => {
                warn!(table = %category, "change channel closed");
                SubscriptionState::Disconnected
            }
        };
    }
}

#[cfg(test)]
#[path = "realtime_tests.rs"]
mod tests;
