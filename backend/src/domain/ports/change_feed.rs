//! Port for per-table change subscriptions.
//!
//! Adapters push [`FeedMessage`]s into the sink supplied at subscribe time:
//! first a [`ChannelStatus`] once the channel is live (or has failed), then
//! one [`ChangeEvent`] per committed insert or update that matches the
//! subscription filters. Deletes cannot be filtered and reach every
//! subscription of the table. Within one subscription messages arrive in
//! commit order; nothing is promised across subscriptions.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;
use uuid::Uuid;

use super::{Filter, GatewayError};
use crate::domain::Category;

/// Kind of row change carried by a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change.
///
/// `new_record` is present for inserts and updates; `old_record` is present
/// for deletes and may only carry the primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub new_record: Option<Value>,
    pub old_record: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(record: Value) -> Self {
        Self {
            kind: ChangeKind::Insert,
            new_record: Some(record),
            old_record: None,
        }
    }

    pub fn update(record: Value) -> Self {
        Self {
            kind: ChangeKind::Update,
            new_record: Some(record),
            old_record: None,
        }
    }

    pub fn delete(old_record: Value) -> Self {
        Self {
            kind: ChangeKind::Delete,
            new_record: None,
            old_record: Some(old_record),
        }
    }
}

/// Lifecycle report for a subscription channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The channel is live and will deliver changes.
    Subscribed,
    /// The channel failed to open or dropped.
    ChannelError { message: String },
    /// The store closed the channel.
    Closed,
}

/// Payload of a [`FeedMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum FeedPayload {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// Message delivered by a change feed for one category table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMessage {
    pub category: Category,
    pub payload: FeedPayload,
}

impl FeedMessage {
    pub fn status(category: Category, status: ChannelStatus) -> Self {
        Self {
            category,
            payload: FeedPayload::Status(status),
        }
    }

    pub fn change(category: Category, event: ChangeEvent) -> Self {
        Self {
            category,
            payload: FeedPayload::Change(event),
        }
    }
}

/// Channel that receives feed messages.
pub type FeedSink = UnboundedSender<FeedMessage>;

/// Opaque handle identifying one open subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: Uuid,
    category: Category,
}

impl SubscriptionHandle {
    /// Mint a fresh handle for `category`.
    pub fn new(category: Category) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.category, self.id)
    }
}

/// Port for subscribing to row changes of a category table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription for rows of `category` matching `filters`.
    ///
    /// Channel status and change events for the subscription are pushed into
    /// `sink`, tagged with `category`.
    async fn subscribe(
        &self,
        category: Category,
        filters: Vec<Filter>,
        sink: FeedSink,
    ) -> Result<SubscriptionHandle, GatewayError>;

    /// Close a subscription. Closing an unknown or already closed handle
    /// succeeds.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), GatewayError>;
}

/// Fixture feed that reports every subscription live and never emits changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixtureChangeFeed;

#[async_trait]
impl ChangeFeed for FixtureChangeFeed {
    async fn subscribe(
        &self,
        category: Category,
        _filters: Vec<Filter>,
        sink: FeedSink,
    ) -> Result<SubscriptionHandle, GatewayError> {
        if sink
            .send(FeedMessage::status(category, ChannelStatus::Subscribed))
            .is_err()
        {
            debug!(table = %category, "feed sink closed before subscription was reported");
        }
        Ok(SubscriptionHandle::new(category))
    }

    async fn unsubscribe(&self, _handle: SubscriptionHandle) -> Result<(), GatewayError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.

    use rstest::rstest;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    #[rstest]
    #[tokio::test]
    async fn fixture_reports_subscribed_immediately() {
        let (sink, mut messages) = mpsc::unbounded_channel();

        let handle = FixtureChangeFeed
            .subscribe(Category::Youth, Vec::new(), sink)
            .await
            .expect("fixture subscribe succeeds");

        assert_eq!(handle.category(), Category::Youth);
        assert_eq!(
            messages.recv().await,
            Some(FeedMessage::status(Category::Youth, ChannelStatus::Subscribed))
        );
    }

    #[rstest]
    fn handles_are_unique_per_subscription() {
        let first = SubscriptionHandle::new(Category::Pwd);
        let second = SubscriptionHandle::new(Category::Pwd);
        assert_ne!(first, second);
    }

    #[rstest]
    fn delete_events_carry_only_the_old_row() {
        let event = ChangeEvent::delete(json!({ "id": 99 }));
        assert_eq!(event.kind, ChangeKind::Delete);
        assert!(event.new_record.is_none());
        assert_eq!(event.old_record, Some(json!({ "id": 99 })));
    }
}
