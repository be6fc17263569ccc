//! In-process record store implementing both gateway ports.
//!
//! Every write through [`RecordGateway`] is echoed to the change subscribers
//! of the written table, mirroring how a hosted store's change stream
//! reflects committed writes back to every listening client. An update is
//! delivered when either the old or the new row matches the subscription
//! filters, so a row moving out of a filtered window is still observed.
//! Deletes carry only the key and reach every subscriber of the table.
//!
//! Failure switches let tests simulate unavailable tables and channels.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::ports::{
    ChangeEvent, ChangeFeed, ChangeKind, ChannelStatus, FeedMessage, FeedSink, Filter,
    GatewayError, RecordGateway, RecordQuery, SubscriptionHandle,
};
use crate::domain::{Category, record_id};

struct Subscriber {
    handle: SubscriptionHandle,
    filters: Vec<Filter>,
    sink: FeedSink,
}

impl Subscriber {
    fn wants(&self, row: &Value) -> bool {
        self.filters.iter().all(|filter| filter.matches(row))
    }
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Vec<Value>>,
    subscribers: Vec<Subscriber>,
    failing_tables: BTreeSet<String>,
    failing_feeds: BTreeSet<Category>,
}

impl State {
    fn check_table(&self, table: &str) -> Result<(), GatewayError> {
        if self.failing_tables.contains(table) {
            Err(GatewayError::rejected(503_u16, format!("{table} is unavailable")))
        } else {
            Ok(())
        }
    }

    fn publish(&mut self, table: &str, event: &ChangeEvent) {
        let Ok(category) = table.parse::<Category>() else {
            return;
        };
        self.subscribers.retain(|subscriber| !subscriber.sink.is_closed());
        for subscriber in &self.subscribers {
            if subscriber.handle.category() != category {
                continue;
            }
            let wanted = event.kind == ChangeKind::Delete
                || [&event.new_record, &event.old_record]
                    .into_iter()
                    .flatten()
                    .any(|row| subscriber.wants(row));
            if wanted
                && subscriber
                    .sink
                    .send(FeedMessage::change(category, event.clone()))
                    .is_err()
            {
                debug!(subscription = %subscriber.handle, "subscriber went away mid-publish");
            }
        }
    }
}

/// Shared in-memory store and change feed.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load rows without notifying subscribers.
    pub fn seed<I>(&self, table: &str, rows: I)
    where
        I: IntoIterator<Item = Value>,
    {
        self.state()
            .tables
            .entry(table.to_owned())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// Delete a row as another client would, echoing the delete.
    ///
    /// The echoed old row carries only the primary key.
    pub fn delete(&self, table: &str, id: &str) -> bool {
        let mut state = self.state();
        let removed = state.tables.get_mut(table).is_some_and(|rows| {
            let before = rows.len();
            rows.retain(|row| record_id(row).as_deref() != Some(id));
            rows.len() != before
        });
        if removed {
            let event = ChangeEvent::delete(serde_json::json!({ "id": id }));
            state.publish(table, &event);
        }
        removed
    }

    /// Make every query and write against `table` fail.
    pub fn fail_table(&self, table: &str) {
        self.state().failing_tables.insert(table.to_owned());
    }

    /// Make new subscriptions for `category` fail.
    pub fn fail_subscriptions(&self, category: Category) {
        self.state().failing_feeds.insert(category);
    }

    /// Clear every failure switch.
    pub fn heal(&self) {
        let mut state = self.state();
        state.failing_tables.clear();
        state.failing_feeds.clear();
    }

    /// Report a channel error on every open subscription for `category`.
    pub fn break_channel(&self, category: Category, message: &str) {
        let state = self.state();
        for subscriber in &state.subscribers {
            if subscriber.handle.category() == category {
                let status = ChannelStatus::ChannelError {
                    message: message.to_owned(),
                };
                if subscriber.sink.send(FeedMessage::status(category, status)).is_err() {
                    debug!(subscription = %subscriber.handle, "subscriber went away");
                }
            }
        }
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state().subscribers.len()
    }
}

#[async_trait]
impl RecordGateway for InMemoryBackend {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Value>, GatewayError> {
        let state = self.state();
        state.check_table(&query.table)?;

        let mut rows: Vec<Value> = state
            .tables
            .get(&query.table)
            .into_iter()
            .flatten()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        if let Some(order) = &query.order {
            rows.sort_by(|left, right| {
                let ordering = compare_column(left, right, &order.column);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.check_table(table)?;

        let Some(row) = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| record_id(row).as_deref() == Some(id)))
        else {
            debug!(table, id, "update matched no row");
            return Ok(());
        };
        let old_row = row.clone();
        if let Value::Object(fields) = &mut *row {
            for (column, value) in patch {
                fields.insert(column.clone(), value.clone());
            }
        }
        let event = ChangeEvent {
            kind: ChangeKind::Update,
            new_record: Some(row.clone()),
            old_record: Some(old_row),
        };
        state.publish(table, &event);
        Ok(())
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<(), GatewayError> {
        let mut state = self.state();
        state.check_table(table)?;

        state
            .tables
            .entry(table.to_owned())
            .or_default()
            .push(record.clone());
        state.publish(table, &ChangeEvent::insert(record.clone()));
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn subscribe(
        &self,
        category: Category,
        filters: Vec<Filter>,
        sink: FeedSink,
    ) -> Result<SubscriptionHandle, GatewayError> {
        let mut state = self.state();
        if state.failing_feeds.contains(&category) {
            return Err(GatewayError::subscription(format!(
                "{category} channel refused"
            )));
        }

        let handle = SubscriptionHandle::new(category);
        if sink
            .send(FeedMessage::status(category, ChannelStatus::Subscribed))
            .is_err()
        {
            debug!(subscription = %handle, "sink closed before subscription was reported");
        }
        state.subscribers.push(Subscriber {
            handle,
            filters,
            sink,
        });
        Ok(handle)
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), GatewayError> {
        self.state()
            .subscribers
            .retain(|subscriber| subscriber.handle != handle);
        Ok(())
    }
}

/// Compare two rows by one column; nulls and missing values sort last.
fn compare_column(left: &Value, right: &Value, column: &str) -> Ordering {
    let key = |row: &Value| match row.get(column) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };
    match (key(left), key(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
