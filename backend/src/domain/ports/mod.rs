//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod change_feed;
mod record_gateway;

#[cfg(test)]
pub use change_feed::MockChangeFeed;
pub use change_feed::{
    ChangeEvent, ChangeFeed, ChangeKind, ChannelStatus, FeedMessage, FeedPayload, FeedSink,
    FixtureChangeFeed, SubscriptionHandle,
};
#[cfg(test)]
pub use record_gateway::MockRecordGateway;
pub use record_gateway::{
    Filter, FixtureRecordGateway, GatewayError, OrderBy, RecordGateway, RecordQuery,
};
