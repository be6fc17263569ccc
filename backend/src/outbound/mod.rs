//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **postgrest**: reqwest-backed `RecordGateway` for a hosted PostgREST API
//! - **memory**: in-process store implementing both ports, echoing writes to
//!   change subscribers
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod memory;
pub mod postgrest;
