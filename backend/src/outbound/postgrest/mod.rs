//! PostgREST outbound adapter.
//!
//! This module provides a thin HTTP implementation of the `RecordGateway`
//! port for hosted stores exposing a PostgREST surface under `/rest/v1`.

mod http_gateway;
mod query;

pub use http_gateway::{PostgrestCredentials, PostgrestGateway};
