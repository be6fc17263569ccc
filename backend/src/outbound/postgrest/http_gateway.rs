//! Reqwest-backed PostgREST record gateway.
//!
//! This adapter owns transport details only: URL and header construction,
//! timeout and HTTP error mapping, and JSON decoding of result rows.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde_json::{Map, Value};
use tracing::debug;

use super::query::{apply_id_selector, apply_query};
use crate::domain::ports::{GatewayError, RecordGateway, RecordQuery};

const REST_PREFIX: [&str; 2] = ["rest", "v1"];
const DEFAULT_USER_AGENT: &str = "appointment-desk/0.1";

/// Project credentials sent with every request.
#[derive(Clone)]
pub struct PostgrestCredentials {
    /// Public API key; sent as `apikey` and as the bearer token.
    pub api_key: String,
}

impl std::fmt::Debug for PostgrestCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestCredentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Record gateway issuing PostgREST requests against one project URL.
pub struct PostgrestGateway {
    client: Client,
    base_url: Url,
}

impl PostgrestGateway {
    /// Build a gateway using a reqwest client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the API key is not a valid header value or the
    /// reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        credentials: &PostgrestCredentials,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(default_headers(credentials)?)
            .build()
            .map_err(map_transport_error)?;
        Ok(Self { client, base_url })
    }

    fn table_url(&self, table: &str) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::transport(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(REST_PREFIX)
            .push(table);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

#[async_trait]
impl RecordGateway for PostgrestGateway {
    async fn query(&self, query: &RecordQuery) -> Result<Vec<Value>, GatewayError> {
        let mut url = self.table_url(&query.table)?;
        apply_query(&mut url, query);
        debug!(table = %query.table, url = %url, "querying records");

        let response = self.send(self.client.get(url)).await?;
        let body = response.bytes().await.map_err(map_transport_error)?;
        parse_rows(body.as_ref())
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        patch: &Map<String, Value>,
    ) -> Result<(), GatewayError> {
        let mut url = self.table_url(table)?;
        apply_id_selector(&mut url, id);
        debug!(table, id, "updating record");

        self.send(
            self.client
                .patch(url)
                .header("Prefer", "return=minimal")
                .json(patch),
        )
        .await
        .map(drop)
    }

    async fn insert(&self, table: &str, record: &Value) -> Result<(), GatewayError> {
        let url = self.table_url(table)?;
        debug!(table, "inserting record");

        self.send(
            self.client
                .post(url)
                .header("Prefer", "return=minimal")
                .json(record),
        )
        .await
        .map(drop)
    }
}

fn default_headers(credentials: &PostgrestCredentials) -> Result<HeaderMap, GatewayError> {
    let invalid_key = |_| GatewayError::transport("API key is not a valid header value");
    let mut api_key = HeaderValue::from_str(&credentials.api_key).map_err(invalid_key)?;
    api_key.set_sensitive(true);
    let mut bearer =
        HeaderValue::from_str(&format!("Bearer {}", credentials.api_key)).map_err(invalid_key)?;
    bearer.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static("apikey"), api_key);
    headers.insert(AUTHORIZATION, bearer);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

fn parse_rows(body: &[u8]) -> Result<Vec<Value>, GatewayError> {
    serde_json::from_slice(body)
        .map_err(|error| GatewayError::decode(format!("expected a JSON array of rows: {error}")))
}

fn map_transport_error(error: reqwest::Error) -> GatewayError {
    GatewayError::transport(error.to_string())
}

fn map_status_error(status: StatusCode, body: &[u8]) -> GatewayError {
    let message = error_message(body).unwrap_or_else(|| body_preview(body));
    GatewayError::rejected(status.as_u16(), message)
}

/// PostgREST error bodies carry a `message` field; prefer it when present.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("message")?.as_str().map(str::to_owned)
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
