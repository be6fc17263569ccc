//! Desk configuration loaded via OrthoConfig.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{
    ConnectionPolicy, DeskOptions, FetchPolicy, UnknownConnectionPolicy, UnknownFetchPolicy,
};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Errors raised while turning raw settings into usable values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{name} is not configured")]
    Missing { name: &'static str },
    #[error("invalid gateway URL {value}: {message}")]
    InvalidUrl { value: String, message: String },
    #[error(transparent)]
    FetchPolicy(#[from] UnknownFetchPolicy),
    #[error(transparent)]
    ConnectionPolicy(#[from] UnknownConnectionPolicy),
}

/// Connection and behaviour settings for the appointment desk.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "APPOINTMENT_DESK")]
pub struct DeskSettings {
    /// Base URL of the hosted record store.
    pub gateway_url: Option<String>,
    /// Public API key of the hosted record store.
    pub api_key: Option<String>,
    /// `partial` or `all-or-nothing`.
    pub fetch_policy: Option<String>,
    /// `all` or `any`.
    pub connection_policy: Option<String>,
    /// Show successful writes before their change-feed echo arrives.
    #[ortho_config(default = false)]
    pub optimistic_updates: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl DeskSettings {
    /// Parsed gateway base URL.
    ///
    /// # Errors
    /// Returns [`SettingsError`] when the URL is missing or malformed.
    pub fn gateway_url(&self) -> Result<Url, SettingsError> {
        let raw = self
            .gateway_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(SettingsError::Missing {
                name: "gateway_url",
            })?;
        Url::parse(raw).map_err(|error| SettingsError::InvalidUrl {
            value: raw.to_owned(),
            message: error.to_string(),
        })
    }

    /// Configured API key.
    ///
    /// # Errors
    /// Returns [`SettingsError::Missing`] when no key is set.
    pub fn api_key(&self) -> Result<&str, SettingsError> {
        self.api_key
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(SettingsError::Missing { name: "api_key" })
    }

    /// Fetch policy, defaulting to partial.
    ///
    /// # Errors
    /// Returns [`SettingsError::FetchPolicy`] for unknown names.
    pub fn fetch_policy(&self) -> Result<FetchPolicy, SettingsError> {
        Ok(self
            .fetch_policy
            .as_deref()
            .map(str::parse::<FetchPolicy>)
            .transpose()?
            .unwrap_or_default())
    }

    /// Connection policy, defaulting to every category subscribed.
    ///
    /// # Errors
    /// Returns [`SettingsError::ConnectionPolicy`] for unknown names.
    pub fn connection_policy(&self) -> Result<ConnectionPolicy, SettingsError> {
        Ok(self
            .connection_policy
            .as_deref()
            .map(str::parse::<ConnectionPolicy>)
            .transpose()?
            .unwrap_or_default())
    }

    /// Request timeout, falling back to the default.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    /// Desk behaviour switches.
    ///
    /// # Errors
    /// Returns [`SettingsError`] when a policy name is unknown.
    pub fn desk_options(&self) -> Result<DeskOptions, SettingsError> {
        Ok(DeskOptions {
            fetch_policy: self.fetch_policy()?,
            connection_policy: self.connection_policy()?,
            optimistic_updates: self.optimistic_updates,
        })
    }
}
