use std::io;

use thiserror::Error;

use crate::locale::{Locale, Text};

/// Failure reported by a geolocation capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("geolocation timed out")]
    Timeout,
}

/// Everything that can stop the dashboard from rendering.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    PositionUnavailable,
    #[error("{0} timed out")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("no location matches '{0}'")]
    NotFound(String),
    #[error("search query is empty")]
    EmptyQuery,
    #[error("{service} responded with {status}")]
    ServiceUnavailable { service: &'static str, status: u16 },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Unexpected(String),
}

/// Coarse classification used to pick the user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
    Network,
    NotFound,
    EmptyQuery,
    ServiceUnavailable,
    Unexpected,
}

impl DashboardError {
    pub fn unexpected<T: Into<String>>(message: T) -> Self {
        DashboardError::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DashboardError::PermissionDenied => ErrorKind::PermissionDenied,
            DashboardError::PositionUnavailable => ErrorKind::PositionUnavailable,
            DashboardError::Timeout(_) => ErrorKind::Timeout,
            DashboardError::Network(_) => ErrorKind::Network,
            DashboardError::NotFound(_) => ErrorKind::NotFound,
            DashboardError::EmptyQuery => ErrorKind::EmptyQuery,
            DashboardError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            DashboardError::Config(_)
            | DashboardError::Io(_)
            | DashboardError::Json(_)
            | DashboardError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Localized message shown in the error view.
    pub fn user_message(&self, locale: Locale) -> &'static str {
        let key = match self.kind() {
            ErrorKind::PermissionDenied => Text::ErrGpsDenied,
            ErrorKind::PositionUnavailable => Text::ErrGpsUnavailable,
            ErrorKind::Timeout => Text::ErrTimeout,
            ErrorKind::Network => Text::ErrNetwork,
            ErrorKind::NotFound => Text::ErrCityNotFound,
            ErrorKind::EmptyQuery => Text::ErrSearchEmpty,
            ErrorKind::ServiceUnavailable => Text::ErrServiceUnavailable,
            ErrorKind::Unexpected => Text::ErrGeneric,
        };
        locale.text(key)
    }
}

impl From<GeolocationError> for DashboardError {
    fn from(value: GeolocationError) -> Self {
        match value {
            GeolocationError::PermissionDenied => DashboardError::PermissionDenied,
            GeolocationError::PositionUnavailable => DashboardError::PositionUnavailable,
            GeolocationError::Timeout => DashboardError::Timeout("geolocation".to_string()),
        }
    }
}

impl From<reqwest::Error> for DashboardError {
    fn from(err: reqwest::Error) -> Self {
        let target = err
            .url()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "request".to_string());

        if err.is_timeout() {
            DashboardError::Timeout(target)
        } else if err.is_decode() {
            DashboardError::Unexpected(format!("malformed response from {target}: {err}"))
        } else if let Some(status) = err.status() {
            DashboardError::ServiceUnavailable {
                service: "upstream",
                status: status.as_u16(),
            }
        } else {
            DashboardError::Network(err.to_string())
        }
    }
}
