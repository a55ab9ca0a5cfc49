use crate::{
    Config, CurrentWeather, Forecast, Location, Units,
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Result limit used when the caller does not pick one.
pub const DEFAULT_GEOCODE_LIMIT: u8 = 5;

/// Classified failure of a provider call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No credential configured; nothing was sent.
    #[error("OpenWeatherMap API key is missing")]
    MissingApiKey,

    /// The provider answered with a non-2xx status.
    #[error("{service} API error: {status} - {message}")]
    Status {
        service: &'static str,
        status: StatusCode,
        message: String,
    },

    /// The request was sent but no response arrived.
    #[error("No response from {service} service. Please check your internet connection.")]
    NoResponse {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The request could not be built.
    #[error("Invalid {service} request: {reason}")]
    Request {
        service: &'static str,
        reason: String,
    },

    /// The body did not match the provider schema.
    #[error("Unexpected {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    /// HTTP status for [`ProviderError::Status`].
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The three provider capabilities the store depends on.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_weather(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeather, ProviderError>;

    async fn forecast(&self, lat: f64, lon: f64, units: Units) -> Result<Forecast, ProviderError>;

    /// Resolve a place name. Zero matches is `Ok(vec![])`.
    async fn geocode(&self, query: &str, limit: u8) -> Result<Vec<Location>, ProviderError>;
}

/// Construct the OpenWeatherMap provider from config.
///
/// A missing API key is not an error here; every call then fails with
/// [`ProviderError::MissingApiKey`] without touching the network.
pub fn provider_from_config(config: &Config) -> Arc<dyn WeatherProvider> {
    Arc::new(OpenWeatherProvider::from_config(&config.openweather))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provider_from_config_fails_every_call_without_api_key() {
        let provider = provider_from_config(&Config::default());

        let err = provider.current_weather(1.0, 2.0, Units::Metric).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));

        let err = provider.forecast(1.0, 2.0, Units::Metric).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));

        let err = provider.geocode("Paris", DEFAULT_GEOCODE_LIMIT).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey));
    }

    #[test]
    fn status_error_message_carries_code_and_provider_text() {
        let err = ProviderError::Status {
            service: "Weather",
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(err.to_string(), "Weather API error: 401 Unauthorized - Invalid API key");
    }
}
