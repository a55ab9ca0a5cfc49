use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    config::{DEFAULT_API_URL, DEFAULT_GEO_API_URL, ProviderConfig},
    model::{CurrentWeather, Forecast, Location, Units},
};

use super::{ProviderError, WeatherProvider};

const WEATHER: &str = "Weather";
const FORECAST: &str = "Forecast";
const GEOCODING: &str = "Geocoding";

/// OpenWeatherMap client for current conditions, 5-day forecast and direct geocoding.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    api_url: String,
    geo_api_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_url: DEFAULT_API_URL.to_string(),
            geo_api_url: DEFAULT_GEO_API_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            api_url: trim_base(config.api_url()),
            geo_api_url: trim_base(config.geo_api_url()),
            http: Client::new(),
        }
    }

    /// Point both endpoints somewhere else, e.g. a mock server.
    pub fn with_base_urls(mut self, api_url: &str, geo_api_url: &str) -> Self {
        self.api_url = trim_base(api_url);
        self.geo_api_url = trim_base(geo_api_url);
        self
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    fn coordinate_query(&self, lat: f64, lon: f64, units: Units) -> Result<Vec<(&'static str, String)>, ProviderError> {
        Ok(vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", self.api_key()?.to_string()),
            ("units", units.as_str().to_string()),
        ])
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        url: String,
        query: &[(&'static str, String)],
    ) -> Result<T, ProviderError> {
        debug!(service, %url, "sending provider request");

        let res = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|source| {
                warn!(service, error = %source, "provider request failed");
                classify_send_error(service, source)
            })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| ProviderError::NoResponse { service, source })?;

        if !status.is_success() {
            let message = provider_message(&body);
            warn!(service, %status, %message, "provider returned an error status");
            return Err(ProviderError::Status {
                service,
                status,
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| {
            warn!(service, error = %source, "provider response did not match the expected schema");
            ProviderError::Decode { service, source }
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<CurrentWeather, ProviderError> {
        let query = self.coordinate_query(lat, lon, units)?;
        self.get_json(WEATHER, format!("{}/weather", self.api_url), &query)
            .await
    }

    async fn forecast(&self, lat: f64, lon: f64, units: Units) -> Result<Forecast, ProviderError> {
        let query = self.coordinate_query(lat, lon, units)?;
        self.get_json(FORECAST, format!("{}/forecast", self.api_url), &query)
            .await
    }

    async fn geocode(&self, query: &str, limit: u8) -> Result<Vec<Location>, ProviderError> {
        let api_key = self.api_key()?;

        if query.trim().is_empty() {
            return Err(ProviderError::Request {
                service: GEOCODING,
                reason: "City name is required".to_string(),
            });
        }

        let params = [
            ("q", query.to_string()),
            ("limit", limit.to_string()),
            ("appid", api_key.to_string()),
        ];

        let locations: Vec<Location> = self
            .get_json(GEOCODING, format!("{}/direct", self.geo_api_url), &params)
            .await?;

        if locations.is_empty() {
            debug!(query, "no locations found");
        }

        Ok(locations)
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn classify_send_error(service: &'static str, err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        ProviderError::Request {
            service,
            reason: err.to_string(),
        }
    } else {
        ProviderError::NoResponse {
            service,
            source: err,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// The provider's `message` field, or "Unknown error".
fn provider_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "Unknown error".to_string())
}
