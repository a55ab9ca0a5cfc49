//! Core library for the weather dashboard.
//!
//! This crate defines:
//! - The application state store and its actions
//! - The OpenWeatherMap provider client behind a trait
//! - Display preferences and their resolution against the environment
//! - Durable key-value storage, configuration, derived forecast views
//!
//! It is used by `dashboard-cli`, but can also back other front ends.

pub mod config;
pub mod format;
pub mod model;
pub mod preferences;
pub mod provider;
pub mod storage;
pub mod store;
pub mod view;

pub use config::{Config, ProviderConfig};
pub use model::{CurrentWeather, Forecast, ForecastEntry, Location, Units, WeatherCategory};
pub use preferences::{
    Appearance, ContrastMode, EnvironmentSignals, FixedEnvironment, MotionPreference,
    PreferenceStore, Preferences, ThemeMode, ThemeStyle,
};
pub use provider::{ProviderError, WeatherProvider, provider_from_config};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use store::{AppState, WeatherStore};
