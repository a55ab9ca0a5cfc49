//! Application state store.
//!
//! [`WeatherStore`] owns the dashboard state and is its only mutator. Readers
//! take a [`WeatherStore::snapshot`] or [`WeatherStore::subscribe`] to changes.
//! The store is a cheap handle around shared state: clones observe and mutate
//! the same instance, while separate [`WeatherStore::new`] calls are fully
//! independent.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    model::{CurrentWeather, Forecast, Location, Units},
    provider::{DEFAULT_GEOCODE_LIMIT, WeatherProvider},
    storage::{FAVORITES_KEY, KeyValueStore, RECENT_SEARCHES_KEY, load_json, save_json},
};

pub const MAX_RECENT_SEARCHES: usize = 5;
pub const MAX_FAVORITES: usize = 10;

pub const SEARCH_FAILED_MESSAGE: &str = "Failed to search locations. Please try again.";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch weather data. Please try again.";

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub current_weather: Option<CurrentWeather>,
    pub forecast: Option<Forecast>,
    pub search_results: Vec<Location>,
    pub selected_location: Option<Location>,
    pub units: Units,
    pub recent_searches: Vec<String>,
    pub favorites: Vec<Location>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AppState {
    pub fn is_favorite(&self, location: &Location) -> bool {
        self.favorites.iter().any(|f| f.same_place(location))
    }
}

#[derive(Debug)]
struct Inner {
    provider: Arc<dyn WeatherProvider>,
    storage: Arc<dyn KeyValueStore>,
    state: watch::Sender<AppState>,
    runtime: Option<Handle>,
    search_seq: AtomicU64,
    fetch_seq: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct WeatherStore {
    inner: Arc<Inner>,
}

impl WeatherStore {
    /// Create a store with recent searches and favorites hydrated from `storage`.
    ///
    /// When called inside a Tokio runtime, background fetches are spawned on
    /// that runtime, so the store can be driven from any thread afterwards.
    pub fn new(provider: Arc<dyn WeatherProvider>, storage: Arc<dyn KeyValueStore>) -> Self {
        let state = AppState {
            recent_searches: hydrate(storage.as_ref(), RECENT_SEARCHES_KEY),
            favorites: hydrate(storage.as_ref(), FAVORITES_KEY),
            ..AppState::default()
        };

        let (tx, _rx) = watch::channel(state);

        Self {
            inner: Arc::new(Inner {
                provider,
                storage,
                state: tx,
                runtime: Handle::try_current().ok(),
                search_seq: AtomicU64::new(0),
                fetch_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn snapshot(&self) -> AppState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.inner.state.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut AppState)) {
        self.inner.state.send_modify(f);
    }

    fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.inner.state.borrow())
    }

    /// Geocode `query` into `search_results`.
    ///
    /// A blank query only clears the results. If a newer search starts before
    /// this one resolves, this one's outcome is dropped.
    pub async fn search_locations(&self, query: &str) {
        if query.trim().is_empty() {
            self.update(|s| s.search_results.clear());
            return;
        }

        let token = self.inner.search_seq.fetch_add(1, Ordering::SeqCst) + 1;

        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let result = self
            .inner
            .provider
            .geocode(query, DEFAULT_GEOCODE_LIMIT)
            .await;

        if self.inner.search_seq.load(Ordering::SeqCst) != token {
            debug!(query, "discarding superseded search response");
            return;
        }

        match result {
            Ok(locations) => {
                info!(query, count = locations.len(), "location search finished");
                self.update(|s| {
                    s.search_results = locations;
                    s.is_loading = false;
                });
            }
            Err(err) => {
                warn!(query, status = ?err.status(), error = %err, "location search failed");
                self.update(|s| {
                    s.error = Some(SEARCH_FAILED_MESSAGE.to_string());
                    s.is_loading = false;
                    s.search_results.clear();
                });
            }
        }
    }

    /// Make `location` the selected one and refresh its weather.
    ///
    /// The refresh runs on the Tokio runtime; drop the handle to fire and
    /// forget, or await it to wait for the fetch to settle.
    ///
    /// # Panics
    ///
    /// If the store was created outside a Tokio runtime and this is also
    /// called outside one.
    pub fn select_location(&self, location: Location) -> JoinHandle<()> {
        let name = location.name.clone();

        self.update(|s| {
            s.selected_location = Some(location);
            s.search_results.clear();
        });

        self.add_to_recent_searches(&name);
        self.spawn_fetch()
    }

    fn spawn_fetch(&self) -> JoinHandle<()> {
        let store = self.clone();
        let task = async move { store.fetch_weather_data().await };

        match &self.inner.runtime {
            Some(runtime) => runtime.spawn(task),
            None => tokio::spawn(task),
        }
    }

    /// Fetch current conditions and forecast for the selected location.
    ///
    /// Both requests run concurrently and both must succeed; on any failure
    /// the previous weather and forecast stay in place.
    pub async fn fetch_weather_data(&self) {
        let Some((location, units)) = self.read(|s| {
            s.selected_location
                .clone()
                .map(|location| (location, s.units))
        }) else {
            return;
        };

        let token = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;

        self.update(|s| {
            s.is_loading = true;
            s.error = None;
        });

        let provider = &self.inner.provider;
        let (current, forecast) = tokio::join!(
            provider.current_weather(location.lat, location.lon, units),
            provider.forecast(location.lat, location.lon, units),
        );

        if self.inner.fetch_seq.load(Ordering::SeqCst) != token {
            debug!(
                lat = location.lat,
                lon = location.lon,
                "discarding superseded weather response"
            );
            return;
        }

        match (current, forecast) {
            (Ok(current), Ok(forecast)) => {
                info!(
                    location = %location.name,
                    %units,
                    entries = forecast.list.len(),
                    "weather data refreshed"
                );
                self.update(|s| {
                    s.current_weather = Some(current);
                    s.forecast = Some(forecast);
                    s.is_loading = false;
                });
            }
            (current, forecast) => {
                if let Err(err) = &current {
                    warn!(
                        location = %location.name,
                        status = ?err.status(),
                        error = %err,
                        "current weather request failed"
                    );
                }
                if let Err(err) = &forecast {
                    warn!(
                        location = %location.name,
                        status = ?err.status(),
                        error = %err,
                        "forecast request failed"
                    );
                }
                self.update(|s| {
                    s.error = Some(FETCH_FAILED_MESSAGE.to_string());
                    s.is_loading = false;
                });
            }
        }
    }

    /// Switch unit system; returns the refresh handle when a location is selected.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`WeatherStore::select_location`].
    pub fn set_units(&self, units: Units) -> Option<JoinHandle<()>> {
        self.update(|s| s.units = units);

        self.read(|s| s.selected_location.is_some())
            .then(|| self.spawn_fetch())
    }

    pub fn clear_error(&self) {
        self.inner
            .state
            .send_if_modified(|s| s.error.take().is_some());
    }

    /// Move-to-front insert, capped at [`MAX_RECENT_SEARCHES`].
    pub fn add_to_recent_searches(&self, city_name: &str) {
        self.update(|s| {
            s.recent_searches.retain(|name| name != city_name);
            s.recent_searches.insert(0, city_name.to_string());
            s.recent_searches.truncate(MAX_RECENT_SEARCHES);
        });

        let recent = self.read(|s| s.recent_searches.clone());
        self.persist(RECENT_SEARCHES_KEY, &recent);
    }

    /// Append unless the coordinates are already a favorite; the oldest
    /// favorite is evicted past [`MAX_FAVORITES`].
    pub fn add_to_favorites(&self, location: Location) {
        let added = self.inner.state.send_if_modified(|s| {
            if s.is_favorite(&location) {
                return false;
            }
            s.favorites.push(location);
            if s.favorites.len() > MAX_FAVORITES {
                let excess = s.favorites.len() - MAX_FAVORITES;
                s.favorites.drain(..excess);
            }
            true
        });

        if added {
            let favorites = self.read(|s| s.favorites.clone());
            self.persist(FAVORITES_KEY, &favorites);
        }
    }

    /// Remove favorites whose `"{lat}-{lon}"` id equals `location_id`.
    pub fn remove_from_favorites(&self, location_id: &str) {
        self.update(|s| s.favorites.retain(|f| f.id() != location_id));

        let favorites = self.read(|s| s.favorites.clone());
        self.persist(FAVORITES_KEY, &favorites);
    }

    /// Override the loading flag directly, bypassing the fetch flow.
    pub fn set_loading_state(&self, is_loading: bool) {
        self.update(|s| s.is_loading = is_loading);
    }

    fn persist<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(err) = save_json(self.inner.storage.as_ref(), key, value) {
            warn!(key, error = %err, "failed to persist state");
        }
    }
}

fn hydrate<T: serde::de::DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Vec<T> {
    match load_json(storage, key) {
        Ok(value) => value.unwrap_or_default(),
        Err(err) => {
            warn!(key, error = %err, "ignoring unreadable stored value");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{City, Condition, Coord, ForecastEntry, MainReadings, Sys, Wind},
        provider::ProviderError,
        storage::MemoryStore,
    };
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::{
        collections::HashMap,
        sync::Mutex,
    };
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Current(f64, f64, Units),
        Forecast(f64, f64, Units),
        Geocode(String, u8),
    }

    #[derive(Debug, Default)]
    struct FakeProvider {
        places: Mutex<HashMap<String, Vec<Location>>>,
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
        weather_gates: Mutex<HashMap<Units, oneshot::Receiver<()>>>,
        calls: Mutex<Vec<Call>>,
        fail_geocode: Mutex<bool>,
        fail_current: Mutex<bool>,
        fail_forecast: Mutex<bool>,
        temp: Mutex<f64>,
    }

    impl FakeProvider {
        fn new() -> Arc<Self> {
            let fake = Self::default();
            fake.set_temp(18.0);
            Arc::new(fake)
        }

        fn with_place(self: Arc<Self>, query: &str, locations: Vec<Location>) -> Arc<Self> {
            self.places.lock().unwrap().insert(query.to_string(), locations);
            self
        }

        /// Hold the next geocode of `query` until the returned sender fires.
        fn gate(&self, query: &str) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().insert(query.to_string(), rx);
            tx
        }

        /// Hold the next current-weather request in `units` until the
        /// returned sender fires. Readings are taken before waiting.
        fn gate_weather(&self, units: Units) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.weather_gates.lock().unwrap().insert(units, rx);
            tx
        }

        fn set_temp(&self, temp: f64) {
            *self.temp.lock().unwrap() = temp;
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn clear_calls(&self) {
            self.calls.lock().unwrap().clear();
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn fail(flag: &Mutex<bool>) -> bool {
            *flag.lock().unwrap()
        }
    }

    fn provider_down(service: &'static str) -> ProviderError {
        ProviderError::Request {
            service,
            reason: "simulated failure".into(),
        }
    }

    fn readings(temp: f64) -> MainReadings {
        MainReadings {
            temp,
            feels_like: temp - 1.0,
            temp_min: temp - 2.0,
            temp_max: temp + 2.0,
            pressure: 1013.0,
            humidity: 60,
        }
    }

    fn clear_sky() -> Vec<Condition> {
        vec![Condition {
            id: 800,
            main: "Clear".into(),
            description: "clear sky".into(),
            icon: "01d".into(),
        }]
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn current_weather(
            &self,
            lat: f64,
            lon: f64,
            units: Units,
        ) -> Result<CurrentWeather, ProviderError> {
            self.record(Call::Current(lat, lon, units));
            let temp = *self.temp.lock().unwrap();
            let gate = self.weather_gates.lock().unwrap().remove(&units);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if Self::fail(&self.fail_current) {
                return Err(provider_down("Weather"));
            }
            Ok(CurrentWeather {
                coord: Coord { lat, lon },
                weather: clear_sky(),
                main: readings(temp),
                visibility: Some(10_000),
                wind: Wind { speed: 3.5, deg: 180.0, gust: None },
                clouds: None,
                rain: None,
                dt: 1_700_000_000,
                sys: Sys { country: Some("FR".into()), sunrise: 1_699_990_000, sunset: 1_700_030_000 },
                timezone: 3600,
                name: "Paris".into(),
            })
        }

        async fn forecast(&self, lat: f64, lon: f64, units: Units) -> Result<Forecast, ProviderError> {
            self.record(Call::Forecast(lat, lon, units));
            if Self::fail(&self.fail_forecast) {
                return Err(provider_down("Forecast"));
            }
            let temp = *self.temp.lock().unwrap();
            Ok(Forecast {
                list: (0..8)
                    .map(|i| ForecastEntry {
                        dt: 1_700_000_000 + i * 10_800,
                        main: readings(temp + i as f64),
                        weather: clear_sky(),
                        wind: Wind { speed: 2.0, deg: 90.0, gust: None },
                        visibility: None,
                        pop: 0.1,
                        rain: None,
                        dt_txt: None,
                    })
                    .collect(),
                city: City {
                    name: "Paris".into(),
                    country: "FR".into(),
                    coord: Coord { lat, lon },
                    timezone: 3600,
                    sunrise: 0,
                    sunset: 0,
                },
            })
        }

        async fn geocode(&self, query: &str, limit: u8) -> Result<Vec<Location>, ProviderError> {
            self.record(Call::Geocode(query.to_string(), limit));
            let gate = self.gates.lock().unwrap().remove(query);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            if Self::fail(&self.fail_geocode) {
                return Err(provider_down("Geocoding"));
            }
            Ok(self.places.lock().unwrap().get(query).cloned().unwrap_or_default())
        }
    }

    fn paris() -> Location {
        Location::new("Paris", "FR", 48.8566, 2.3522)
    }

    fn london() -> Location {
        Location::new("London", "GB", 51.5074, -0.1278)
    }

    fn store_with(fake: &Arc<FakeProvider>) -> (WeatherStore, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        let store = WeatherStore::new(fake.clone(), storage.clone());
        (store, storage)
    }

    fn offline_store() -> WeatherStore {
        store_with(&FakeProvider::new()).0
    }

    #[test]
    fn new_store_starts_empty() {
        let state = offline_store().snapshot();
        assert_eq!(state, AppState::default());
        assert_eq!(state.units, Units::Metric);
    }

    #[test]
    fn new_store_hydrates_durable_lists() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(RECENT_SEARCHES_KEY, r#"["Oslo","Rome"]"#).unwrap();
        save_json(storage.as_ref(), FAVORITES_KEY, &vec![paris()]).unwrap();

        let store = WeatherStore::new(FakeProvider::new(), storage);
        let state = store.snapshot();
        assert_eq!(state.recent_searches, vec!["Oslo", "Rome"]);
        assert_eq!(state.favorites, vec![paris()]);
    }

    #[test]
    fn corrupt_stored_values_hydrate_as_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(RECENT_SEARCHES_KEY, "{oops").unwrap();
        storage.set(FAVORITES_KEY, r#"[{"name": 3}]"#).unwrap();

        let state = WeatherStore::new(FakeProvider::new(), storage).snapshot();
        assert!(state.recent_searches.is_empty());
        assert!(state.favorites.is_empty());
    }

    #[test]
    fn separate_stores_are_independent() {
        let a = offline_store();
        let b = offline_store();
        a.add_to_recent_searches("Paris");
        assert!(b.snapshot().recent_searches.is_empty());
    }

    #[test]
    fn recent_searches_move_to_front_and_cap() {
        let (store, storage) = store_with(&FakeProvider::new());
        for name in ["A", "B", "C", "D", "E", "F"] {
            store.add_to_recent_searches(name);
        }
        assert_eq!(store.snapshot().recent_searches, vec!["F", "E", "D", "C", "B"]);

        store.add_to_recent_searches("C");
        assert_eq!(store.snapshot().recent_searches, vec!["C", "F", "E", "D", "B"]);

        let stored: Vec<String> = load_json(storage.as_ref(), RECENT_SEARCHES_KEY).unwrap().unwrap();
        assert_eq!(stored, vec!["C", "F", "E", "D", "B"]);
    }

    #[test]
    fn duplicate_favorite_is_a_no_op() {
        let (store, storage) = store_with(&FakeProvider::new());
        store.add_to_favorites(paris());
        store.add_to_favorites(london());

        let mut renamed = paris();
        renamed.name = "Paris (again)".into();
        store.add_to_favorites(renamed);

        assert_eq!(store.snapshot().favorites, vec![paris(), london()]);
        let stored: Vec<Location> = load_json(storage.as_ref(), FAVORITES_KEY).unwrap().unwrap();
        assert_eq!(stored, vec![paris(), london()]);
    }

    #[test]
    fn favorites_evict_oldest_past_cap() {
        let store = offline_store();
        for i in 0..12 {
            store.add_to_favorites(Location::new(format!("City {i}"), "XX", i as f64, 0.0));
        }

        let favorites = store.snapshot().favorites;
        assert_eq!(favorites.len(), MAX_FAVORITES);
        assert_eq!(favorites[0].name, "City 2");
        assert_eq!(favorites[9].name, "City 11");
    }

    #[test]
    fn remove_from_favorites_matches_exact_id() {
        let (store, storage) = store_with(&FakeProvider::new());
        store.add_to_favorites(Location::new("Exact", "XX", 12.34, 56.78));
        store.add_to_favorites(Location::new("Near", "XX", 12.34, 56.781));
        store.add_to_favorites(Location::new("Other", "XX", 12.3, 56.78));

        store.remove_from_favorites("12.34-56.78");

        let names: Vec<String> = store.snapshot().favorites.into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Near", "Other"]);
        let stored: Vec<Location> = load_json(storage.as_ref(), FAVORITES_KEY).unwrap().unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn negative_zero_favorite_is_removed_by_plain_zero_id() {
        let store = offline_store();
        store.add_to_favorites(Location::new("Null Island", "XX", -0.0, 0.0));
        store.add_to_favorites(Location::new("Null Island", "XX", 0.0, 0.0));
        assert_eq!(store.snapshot().favorites.len(), 1);

        store.remove_from_favorites("0-0");
        assert!(store.snapshot().favorites.is_empty());
    }

    #[tokio::test]
    async fn blank_search_clears_results_without_calling_provider() {
        let fake = FakeProvider::new().with_place("Paris", vec![paris()]);
        let (store, _) = store_with(&fake);

        store.search_locations("Paris").await;
        assert_eq!(store.snapshot().search_results.len(), 1);
        fake.clear_calls();

        let mut rx = store.subscribe();
        store.search_locations("   ").await;

        assert!(rx.has_changed().unwrap());
        let seen = rx.borrow_and_update().clone();
        assert!(seen.search_results.is_empty());
        assert!(!seen.is_loading);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_search_never_touches_loading_flag() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        let mut rx = store.subscribe();

        store.search_locations("  ").await;
        assert!(!rx.borrow_and_update().is_loading);

        store.set_loading_state(true);
        store.search_locations("\t").await;
        assert!(rx.borrow_and_update().is_loading);

        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_search_leaves_error_alone() {
        let fake = FakeProvider::new();
        *fake.fail_geocode.lock().unwrap() = true;
        let (store, _) = store_with(&fake);

        store.search_locations("Atlantis").await;
        store.search_locations("").await;
        assert_eq!(store.snapshot().error.as_deref(), Some(SEARCH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn search_uses_default_limit_and_accepts_empty_results() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);

        store.search_locations("Nowhere").await;

        let state = store.snapshot();
        assert!(state.search_results.is_empty());
        assert!(state.error.is_none());
        assert!(!state.is_loading);
        assert_eq!(fake.calls(), vec![Call::Geocode("Nowhere".into(), DEFAULT_GEOCODE_LIMIT)]);
    }

    #[tokio::test]
    async fn failed_search_sets_message_and_clears_results() {
        let fake = FakeProvider::new().with_place("Paris", vec![paris()]);
        let (store, _) = store_with(&fake);
        store.search_locations("Paris").await;

        *fake.fail_geocode.lock().unwrap() = true;
        store.search_locations("Paris").await;

        let state = store.snapshot();
        assert_eq!(state.error.as_deref(), Some(SEARCH_FAILED_MESSAGE));
        assert!(state.search_results.is_empty());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn superseded_search_response_is_discarded() {
        let fake = FakeProvider::new()
            .with_place("Paris", vec![paris()])
            .with_place("London", vec![london()]);
        let (store, _) = store_with(&fake);

        let release = fake.gate("Paris");
        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.search_locations("Paris").await }
        });
        while fake.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        store.search_locations("London").await;
        release.send(()).unwrap();
        slow.await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.search_results, vec![london()]);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn select_location_populates_weather() {
        let fake = FakeProvider::new().with_place("Paris", vec![paris()]);
        let (store, storage) = store_with(&fake);

        store.search_locations("Paris").await;
        let found = store.snapshot().search_results;
        assert_eq!(found, vec![paris()]);

        let handle = store.select_location(found[0].clone());
        let state = store.snapshot();
        assert_eq!(state.selected_location, Some(paris()));
        assert!(state.search_results.is_empty());
        assert_eq!(state.recent_searches[0], "Paris");

        handle.await.unwrap();

        let state = store.snapshot();
        assert!(state.current_weather.is_some());
        assert_eq!(state.forecast.as_ref().map(|f| f.list.len()), Some(8));
        assert!(!state.is_loading);
        assert!(state.error.is_none());

        let stored: Vec<String> = load_json(storage.as_ref(), RECENT_SEARCHES_KEY).unwrap().unwrap();
        assert_eq!(stored, vec!["Paris"]);
    }

    #[tokio::test]
    async fn fetch_without_selection_is_a_no_op() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        let mut rx = store.subscribe();

        store.fetch_weather_data().await;

        assert!(fake.calls().is_empty());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn failed_forecast_keeps_previous_weather() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.select_location(paris()).await.unwrap();
        let before = store.snapshot();

        *fake.temp.lock().unwrap() = 30.0;
        *fake.fail_forecast.lock().unwrap() = true;
        store.fetch_weather_data().await;

        let after = store.snapshot();
        assert_eq!(after.current_weather, before.current_weather);
        assert_eq!(after.forecast, before.forecast);
        assert_eq!(after.error.as_deref(), Some(FETCH_FAILED_MESSAGE));
        assert!(!after.is_loading);
    }

    #[tokio::test]
    async fn failed_current_keeps_previous_weather() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.select_location(paris()).await.unwrap();
        let before = store.snapshot();

        *fake.fail_current.lock().unwrap() = true;
        store.select_location(london()).await.unwrap();

        let after = store.snapshot();
        assert_eq!(after.selected_location, Some(london()));
        assert_eq!(after.current_weather, before.current_weather);
        assert_eq!(after.forecast, before.forecast);
        assert_eq!(after.error.as_deref(), Some(FETCH_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn set_units_refetches_once_with_new_units() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.select_location(paris()).await.unwrap();
        fake.clear_calls();

        let handle = store.set_units(Units::Imperial).expect("a location is selected");
        handle.await.unwrap();

        let p = paris();
        let mut calls = fake.calls();
        calls.sort_by_key(|c| matches!(c, Call::Forecast(..)));
        assert_eq!(
            calls,
            vec![
                Call::Current(p.lat, p.lon, Units::Imperial),
                Call::Forecast(p.lat, p.lon, Units::Imperial),
            ]
        );
        assert_eq!(store.snapshot().units, Units::Imperial);
    }

    #[tokio::test]
    async fn set_units_without_selection_only_stores_units() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.add_to_recent_searches("Paris");
        store.add_to_favorites(paris());

        assert!(store.set_units(Units::Imperial).is_none());

        let state = store.snapshot();
        assert_eq!(state.units, Units::Imperial);
        assert_eq!(state.recent_searches, vec!["Paris"]);
        assert_eq!(state.favorites, vec![paris()]);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn superseded_weather_response_is_discarded() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.select_location(paris()).await.unwrap();
        fake.clear_calls();

        let p = paris();
        fake.set_temp(10.0);
        let release = fake.gate_weather(Units::Imperial);
        let older = store.set_units(Units::Imperial).expect("a location is selected");
        while !fake.calls().contains(&Call::Current(p.lat, p.lon, Units::Imperial)) {
            tokio::task::yield_now().await;
        }

        fake.set_temp(25.0);
        let newer = store.set_units(Units::Metric).expect("a location is selected");
        newer.await.unwrap();
        assert_eq!(store.snapshot().current_weather.map(|w| w.main.temp), Some(25.0));

        release.send(()).unwrap();
        older.await.unwrap();

        let state = store.snapshot();
        assert_eq!(state.units, Units::Metric);
        assert_eq!(state.current_weather.map(|w| w.main.temp), Some(25.0));
        assert_eq!(state.forecast.map(|f| f.list[0].main.temp), Some(25.0));
        assert!(!state.is_loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn previous_weather_stays_visible_while_refreshing() {
        let fake = FakeProvider::new();
        let (store, _) = store_with(&fake);
        store.select_location(paris()).await.unwrap();
        let before = store.snapshot();
        fake.clear_calls();

        fake.set_temp(30.0);
        let release = fake.gate_weather(Units::Metric);
        let refresh = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_weather_data().await }
        });
        while fake.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        let during = store.snapshot();
        assert!(during.is_loading);
        assert_eq!(during.current_weather, before.current_weather);
        assert_eq!(during.forecast, before.forecast);
        assert!(during.error.is_none());

        release.send(()).unwrap();
        refresh.await.unwrap();

        let after = store.snapshot();
        assert_eq!(after.current_weather.map(|w| w.main.temp), Some(30.0));
        assert!(!after.is_loading);
    }

    #[test]
    fn store_created_in_runtime_spawns_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let fake = FakeProvider::new();
        let store = {
            let _guard = runtime.enter();
            store_with(&fake).0
        };

        let handle = store.select_location(paris());
        runtime.block_on(handle).unwrap();

        let state = store.snapshot();
        assert!(state.current_weather.is_some());
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn clear_error_is_idempotent() {
        let fake = FakeProvider::new();
        *fake.fail_geocode.lock().unwrap() = true;
        let (store, _) = store_with(&fake);

        store.search_locations("Paris").await;
        store.clear_error();
        assert!(store.snapshot().error.is_none());

        let before = store.snapshot();
        let mut rx = store.subscribe();
        store.clear_error();
        assert_eq!(store.snapshot(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_mutations() {
        let store = offline_store();
        let mut rx = store.subscribe();

        store.set_loading_state(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_loading);
    }

    proptest! {
        #[test]
        fn recent_searches_stay_bounded_and_distinct(names in proptest::collection::vec("[a-e]{1,2}", 0..40)) {
            let store = offline_store();
            for name in &names {
                store.add_to_recent_searches(name);
                let recent = store.snapshot().recent_searches;
                prop_assert!(recent.len() <= MAX_RECENT_SEARCHES);
                prop_assert_eq!(&recent[0], name);
                let mut unique = recent.clone();
                unique.sort();
                unique.dedup();
                prop_assert_eq!(unique.len(), recent.len());
            }
        }

        #[test]
        fn favorites_stay_bounded_and_unique(coords in proptest::collection::vec((0u8..6, 0u8..6), 0..40)) {
            let store = offline_store();
            for (lat, lon) in coords {
                let location = Location::new("City", "XX", f64::from(lat), f64::from(lon));
                let before = store.snapshot().favorites;
                let existed = before.iter().any(|f| f.same_place(&location));

                store.add_to_favorites(location);
                let after = store.snapshot().favorites;

                prop_assert!(after.len() <= MAX_FAVORITES);
                if existed {
                    prop_assert_eq!(&after, &before);
                }
                for (i, a) in after.iter().enumerate() {
                    for b in &after[i + 1..] {
                        prop_assert!(!a.same_place(b));
                    }
                }
            }
        }
    }
}
