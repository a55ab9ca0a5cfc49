use std::{fmt, sync::Arc};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dashboard_core::{
    Config, ContrastMode, FileStore, KeyValueStore, Location, MotionPreference, PreferenceStore,
    ThemeMode, ThemeStyle, Units, WeatherStore, preferences::resolve_appearance,
    provider_from_config,
};
use tracing::debug;

use crate::{render, terminal};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-dashboard", version, about = "Weather dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeatherMap API key.
    Configure,

    /// Look up locations matching a city name.
    Search {
        query: String,
    },

    /// Show current weather and forecast for a city.
    Show {
        query: String,

        #[arg(long, default_value_t = Units::Metric)]
        units: Units,

        /// Choose among multiple matches instead of taking the first.
        #[arg(long)]
        pick: bool,
    },

    /// List recent searches.
    Recent,

    /// Manage favorite locations.
    Favorites {
        #[command(subcommand)]
        action: FavoritesCommand,
    },

    /// Show or change display preferences.
    Theme {
        #[command(subcommand)]
        action: ThemeCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum FavoritesCommand {
    List,

    /// Search for a city and add the match to favorites.
    Add {
        query: String,

        #[arg(long)]
        pick: bool,
    },

    /// Remove a favorite by its "lat-lon" id.
    Remove {
        id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ThemeCommand {
    Show,

    Set {
        #[arg(long)]
        mode: Option<ThemeMode>,

        #[arg(long)]
        style: Option<ThemeStyle>,

        #[arg(long)]
        motion: Option<MotionPreference>,

        #[arg(long)]
        contrast: Option<ContrastMode>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure()?,
            Command::Search { query } => {
                let store = open_store(true)?;
                store.search_locations(&query).await;
                let state = store.snapshot();
                if let Some(error) = state.error {
                    bail!(error);
                }
                println!("{}", render::locations(&state.search_results));
            }
            Command::Show { query, units, pick } => {
                let store = open_store(true)?;
                if let Some(refresh) = store.set_units(units) {
                    refresh.await?;
                }
                if let Some(location) = find_location(&store, &query, pick).await? {
                    store.select_location(location).await?;
                    print!("{}", render::dashboard(&store.snapshot()));
                }
            }
            Command::Recent => {
                let store = open_store(false)?;
                println!("{}", render::recent(&store.snapshot().recent_searches));
            }
            Command::Favorites { action } => favorites(action).await?,
            Command::Theme { action } => theme(action)?,
        }

        Ok(())
    }
}

fn open_storage() -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let path = Config::storage_file_path()?;
    debug!(path = %path.display(), "opening storage");
    Ok(Arc::new(FileStore::open(path)?))
}

/// Build the store; `needs_network` commands refuse to run without a key.
fn open_store(needs_network: bool) -> anyhow::Result<WeatherStore> {
    let config = Config::load_with_env()?;

    if needs_network && !config.is_configured() {
        bail!(
            "No OpenWeatherMap API key configured.\n\
             Hint: run `weather-dashboard configure` or set OPENWEATHERMAP_API_KEY."
        );
    }

    Ok(WeatherStore::new(provider_from_config(&config), open_storage()?))
}

fn configure() -> anyhow::Result<()> {
    let mut config = Config::load()?;

    let api_key = inquire::Text::new("OpenWeatherMap API key:")
        .with_help_message("Create one at https://home.openweathermap.org/api_keys")
        .prompt()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        bail!("API key must not be empty");
    }
    config.set_api_key(api_key.trim().to_string());

    let api_url = inquire::Text::new("API base URL:")
        .with_default(config.openweather.api_url())
        .prompt()
        .context("Failed to read API base URL")?;
    config.openweather.api_url =
        Some(api_url).filter(|url| url != dashboard_core::config::DEFAULT_API_URL);

    config.save()?;
    println!("Saved configuration to {}", Config::config_file_path()?.display());

    Ok(())
}

struct Choice(Location);

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render::location_line(&self.0))
    }
}

/// Search and settle on one location, or `None` when nothing matched.
async fn find_location(
    store: &WeatherStore,
    query: &str,
    pick: bool,
) -> anyhow::Result<Option<Location>> {
    store.search_locations(query).await;
    let state = store.snapshot();

    if let Some(error) = state.error {
        bail!(error);
    }

    let mut results = state.search_results;
    if results.is_empty() {
        println!("{}", render::locations(&results));
        return Ok(None);
    }

    if pick && results.len() > 1 {
        let choices = results.into_iter().map(Choice).collect();
        let Choice(location) = inquire::Select::new("Select a location:", choices)
            .prompt()
            .context("Failed to read location choice")?;
        return Ok(Some(location));
    }

    Ok(Some(results.swap_remove(0)))
}

async fn favorites(action: FavoritesCommand) -> anyhow::Result<()> {
    match action {
        FavoritesCommand::List => {
            let store = open_store(false)?;
            println!("{}", render::favorites(&store.snapshot().favorites));
        }
        FavoritesCommand::Add { query, pick } => {
            let store = open_store(true)?;
            if let Some(location) = find_location(&store, &query, pick).await? {
                let line = render::location_line(&location);
                if store.snapshot().is_favorite(&location) {
                    println!("Already a favorite: {line}");
                } else {
                    store.add_to_favorites(location);
                    println!("Added: {line}");
                }
            }
        }
        FavoritesCommand::Remove { id } => {
            let store = open_store(false)?;
            let before = store.snapshot().favorites.len();
            store.remove_from_favorites(&id);
            let removed = before - store.snapshot().favorites.len();
            println!("Removed {removed} favorite(s).");
        }
    }

    Ok(())
}

fn theme(action: ThemeCommand) -> anyhow::Result<()> {
    let preferences = PreferenceStore::new(open_storage()?);

    if let ThemeCommand::Set {
        mode,
        style,
        motion,
        contrast,
    } = action
    {
        if let Some(mode) = mode {
            preferences.set_mode(mode);
        }
        if let Some(style) = style {
            preferences.set_style(style);
        }
        if let Some(motion) = motion {
            preferences.set_motion(motion);
        }
        if let Some(contrast) = contrast {
            preferences.set_contrast(contrast);
        }
    }

    let prefs = preferences.get();
    let env = terminal::detect(|name| std::env::var(name).ok());
    println!("{}", render::appearance(&prefs, &resolve_appearance(&prefs, &env)));

    Ok(())
}
