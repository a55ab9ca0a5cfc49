//! Plain-text rendering of store state.

use std::fmt::Write;

use dashboard_core::{
    AppState, Appearance, CurrentWeather, Forecast, Location, Preferences, Units,
    format::{
        compass_direction, format_clock, format_date, format_temperature, format_time,
        format_wind_speed,
    },
    view::{daily_forecast, next_24_hours, today_range},
};

pub fn location_line(location: &Location) -> String {
    format!(
        "{}  ({:.4}, {:.4})  id: {}",
        location.display_name(),
        location.lat,
        location.lon,
        location.id()
    )
}

pub fn locations(list: &[Location]) -> String {
    if list.is_empty() {
        return "No locations found.".to_string();
    }

    list.iter()
        .enumerate()
        .map(|(i, loc)| format!("{:>2}. {}", i + 1, location_line(loc)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn dashboard(state: &AppState) -> String {
    let mut out = String::new();

    if let Some(error) = &state.error {
        let _ = writeln!(out, "! {error}");
    }

    match &state.current_weather {
        Some(current) => {
            out.push_str(&current_card(current, state.forecast.as_ref(), state.units));
            if let Some(forecast) = &state.forecast {
                out.push('\n');
                out.push_str(&forecast_section(forecast, state.units));
            }
        }
        None if state.is_loading => out.push_str("Loading weather data...\n"),
        None => out.push_str("No weather data. Search for a city to get started.\n"),
    }

    out
}

fn current_card(current: &CurrentWeather, forecast: Option<&Forecast>, units: Units) -> String {
    let mut out = String::new();
    let tz = current.timezone;
    let range = today_range(current, forecast);
    let description = current
        .condition()
        .map(|c| format!("{} ({})", c.description, c.category()))
        .unwrap_or_else(|| "unknown".to_string());

    let place = match &current.sys.country {
        Some(country) => format!("{}, {}", current.name, country),
        None => current.name.clone(),
    };

    let _ = writeln!(
        out,
        "{place}  {}  updated {}",
        format_date(current.dt, tz),
        format_time(current.dt, tz)
    );
    let _ = writeln!(
        out,
        "  {}  feels like {}  {description}",
        format_temperature(current.main.temp, units),
        format_temperature(current.main.feels_like, units),
    );
    let _ = writeln!(
        out,
        "  low {}  high {}",
        format_temperature(range.min as f64, units),
        format_temperature(range.max as f64, units),
    );
    let _ = writeln!(
        out,
        "  humidity {}%  wind {} {}  pressure {} hPa",
        current.main.humidity,
        format_wind_speed(current.wind.speed, units),
        compass_direction(current.wind.deg),
        current.main.pressure,
    );
    if let Some(km) = current.visibility_km() {
        let _ = writeln!(out, "  visibility {km:.1} km");
    }
    let _ = writeln!(
        out,
        "  sunrise {}  sunset {}",
        format_clock(current.sys.sunrise, tz),
        format_clock(current.sys.sunset, tz),
    );

    out
}

fn forecast_section(forecast: &Forecast, units: Units) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "5-day forecast");
    for day in daily_forecast(forecast) {
        let _ = writeln!(
            out,
            "  {:<4}{:<8}{:>6} / {:<6} {}",
            day.weekday,
            day.label,
            format_temperature(day.temp_min as f64, units),
            format_temperature(day.temp_max as f64, units),
            day.description,
        );
    }

    let _ = writeln!(out, "\nNext 24 hours");
    for point in next_24_hours(forecast) {
        let _ = writeln!(
            out,
            "  {:>5}  {:>6}  feels {:>6}  humidity {:>3}%  precip {:>3}%  wind {}",
            point.label,
            format_temperature(point.temp as f64, units),
            format_temperature(point.feels_like as f64, units),
            point.humidity,
            point.precipitation,
            format_wind_speed(point.wind_speed, units),
        );
    }

    out
}

pub fn recent(list: &[String]) -> String {
    if list.is_empty() {
        return "No recent searches.".to_string();
    }
    list.join("\n")
}

pub fn favorites(list: &[Location]) -> String {
    if list.is_empty() {
        return "No favorite locations.".to_string();
    }
    list.iter().map(location_line).collect::<Vec<_>>().join("\n")
}

pub fn appearance(prefs: &Preferences, appearance: &Appearance) -> String {
    format!(
        "mode: {} ({})\nstyle: {}\nmotion: {} ({})\ncontrast: {}",
        prefs.mode,
        if appearance.dark { "dark" } else { "light" },
        prefs.style,
        prefs.motion,
        if appearance.reduced_motion { "reduced" } else { "full" },
        prefs.contrast,
    )
}
