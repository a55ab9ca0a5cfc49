//! View models derived from the raw forecast.
//!
//! Pure functions: nothing here is stored, callers recompute on demand.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    format::{hour_label, local_datetime, round_half_up, round_tenths},
    model::{CurrentWeather, Forecast, ForecastEntry, WeatherCategory},
};

/// Days shown in the multi-day summary.
pub const FORECAST_DAYS: usize = 5;

/// 8 steps of 3 hours.
pub const HOURS_24_STEPS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    /// `"Mon"`
    pub weekday: String,
    /// `"Jan 15"`
    pub label: String,
    pub temp_max: i64,
    pub temp_min: i64,
    pub icon: String,
    pub description: String,
    pub category: WeatherCategory,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPoint {
    pub dt: i64,
    pub label: String,
    pub temp: i64,
    pub feels_like: i64,
    pub humidity: u8,
    /// Percent, see [`precipitation_percent`].
    pub precipitation: i64,
    pub wind_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TemperatureRange {
    pub min: i64,
    pub max: i64,
}

/// Group entries by the location's calendar day, in order of first appearance.
pub fn daily_forecast(forecast: &Forecast) -> Vec<DailySummary> {
    let offset = forecast.city.timezone;
    let mut days: Vec<(NaiveDate, Vec<&ForecastEntry>)> = Vec::new();

    for entry in &forecast.list {
        let Some(local) = local_datetime(entry.dt, offset) else {
            continue;
        };
        let date = local.date();

        match days.iter_mut().find(|(d, _)| *d == date) {
            Some((_, entries)) => entries.push(entry),
            None => days.push((date, vec![entry])),
        }
    }

    days.into_iter()
        .take(FORECAST_DAYS)
        .map(|(date, entries)| summarize_day(date, &entries))
        .collect()
}

fn summarize_day(date: NaiveDate, entries: &[&ForecastEntry]) -> DailySummary {
    let temps = entries.iter().map(|e| e.main.temp);
    let max = temps.clone().fold(f64::NEG_INFINITY, f64::max);
    let min = temps.fold(f64::INFINITY, f64::min);

    let icons: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.condition())
        .map(|c| c.icon.as_str())
        .collect();
    let descriptions: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.condition())
        .map(|c| c.description.as_str())
        .collect();

    let icon = most_frequent(&icons).unwrap_or_default().to_string();

    DailySummary {
        date,
        weekday: date.format("%a").to_string(),
        label: date.format("%b %-d").to_string(),
        temp_max: round_half_up(max),
        temp_min: round_half_up(min),
        category: WeatherCategory::from_icon(&icon),
        icon,
        description: most_frequent(&descriptions).unwrap_or_default().to_string(),
    }
}

/// Most frequent value; on a tie the value that reached the count first wins.
pub fn most_frequent<'a>(values: &[&'a str]) -> Option<&'a str> {
    let mut best = *values.first()?;
    let mut best_count = 1;
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for &value in values {
        let count = counts.entry(value).or_default();
        *count += 1;
        if *count > best_count {
            best = value;
            best_count = *count;
        }
    }

    Some(best)
}

/// The first eight 3-hour steps as chart points.
pub fn next_24_hours(forecast: &Forecast) -> Vec<HourlyPoint> {
    let offset = forecast.city.timezone;

    forecast
        .list
        .iter()
        .take(HOURS_24_STEPS)
        .map(|entry| HourlyPoint {
            dt: entry.dt,
            label: hour_label(entry.dt, offset),
            temp: round_half_up(entry.main.temp),
            feels_like: round_half_up(entry.main.feels_like),
            humidity: entry.main.humidity,
            precipitation: precipitation_percent(entry),
            wind_speed: round_tenths(entry.wind.speed),
        })
        .collect()
}

/// Rain volume scaled so 10 mm reads 100%, or the probability of
/// precipitation when no rain volume is reported.
pub fn precipitation_percent(entry: &ForecastEntry) -> i64 {
    match entry.rain_3h() {
        Some(mm) if mm != 0.0 => round_half_up(mm * 10.0),
        _ => round_half_up(entry.pop * 100.0),
    }
}

/// Low/high for the headline card.
///
/// Uses the next 24 hours of forecast when available so the range is never
/// degenerate; falls back to the current reading's own min/max.
pub fn today_range(current: &CurrentWeather, forecast: Option<&Forecast>) -> TemperatureRange {
    let temps: Vec<f64> = forecast
        .map(|f| {
            f.list
                .iter()
                .take(HOURS_24_STEPS)
                .map(|e| e.main.temp)
                .collect()
        })
        .unwrap_or_default();

    if temps.is_empty() {
        return TemperatureRange {
            min: round_half_up(current.main.temp_min),
            max: round_half_up(current.main.temp_max),
        };
    }

    let min = temps.iter().copied().fold(f64::INFINITY, f64::min);
    let max = temps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (rounded_min, rounded_max) = (round_half_up(min), round_half_up(max));

    if min == max {
        TemperatureRange {
            min: rounded_min - 1,
            max: rounded_max + 1,
        }
    } else if rounded_min == rounded_max {
        TemperatureRange {
            min: rounded_min,
            max: rounded_min + 1,
        }
    } else {
        TemperatureRange {
            min: rounded_min,
            max: rounded_max,
        }
    }
}
