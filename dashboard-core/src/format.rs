//! Display formatting for temperatures, speeds and provider timestamps.
//!
//! Timestamps are unix seconds plus the location's UTC offset in seconds, so
//! output is in the location's local time regardless of the host zone.

use chrono::{DateTime, NaiveDateTime};

use crate::model::Units;

/// Round half toward positive infinity (`2.5 → 3`, `-2.5 → -2`).
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Round to one decimal place, half toward positive infinity.
pub fn round_tenths(value: f64) -> f64 {
    round_half_up(value * 10.0) as f64 / 10.0
}

pub fn format_temperature(temp: f64, units: Units) -> String {
    format!("{}{}", round_half_up(temp), units.temperature_symbol())
}

/// Wind speed with one decimal. The provider already reports m/s for
/// metric and mph for imperial, so no conversion happens here.
pub fn format_wind_speed(speed: f64, units: Units) -> String {
    format!("{speed:.1} {}", units.speed_unit())
}

pub(crate) fn local_datetime(timestamp: i64, utc_offset: i32) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(timestamp + i64::from(utc_offset), 0).map(|dt| dt.naive_utc())
}

fn format_local(timestamp: i64, utc_offset: i32, pattern: &str) -> String {
    local_datetime(timestamp, utc_offset)
        .map(|dt| dt.format(pattern).to_string())
        .unwrap_or_else(|| "--".to_string())
}

/// `"Mon, Jan 15"`.
pub fn format_date(timestamp: i64, utc_offset: i32) -> String {
    format_local(timestamp, utc_offset, "%a, %b %-d")
}

/// `"02:30 PM"`.
pub fn format_time(timestamp: i64, utc_offset: i32) -> String {
    format_local(timestamp, utc_offset, "%I:%M %p")
}

/// Short time for sunrise/sunset, `"7:04 AM"`.
pub fn format_clock(timestamp: i64, utc_offset: i32) -> String {
    format_local(timestamp, utc_offset, "%-I:%M %p")
}

/// Chart axis label, `"2 PM"`.
pub fn hour_label(timestamp: i64, utc_offset: i32) -> String {
    format_local(timestamp, utc_offset, "%-I %p")
}

/// 16-point compass name for a bearing in degrees.
pub fn compass_direction(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let index = round_half_up(degrees.rem_euclid(360.0) / 22.5).rem_euclid(16) as usize;
    POINTS[index]
}
