use dashboard_core::FixedEnvironment;

/// Environment signals for a terminal session.
///
/// Dark background comes from `COLORFGBG` ("fg;bg", set by rxvt, Konsole and
/// friends). Reduced motion from `REDUCE_MOTION` being set to anything but
/// `0`/empty.
pub fn detect<F>(lookup: F) -> FixedEnvironment
where
    F: Fn(&str) -> Option<String>,
{
    FixedEnvironment {
        prefers_dark: lookup("COLORFGBG")
            .as_deref()
            .and_then(background_is_dark)
            .unwrap_or(false),
        prefers_reduced_motion: lookup("REDUCE_MOTION")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false),
    }
}

/// ANSI colors 0-6 and 8 are dark backgrounds.
fn background_is_dark(colorfgbg: &str) -> Option<bool> {
    let bg: u8 = colorfgbg.rsplit(';').next()?.trim().parse().ok()?;
    Some(matches!(bg, 0..=6 | 8))
}
