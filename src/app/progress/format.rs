//! Number, size and time formatting for rendered progress lines

use chrono::{FixedOffset, TimeZone, Utc};

use super::config::DisplayLocale;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

/// Format a byte count as a human-readable size
pub fn format_bytes(bytes: u64, locale: &DisplayLocale) -> String {
    let value = bytes as f64;
    let text = if value < KB {
        return format!("{} B", bytes);
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else if value < GB {
        format!("{:.1} MB", value / MB)
    } else {
        format!("{:.1} GB", value / GB)
    };
    localize(text, locale)
}

/// Format an elapsed duration in milliseconds
pub fn format_elapsed(millis: u64, locale: &DisplayLocale) -> String {
    let total_seconds = millis / 1000;
    if total_seconds < 60 {
        return localize(format!("{:.1}s", millis as f64 / 1000.0), locale);
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

/// Format an epoch-millisecond instant as wall-clock time in `time_zone`
pub fn format_wall_clock(epoch_millis: u64, time_zone: &FixedOffset) -> String {
    let Ok(millis) = i64::try_from(epoch_millis) else {
        return "--:--:--".to_string();
    };

    match Utc.timestamp_millis_opt(millis).single() {
        Some(instant) => instant
            .with_timezone(time_zone)
            .format("%H:%M:%S %:z")
            .to_string(),
        None => "--:--:--".to_string(),
    }
}

fn localize(text: String, locale: &DisplayLocale) -> String {
    match locale.decimal_separator() {
        '.' => text,
        separator => text.replace('.', &separator.to_string()),
    }
}
