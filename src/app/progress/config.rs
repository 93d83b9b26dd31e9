//! Live progress listener configuration
//!
//! Locale and time zone only affect how numbers and timestamps are printed.
//! The refresh interval is advisory: the listener renders whenever asked and
//! the display loop decides how often that is.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::constants::progress;
use crate::errors::{ConfigError, ConfigResult};

/// Which summary lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryVerbosity {
    /// Render the "Failed: ..." line when anything missed or errored
    pub include_failures: bool,
    /// Render one line per in-flight or finished artifact
    pub include_details: bool,
}

impl SummaryVerbosity {
    /// Only the header and download line
    pub fn silent() -> Self {
        Self {
            include_failures: false,
            include_details: false,
        }
    }

    /// Header, download line and failure line
    pub fn normal() -> Self {
        Self {
            include_failures: true,
            include_details: false,
        }
    }

    /// Everything, including per-artifact lines
    pub fn detailed() -> Self {
        Self {
            include_failures: true,
            include_details: true,
        }
    }
}

impl Default for SummaryVerbosity {
    fn default() -> Self {
        Self::normal()
    }
}

/// Number formatting conventions derived from a locale tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLocale {
    tag: String,
    decimal_separator: char,
}

// Languages that write decimals with a comma
const COMMA_DECIMAL_LANGUAGES: &[&str] = &[
    "de", "fr", "es", "it", "nl", "pt", "ru", "pl", "sv", "da", "fi", "nb", "cs", "tr",
];

impl DisplayLocale {
    /// Parse a BCP 47 style tag such as `en-US` or `de_DE`
    ///
    /// Unknown languages fall back to a `.` decimal separator. Only tags that
    /// are not shaped like a locale at all are rejected.
    pub fn parse(tag: &str) -> ConfigResult<Self> {
        let normalized = tag.trim().replace('_', "-");
        let language = normalized
            .split('-')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        let well_formed = (2..=3).contains(&language.len())
            && language.chars().all(|c| c.is_ascii_alphabetic())
            && normalized
                .split('-')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
        if !well_formed {
            return Err(ConfigError::InvalidValue {
                field: "progress.locale".to_string(),
                value: tag.to_string(),
                reason: "Expected a locale tag such as en-US".to_string(),
            });
        }

        let decimal_separator = if COMMA_DECIMAL_LANGUAGES.contains(&language.as_str()) {
            ','
        } else {
            '.'
        };

        Ok(Self {
            tag: normalized,
            decimal_separator,
        })
    }

    /// US English conventions
    pub fn en_us() -> Self {
        Self {
            tag: progress::DEFAULT_LOCALE.to_string(),
            decimal_separator: '.',
        }
    }

    /// Normalized tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Character placed between integer and fractional digits
    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }
}

impl Default for DisplayLocale {
    fn default() -> Self {
        Self::en_us()
    }
}

/// Parse a fixed UTC offset such as `+02:00`, `-0530`, `Z` or `UTC`
pub fn parse_time_zone(value: &str) -> ConfigResult<FixedOffset> {
    let invalid = || ConfigError::InvalidValue {
        field: "progress.time_zone".to_string(),
        value: value.to_string(),
        reason: "Expected a UTC offset such as +02:00, or UTC".to_string(),
    };

    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let hours: i32 = digits[0..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..4].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Configuration for the live progress listener
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub verbosity: SummaryVerbosity,
    /// How often the display loop is expected to render
    pub refresh_interval: Duration,
    pub locale: DisplayLocale,
    /// Offset used for printed wall-clock times
    pub time_zone: FixedOffset,
    /// File the final snapshot is appended to
    pub log_path: Option<PathBuf>,
    /// Detail lines at or above this duration are emphasized as slow
    pub slow_fetch_threshold: Duration,
    /// Detail lines at or above this duration are emphasized as very slow
    pub very_slow_fetch_threshold: Duration,
    /// Suppress detail lines while still counting
    pub quiet: bool,
    /// Omit the download line until something has been downloaded
    pub hide_empty_download: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            verbosity: SummaryVerbosity::default(),
            refresh_interval: Duration::from_millis(progress::DEFAULT_REFRESH_INTERVAL_MS),
            locale: DisplayLocale::default(),
            time_zone: Utc.fix(),
            log_path: None,
            slow_fetch_threshold: Duration::from_millis(progress::DEFAULT_SLOW_FETCH_MS),
            very_slow_fetch_threshold: Duration::from_millis(progress::DEFAULT_VERY_SLOW_FETCH_MS),
            quiet: false,
            hide_empty_download: false,
        }
    }
}

impl ProgressConfig {
    /// Set the verbosity
    pub fn with_verbosity(mut self, verbosity: SummaryVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set the refresh interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the number formatting locale
    pub fn with_locale(mut self, locale: DisplayLocale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the time zone for printed timestamps
    pub fn with_time_zone(mut self, time_zone: FixedOffset) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Append final snapshots to this file
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Set the slow and very slow emphasis thresholds
    pub fn with_thresholds(mut self, slow: Duration, very_slow: Duration) -> Self {
        self.slow_fetch_threshold = slow;
        self.very_slow_fetch_threshold = very_slow;
        self
    }

    /// Enable or disable quiet mode
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Hide the download line while nothing has been downloaded
    pub fn with_hide_empty_download(mut self, hide: bool) -> Self {
        self.hide_empty_download = hide;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval.is_zero() {
            return Err("Refresh interval cannot be zero".to_string());
        }

        if self.very_slow_fetch_threshold < self.slow_fetch_threshold {
            return Err("Very slow threshold cannot be below the slow threshold".to_string());
        }

        Ok(())
    }
}
