//! Club policy and application settings loaded from environment variables.
//!
//! Every setting can come from the environment or a `.env` file via `dotenvy`. Missing,
//! unparsable or out of range values fall back to the defaults below.

use std::{ops::RangeInclusive, str::FromStr};

use chrono::{Duration, FixedOffset, Offset, Utc};

/// Longest confirmation reopen window, one week.
const MAX_REOPEN_WINDOW_HOURS: i64 = 7 * 24;

/// Largest accepted amount for any single fee, in cents.
const MAX_FEE_CENTS: i64 = 100_000_000;

/// Amounts and windows the club rules are built from.
///
/// Injected into [`DomainLogic`](crate::commands::DomainLogic) so rule changes never touch the
/// command code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClubConfig {
    /// Monthly membership fee in cents.
    pub monthly_fee_cents: i64,

    /// Day of the month dues are due on.
    pub due_day: u32,

    /// Fine for arriving late, in cents.
    pub late_fee_cents: i64,

    /// Fine for skipping a game after confirming, in cents.
    pub no_show_fee_cents: i64,

    /// Fine per guest brought to an event, in cents.
    pub guest_fee_cents: i64,

    /// Ranking points for showing up to a game.
    pub attendance_points: i64,

    /// How long confirmations reopen for after the teams are reset.
    pub reopen_window: Duration,

    /// Club local time offset used for rosters, in minutes east of UTC.
    pub utc_offset_minutes: i32,
}

impl Default for ClubConfig {
    fn default() -> Self {
        Self {
            monthly_fee_cents: 3500,
            due_day: 10,
            late_fee_cents: 500,
            no_show_fee_cents: 1000,
            guest_fee_cents: 500,
            attendance_points: 1,
            reopen_window: Duration::hours(6),
            utc_offset_minutes: -180,
        }
    }
}

impl ClubConfig {
    /// Loads the club policy from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let fee = |key: &str, default: i64| parse_env_in(key, default, 0..=MAX_FEE_CENTS);
        let reopen_hours = parse_env_in(
            "PATOTA_REOPEN_WINDOW_HOURS",
            defaults.reopen_window.num_hours(),
            0..=MAX_REOPEN_WINDOW_HOURS,
        );

        Self {
            monthly_fee_cents: fee("PATOTA_MONTHLY_FEE_CENTS", defaults.monthly_fee_cents),
            due_day: parse_env_in("PATOTA_DUE_DAY", defaults.due_day, 1..=31),
            late_fee_cents: fee("PATOTA_LATE_FEE_CENTS", defaults.late_fee_cents),
            no_show_fee_cents: fee("PATOTA_NO_SHOW_FEE_CENTS", defaults.no_show_fee_cents),
            guest_fee_cents: fee("PATOTA_GUEST_FEE_CENTS", defaults.guest_fee_cents),
            attendance_points: parse_env_in(
                "PATOTA_ATTENDANCE_POINTS",
                defaults.attendance_points,
                0..=1_000,
            ),
            reopen_window: Duration::hours(reopen_hours),
            utc_offset_minutes: parse_env_in(
                "PATOTA_UTC_OFFSET_MINUTES",
                defaults.utc_offset_minutes,
                -14 * 60..=14 * 60,
            ),
        }
    }

    /// Club local offset, UTC if the configured minutes are out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        let seconds = self.utc_offset_minutes.saturating_mul(60);
        FixedOffset::east_opt(seconds).unwrap_or_else(|| Utc.fix())
    }
}

/// Settings for the command-line front end.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string.
    pub database_url: String,

    /// `tracing` filter directive, e.g. `info` or `patota_club=debug`.
    pub log_filter: String,

    pub club: ClubConfig,
}

impl AppConfig {
    /// Loads the application settings from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://patota.sqlite3".to_string());
        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Self {
            database_url,
            log_filter,
            club: ClubConfig::from_env(),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_env`], also falling back to `default` outside `range`.
fn parse_env_in<T: FromStr + PartialOrd>(key: &str, default: T, range: RangeInclusive<T>) -> T {
    match std::env::var(key).ok().and_then(|v| v.parse::<T>().ok()) {
        Some(value) if range.contains(&value) => value,
        Some(_) => {
            tracing::warn!(key, "configured value out of range, using the default");
            default
        }
        None => default,
    }
}
