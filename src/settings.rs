//! The pool's current week and season, kept in the `settings` table.

use chrono::{Datelike, NaiveDate};
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ssr")]
use crate::schema::settings;
use crate::PoolError;

#[cfg(feature = "ssr")]
const WEEK_KEY: &str = "current_week";
#[cfg(feature = "ssr")]
const SEASON_KEY: &str = "current_season";

/// Which week the pool is on. Read once per request and passed down, never consulted deeper in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeasonClock {
    pub week: i32,
    pub season: i32,
}

impl SeasonClock {
    /// The week a request asked for, with anything it left out taken from the clock.
    pub fn with_overrides(self, week: Option<i32>, season: Option<i32>) -> SeasonClock {
        SeasonClock {
            week: week.unwrap_or(self.week),
            season: season.unwrap_or(self.season),
        }
    }
}

/// The season a date belongs to. January and February games finish the previous year's season.
pub fn season_for(date: NaiveDate) -> i32 {
    if date.month() <= 2 {
        date.year() - 1
    } else {
        date.year()
    }
}

/// Season to fall back on when none is stored: `DEFAULT_SEASON` if it parses, the season of
/// `today` otherwise.
pub fn default_season(configured: Option<&str>, today: NaiveDate) -> i32 {
    configured
        .and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|s| crate::validate_season(*s).is_ok())
        .unwrap_or_else(|| season_for(today))
}

fn parse_setting(key: &str, value: &str) -> Result<i32, PoolError> {
    value
        .trim()
        .parse()
        .map_err(|_| PoolError::validation(format!("setting {} is not a number: {}", key, value)))
}

#[cfg(feature = "ssr")]
fn read_setting(conn: &mut SqliteConnection, key: &str) -> Result<Option<i32>, PoolError> {
    let value: Option<String> = settings::table
        .filter(settings::key.eq(key))
        .select(settings::value)
        .first(conn)
        .optional()?;
    value.map(|v| parse_setting(key, &v)).transpose()
}

#[cfg(feature = "ssr")]
pub fn current_clock(conn: &mut SqliteConnection) -> Result<SeasonClock, PoolError> {
    let week = read_setting(conn, WEEK_KEY)?.unwrap_or(1);
    let season = match read_setting(conn, SEASON_KEY)? {
        Some(season) => season,
        None => {
            let configured = std::env::var("DEFAULT_SEASON").ok();
            default_season(configured.as_deref(), chrono::Utc::now().date_naive())
        }
    };
    Ok(SeasonClock { week, season })
}

#[cfg(feature = "ssr")]
pub fn set_current_clock(conn: &mut SqliteConnection, clock: SeasonClock) -> Result<(), PoolError> {
    crate::validate_week(clock.week, clock.season)?;
    conn.transaction(|conn| {
        for (key, value) in [(WEEK_KEY, clock.week), (SEASON_KEY, clock.season)] {
            diesel::replace_into(settings::table)
                .values((settings::key.eq(key), settings::value.eq(value.to_string())))
                .execute(conn)?;
        }
        Ok(())
    })
}
