//! The game schedule and results, maintained by the pool admin.

use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use leptos::logging::log;
use serde::{Deserialize, Serialize};

#[cfg(feature = "ssr")]
use crate::model::{Game, GameStatus, NewGame};
#[cfg(feature = "ssr")]
use crate::schema::games;
#[cfg(feature = "ssr")]
use crate::validate_week;
use crate::PoolError;

/// A game to put on the schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledGame {
    pub season: i32,
    pub week: i32,
    pub kickoff_at: NaiveDateTime,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub spread: f64,
}

impl ScheduledGame {
    pub fn check(&self) -> Result<(), PoolError> {
        let home = self.home_team.trim();
        let away = self.away_team.trim();
        if home.is_empty() || away.is_empty() {
            return Err(PoolError::validation("both teams must be named"));
        }
        if home == away {
            return Err(PoolError::validation(format!("{} cannot play itself", home)));
        }
        if !self.spread.is_finite() {
            return Err(PoolError::validation("spread must be a number"));
        }
        Ok(())
    }
}

pub fn check_result(home_score: i32, away_score: i32) -> Result<(), PoolError> {
    if home_score < 0 || away_score < 0 {
        return Err(PoolError::validation(format!(
            "scores must not be negative, got {}-{}",
            home_score, away_score
        )));
    }
    Ok(())
}

#[cfg(feature = "ssr")]
pub fn create_game(conn: &mut SqliteConnection, game: &ScheduledGame) -> Result<Game, PoolError> {
    validate_week(game.week, game.season)?;
    game.check()?;

    let created = diesel::insert_into(games::table)
        .values(&NewGame {
            season: game.season,
            week: game.week,
            kickoff_at: game.kickoff_at,
            home_team: game.home_team.trim(),
            away_team: game.away_team.trim(),
            spread: game.spread,
        })
        .returning(Game::as_returning())
        .get_result(conn)?;
    Ok(created)
}

#[cfg(feature = "ssr")]
fn find_game(conn: &mut SqliteConnection, game_id: i32) -> Result<Game, PoolError> {
    games::table
        .filter(games::id.eq(game_id))
        .select(Game::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| PoolError::not_found(format!("game {}", game_id)))
}

/// Records the final score of a game. Recording it again corrects the result; the week has to be
/// recomputed for the correction to reach the scores.
#[cfg(feature = "ssr")]
pub fn record_game_result(
    conn: &mut SqliteConnection,
    game_id: i32,
    home_score: i32,
    away_score: i32,
) -> Result<Game, PoolError> {
    check_result(home_score, away_score)?;

    conn.transaction(|conn| {
        let game = find_game(conn, game_id)?;
        let updated = diesel::update(games::table.filter(games::id.eq(game.id)))
            .set((
                games::home_score.eq(Some(home_score)),
                games::away_score.eq(Some(away_score)),
                games::status.eq(GameStatus::Final.as_str()),
            ))
            .returning(Game::as_returning())
            .get_result(conn)?;
        log!(
            "Final: {} {} - {} {} (week {}, {})",
            updated.away_team,
            away_score,
            home_score,
            updated.home_team,
            updated.week,
            updated.season
        );
        Ok(updated)
    })
}

/// Moves a game back to scheduled or in progress, clearing any recorded score. Use
/// `record_game_result` to finish a game.
#[cfg(feature = "ssr")]
pub fn set_game_status(
    conn: &mut SqliteConnection,
    game_id: i32,
    status: GameStatus,
) -> Result<Game, PoolError> {
    if status == GameStatus::Final {
        return Err(PoolError::validation(
            "a game becomes final by recording its score",
        ));
    }

    conn.transaction(|conn| {
        let game = find_game(conn, game_id)?;
        let updated = diesel::update(games::table.filter(games::id.eq(game.id)))
            .set((
                games::home_score.eq(None::<i32>),
                games::away_score.eq(None::<i32>),
                games::status.eq(status.as_str()),
            ))
            .returning(Game::as_returning())
            .get_result(conn)?;
        Ok(updated)
    })
}

/// The week's games in kickoff order.
#[cfg(feature = "ssr")]
pub fn week_games(
    conn: &mut SqliteConnection,
    week: i32,
    season: i32,
) -> Result<Vec<Game>, PoolError> {
    validate_week(week, season)?;
    let week_games = games::table
        .filter(games::season.eq(season))
        .filter(games::week.eq(week))
        .order((games::kickoff_at.asc(), games::id.asc()))
        .select(Game::as_select())
        .load(conn)?;
    Ok(week_games)
}
