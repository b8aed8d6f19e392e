//! Fixtures for database tests. Every test gets its own in-memory database with the schema
//! applied, so nothing leaks between tests.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;

use crate::model::{NewGame, NewPick, NewUser};
use crate::{apply_pragmas, run_migrations};
use crate::schema::{games, picks, users};

pub const SEASON: i32 = 2024;

// Helper to run a test against a fresh database. Real errors propagate and fail the test.
pub fn run_test_in_database<F>(test_fn: F)
where
    F: FnOnce(&mut SqliteConnection) -> Result<(), crate::PoolError>,
{
    let mut conn =
        SqliteConnection::establish(":memory:").expect("Failed to open in-memory database");
    apply_pragmas(&mut conn).expect("Failed to apply pragmas");
    run_migrations(&mut conn).expect("Failed to apply schema");
    if let Err(e) = test_fn(&mut conn) {
        panic!("test failed: {}", e);
    }
}

// Whole seconds, so values survive a round trip through SQLite text timestamps unchanged.
pub fn hours_from_now(hours: i64) -> NaiveDateTime {
    let at = Utc::now() + Duration::hours(hours);
    DateTime::from_timestamp(at.timestamp(), 0)
        .expect("timestamp in range")
        .naive_utc()
}

pub fn insert_user(
    conn: &mut SqliteConnection,
    username: &str,
    alias: Option<&str>,
    is_admin: bool,
) -> QueryResult<i32> {
    diesel::insert_into(users::table)
        .values(&NewUser {
            username,
            alias,
            is_admin,
        })
        .returning(users::id)
        .get_result(conn)
}

pub fn insert_game(
    conn: &mut SqliteConnection,
    week: i32,
    kickoff_at: NaiveDateTime,
    home_team: &str,
    away_team: &str,
) -> QueryResult<i32> {
    diesel::insert_into(games::table)
        .values(&NewGame {
            season: SEASON,
            week,
            kickoff_at,
            home_team,
            away_team,
            spread: -3.5,
        })
        .returning(games::id)
        .get_result(conn)
}

pub fn finish_game(
    conn: &mut SqliteConnection,
    game_id: i32,
    home_score: i32,
    away_score: i32,
) -> QueryResult<usize> {
    diesel::update(games::table.filter(games::id.eq(game_id)))
        .set((
            games::home_score.eq(Some(home_score)),
            games::away_score.eq(Some(away_score)),
            games::status.eq("final"),
        ))
        .execute(conn)
}

pub fn insert_pick(
    conn: &mut SqliteConnection,
    user_id: i32,
    game_id: i32,
    selected_team: &str,
    confidence: i32,
) -> QueryResult<i32> {
    diesel::insert_into(picks::table)
        .values(&NewPick {
            user_id,
            game_id,
            selected_team,
            confidence,
            tiebreaker_points: None,
        })
        .returning(picks::id)
        .get_result(conn)
}
