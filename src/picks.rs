//! Weekly pick submission. A submission replaces the user's whole week, except for games that
//! have already kicked off, which can no longer change.

use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use leptos::logging::warn;
use std::collections::HashSet;

use crate::model::{Game, Pick, PickSubmission};
#[cfg(feature = "ssr")]
use crate::model::{NewPick, User};
#[cfg(feature = "ssr")]
use crate::recap::tiebreaker_game;
#[cfg(feature = "ssr")]
use crate::schema::{games, picks, users};
#[cfg(feature = "ssr")]
use crate::validate_week;
use crate::PoolError;

/// Checks a submission against the week's games: each game at most once, a team that is
/// actually playing, and a confidence of at least one.
pub fn check_submission(week_games: &[Game], submissions: &[PickSubmission]) -> Result<(), PoolError> {
    let mut seen = HashSet::new();
    for submission in submissions {
        let game = week_games
            .iter()
            .find(|g| g.id == submission.game_id)
            .ok_or_else(|| {
                PoolError::validation(format!(
                    "game {} is not part of this week",
                    submission.game_id
                ))
            })?;
        if !seen.insert(submission.game_id) {
            return Err(PoolError::validation(format!(
                "game {} was picked more than once",
                submission.game_id
            )));
        }
        if !game.involves(&submission.selected_team) {
            return Err(PoolError::validation(format!(
                "{} is not playing in game {} ({} vs {})",
                submission.selected_team, game.id, game.away_team, game.home_team
            )));
        }
        if submission.confidence < 1 {
            return Err(PoolError::validation(format!(
                "confidence for game {} must be at least 1",
                submission.game_id
            )));
        }
        if submission.tiebreaker_points.is_some_and(|p| p < 0) {
            return Err(PoolError::validation("tiebreaker points must not be negative"));
        }
    }
    Ok(())
}

pub fn is_locked(game: &Game, now: NaiveDateTime) -> bool {
    game.kickoff_at <= now
}

/// Whether a submitted pick leaves an existing pick exactly as it is.
pub fn unchanged(existing: &Pick, submission: &PickSubmission) -> bool {
    existing.selected_team == submission.selected_team
        && existing.confidence == submission.confidence
        && existing.tiebreaker_points == submission.tiebreaker_points
}

/// Replaces a user's picks for the week in one transaction.
///
/// Picks on games that haven't kicked off are deleted and re-inserted from `submissions`. Picks on
/// locked games are kept as they are; resubmitting them unchanged is fine, changing them fails the
/// whole submission with `Locked` and leaves the previous picks intact. Tiebreaker points are only
/// kept on the week's last game.
#[cfg(feature = "ssr")]
pub fn submit_picks(
    conn: &mut SqliteConnection,
    user_id: i32,
    week: i32,
    season: i32,
    submissions: &[PickSubmission],
    now: NaiveDateTime,
) -> Result<Vec<Pick>, PoolError> {
    validate_week(week, season)?;

    conn.transaction(|conn| -> Result<_, PoolError> {
        let user: Option<User> = users::table
            .filter(users::id.eq(user_id))
            .filter(users::is_active.eq(true))
            .select(User::as_select())
            .first(conn)
            .optional()?;
        if user.is_none() {
            return Err(PoolError::not_found(format!("active user {}", user_id)));
        }

        let week_games: Vec<Game> = games::table
            .filter(games::season.eq(season))
            .filter(games::week.eq(week))
            .select(Game::as_select())
            .load(conn)?;
        if week_games.is_empty() {
            return Err(PoolError::not_found(format!(
                "no games scheduled for week {} of {}",
                week, season
            )));
        }
        check_submission(&week_games, submissions)?;

        let game_ids: Vec<i32> = week_games.iter().map(|g| g.id).collect();
        let existing: Vec<Pick> = picks::table
            .filter(picks::user_id.eq(user_id))
            .filter(picks::game_id.eq_any(&game_ids))
            .select(Pick::as_select())
            .load(conn)?;

        let locked: HashSet<i32> = week_games
            .iter()
            .filter(|g| is_locked(g, now))
            .map(|g| g.id)
            .collect();
        let tiebreaker_id = tiebreaker_game(&week_games).map(|g| g.id);

        for submission in submissions.iter().filter(|s| locked.contains(&s.game_id)) {
            let kept = existing.iter().find(|p| p.game_id == submission.game_id);
            let mut normalized = submission.clone();
            if Some(submission.game_id) != tiebreaker_id {
                normalized.tiebreaker_points = None;
            }
            if !kept.is_some_and(|p| unchanged(p, &normalized)) {
                warn!(
                    "Rejected pick change from user {} on locked game {}",
                    user_id, submission.game_id
                );
                return Err(PoolError::Locked {
                    game_id: submission.game_id,
                });
            }
        }

        let open_games: Vec<i32> = game_ids
            .iter()
            .filter(|id| !locked.contains(id))
            .copied()
            .collect();
        diesel::delete(
            picks::table
                .filter(picks::user_id.eq(user_id))
                .filter(picks::game_id.eq_any(&open_games)),
        )
        .execute(conn)?;

        let new_picks: Vec<NewPick> = submissions
            .iter()
            .filter(|s| !locked.contains(&s.game_id))
            .map(|s| NewPick {
                user_id,
                game_id: s.game_id,
                selected_team: &s.selected_team,
                confidence: s.confidence,
                tiebreaker_points: if Some(s.game_id) == tiebreaker_id {
                    s.tiebreaker_points
                } else {
                    None
                },
            })
            .collect();
        diesel::insert_into(picks::table)
            .values(&new_picks)
            .execute(conn)?;

        picks::table
            .filter(picks::user_id.eq(user_id))
            .filter(picks::game_id.eq_any(&game_ids))
            .order(picks::game_id.asc())
            .select(Pick::as_select())
            .load(conn)
            .map_err(PoolError::from)
    })
}

/// A user's picks for the week, by game id.
#[cfg(feature = "ssr")]
pub fn user_picks(
    conn: &mut SqliteConnection,
    user_id: i32,
    week: i32,
    season: i32,
) -> Result<Vec<Pick>, PoolError> {
    validate_week(week, season)?;
    let picks: Vec<Pick> = picks::table
        .inner_join(games::table)
        .filter(picks::user_id.eq(user_id))
        .filter(games::season.eq(season))
        .filter(games::week.eq(week))
        .order(picks::game_id.asc())
        .select(Pick::as_select())
        .load(conn)?;
    Ok(picks)
}
