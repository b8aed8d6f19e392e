//! The weekly recap grid: who picked what, how the pool split on each game, and which games
//! were upsets.

use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
use std::collections::{BTreeMap, HashMap};

use crate::model::{Game, Pick, PickPercentages, Recap, RecapRow, User};
#[cfg(feature = "ssr")]
use crate::model::RecapOutcome;
#[cfg(feature = "ssr")]
use crate::schema::{games, picks, users};
use crate::scoring::{percentage, winning_team};
#[cfg(feature = "ssr")]
use crate::{validate_week, PoolError};

/// A final game is an upset when the winner was picked by less than this share of the pool.
pub const UPSET_THRESHOLD: f64 = 40.0;

/// Returns the unlock time when the week's earliest kickoff is still in the future, or `None`
/// once the recap may be shown.
pub fn recap_unlocks_at(week_games: &[Game], now: NaiveDateTime) -> Option<NaiveDateTime> {
    let first_kickoff = week_games.iter().map(|g| g.kickoff_at).min()?;
    (first_kickoff > now).then_some(first_kickoff)
}

/// The chronologically last game of the week, which doubles as the tiebreaker game.
pub fn tiebreaker_game(week_games: &[Game]) -> Option<&Game> {
    week_games.iter().max_by_key(|g| (g.kickoff_at, g.id))
}

/// Splits the picks on one game between home and away and flags upsets.
pub fn pick_percentages(game: &Game, game_picks: &[&Pick]) -> PickPercentages {
    let home_picks = game_picks
        .iter()
        .filter(|p| p.selected_team == game.home_team)
        .count() as i32;
    let away_picks = game_picks
        .iter()
        .filter(|p| p.selected_team == game.away_team)
        .count() as i32;
    let total = home_picks + away_picks;
    let home_percentage = percentage(home_picks, total);
    let away_percentage = percentage(away_picks, total);

    let is_upset = game
        .final_score()
        .and_then(|score| winning_team(&game.home_team, &game.away_team, score))
        .map(|winner| {
            let winner_picks = if winner == game.home_team {
                home_picks
            } else {
                away_picks
            };
            // Raw counts, not the rounded percentages. A game nobody picked has a 0% share on
            // both sides.
            total == 0 || (winner_picks as f64) * 100.0 < UPSET_THRESHOLD * total as f64
        })
        .unwrap_or(false);

    PickPercentages {
        home_picks,
        away_picks,
        home_percentage,
        away_percentage,
        is_upset,
    }
}

/// Builds the recap grid for a week. Callers are responsible for gating.
///
/// Every active user gets a row, with `None` for games they skipped. Rows are ordered by display
/// name, case-insensitively.
pub fn compose_recap(
    active_users: &[User],
    week_games: &[Game],
    week_picks: &[Pick],
    week: i32,
    season: i32,
) -> Recap {
    let mut games_sorted: Vec<Game> = week_games.to_vec();
    games_sorted.sort_by_key(|g| (g.kickoff_at, g.id));
    let tiebreaker_game_id = tiebreaker_game(week_games).map(|g| g.id);

    let mut picks_by_game: HashMap<i32, Vec<&Pick>> = HashMap::new();
    let mut picks_by_user: HashMap<(i32, i32), &Pick> = HashMap::new();
    for pick in week_picks {
        picks_by_game.entry(pick.game_id).or_default().push(pick);
        picks_by_user.insert((pick.user_id, pick.game_id), pick);
    }

    let pick_percentages: BTreeMap<i32, PickPercentages> = games_sorted
        .iter()
        .map(|game| {
            let game_picks = picks_by_game.get(&game.id).map(Vec::as_slice).unwrap_or(&[]);
            (game.id, pick_percentages(game, game_picks))
        })
        .collect();

    let mut per_user_picks: Vec<RecapRow> = active_users
        .iter()
        .map(|user| {
            let picks = games_sorted
                .iter()
                .map(|game| {
                    let selection = picks_by_user
                        .get(&(user.id, game.id))
                        .map(|p| p.selected_team.clone());
                    (game.id, selection)
                })
                .collect();
            let tiebreaker_points = tiebreaker_game_id
                .and_then(|game_id| picks_by_user.get(&(user.id, game_id)))
                .and_then(|p| p.tiebreaker_points);
            RecapRow {
                user_id: user.id,
                display_name: user.display_name().to_string(),
                picks,
                tiebreaker_points,
            }
        })
        .collect();
    per_user_picks.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then(a.user_id.cmp(&b.user_id))
    });

    Recap {
        week,
        season,
        games: games_sorted,
        tiebreaker_game_id,
        per_user_picks,
        pick_percentages,
    }
}

/// Loads the recap for a week, or the unlock time if the first game hasn't kicked off yet.
///
/// No pick data is read before the gate opens. A week without any games is `NotFound`.
#[cfg(feature = "ssr")]
pub fn week_recap(
    conn: &mut SqliteConnection,
    week: i32,
    season: i32,
    now: NaiveDateTime,
) -> Result<RecapOutcome, PoolError> {
    validate_week(week, season)?;

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
    if let Some(unlocks_at) = recap_unlocks_at(&week_games, now) {
        return Ok(RecapOutcome::Gated { unlocks_at });
    }

    let game_ids: Vec<i32> = week_games.iter().map(|g| g.id).collect();
    let week_picks: Vec<Pick> = picks::table
        .filter(picks::game_id.eq_any(game_ids))
        .select(Pick::as_select())
        .load(conn)?;
    let active_users: Vec<User> = users::table
        .filter(users::is_active.eq(true))
        .select(User::as_select())
        .load(conn)?;

    Ok(RecapOutcome::Available(compose_recap(
        &active_users,
        &week_games,
        &week_picks,
        week,
        season,
    )))
}


#[cfg(all(test, feature = "ssr"))]
mod db_tests {
    use super::*;
    use crate::test_support::*;
    use chrono::Utc;

    #[test]
    fn test_recap_is_gated_before_first_kickoff() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", None, false)?;
            let kickoff = hours_from_now(24);
            let g1 = insert_game(conn, 3, kickoff, "KC", "BUF")?;
            insert_game(conn, 3, hours_from_now(48), "DAL", "PHI")?;
            insert_pick(conn, a, g1, "KC", 1)?;

            let outcome = week_recap(conn, 3, SEASON, Utc::now().naive_utc())?;
            assert_eq!(outcome, RecapOutcome::Gated { unlocks_at: kickoff });

            Ok(())
        });
    }

    #[test]
    fn test_recap_opens_after_first_kickoff() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", Some("Avery"), false)?;
            let b = insert_user(conn, "b", Some("blake"), false)?;
            let g1 = insert_game(conn, 3, hours_from_now(-1), "KC", "BUF")?;
            let g2 = insert_game(conn, 3, hours_from_now(3), "DAL", "PHI")?;
            insert_pick(conn, a, g1, "KC", 1)?;
            insert_pick(conn, b, g2, "PHI", 1)?;

            let outcome = week_recap(conn, 3, SEASON, Utc::now().naive_utc())?;
            let RecapOutcome::Available(recap) = outcome else {
                panic!("recap should be available");
            };
            assert_eq!(recap.per_user_picks.len(), 2);
            assert_eq!(recap.per_user_picks[0].user_id, a);
            assert_eq!(recap.per_user_picks[1].picks.get(&g2), Some(&Some("PHI".to_string())));
            assert_eq!(recap.tiebreaker_game_id, Some(g2));

            Ok(())
        });
    }

    #[test]
    fn test_recap_for_unknown_week() {
        run_test_in_database(|conn| {
            let err = week_recap(conn, 17, SEASON, Utc::now().naive_utc())
                .expect_err("no games in week 17");
            assert!(matches!(err, PoolError::NotFound(_)));

            Ok(())
        });
    }
}
