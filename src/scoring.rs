//! Weekly scoring: grades picks against final results, tallies each user's week and assigns
//! weekly ranks.

#[cfg(feature = "ssr")]
use chrono::Utc;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use leptos::logging::log;
#[cfg(feature = "ssr")]
use std::collections::{BTreeMap, HashMap};

use crate::model::{Game, GameScore, LeaderboardEntry, Pick};
#[cfg(feature = "ssr")]
use crate::model::{NewWeeklyScore, RecalculateSummary, User, WeeklyScore};
use crate::ranking::competition_ranks;
#[cfg(feature = "ssr")]
use crate::schema::{games, picks, users, weekly_scores};
#[cfg(feature = "ssr")]
use crate::{validate_week, PoolError};

/// Returns the team with the strictly higher score. A tied score has no winner, so picks on
/// either side of a tie are graded incorrect.
pub fn winning_team<'a>(home_team: &'a str, away_team: &'a str, score: GameScore) -> Option<&'a str> {
    if score.home_score > score.away_score {
        Some(home_team)
    } else if score.away_score > score.home_score {
        Some(away_team)
    } else {
        None
    }
}

/// Grades a pick against its game. Returns `(is_correct, points_earned)` for a final game and
/// `None` while the game is still undecided.
pub fn grade_pick(pick: &Pick, game: &Game) -> Option<(bool, i32)> {
    let score = game.final_score()?;
    let correct = winning_team(&game.home_team, &game.away_team, score)
        .map(|winner| winner == pick.selected_team)
        .unwrap_or(false);
    Some((correct, if correct { pick.confidence } else { 0 }))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of `part` in `whole` as a 0-100 percentage rounded to two decimals. Zero when `whole`
/// is zero.
pub fn percentage(part: i32, whole: i32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

/// A user's totals for one week.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyTally {
    pub user_id: i32,
    pub correct_picks: i32,
    pub total_picks: i32,
    pub total_points: i32,
    pub possible_points: i32,
    pub win_percentage: f64,
}

/// Tallies one user's picks for the week. Every pick counts toward `total_picks`; only picks on
/// final games contribute to `possible_points`.
pub fn tally_week(user_id: i32, picks: &[(&Pick, &Game)]) -> WeeklyTally {
    let mut correct_picks = 0;
    let mut total_points = 0;
    let mut possible_points = 0;

    for (pick, game) in picks {
        if let Some((correct, points)) = grade_pick(pick, game) {
            possible_points += pick.confidence;
            if correct {
                correct_picks += 1;
                total_points += points;
            }
        }
    }

    let total_picks = picks.len() as i32;
    WeeklyTally {
        user_id,
        correct_picks,
        total_picks,
        total_points,
        possible_points,
        win_percentage: percentage(correct_picks, total_picks),
    }
}

/// Sorts leaderboard rows best-first (total points, then correct picks, then display name) and
/// fills in shared weekly ranks.
pub fn rank_leaderboard(rows: &mut [LeaderboardEntry]) {
    rows.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.correct_picks.cmp(&a.correct_picks))
            .then(
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
            )
    });
    let ranks = competition_ranks(rows, |r| (r.total_points, r.correct_picks));
    for (row, rank) in rows.iter_mut().zip(ranks) {
        row.weekly_rank = Some(rank);
    }
}

/// Regrades every pick of the week, rewrites each participant's weekly score and reassigns the
/// weekly ranks.
///
/// The whole run happens inside one `BEGIN IMMEDIATE` transaction, so a concurrent recompute of
/// the same week waits for this one and any failure leaves the previous rows untouched. A week
/// where nobody has picked is a successful no-op.
#[cfg(feature = "ssr")]
pub fn recompute_week(
    conn: &mut SqliteConnection,
    week: i32,
    season: i32,
) -> Result<RecalculateSummary, PoolError> {
    validate_week(week, season)?;

    let summary = conn.immediate_transaction(|conn| -> Result<_, PoolError> {
        let week_games: Vec<Game> = games::table
            .filter(games::season.eq(season))
            .filter(games::week.eq(week))
            .select(Game::as_select())
            .load(conn)?;
        let games_by_id: HashMap<i32, &Game> = week_games.iter().map(|g| (g.id, g)).collect();

        let week_picks: Vec<Pick> = picks::table
            .filter(picks::game_id.eq_any(games_by_id.keys().copied().collect::<Vec<i32>>()))
            .select(Pick::as_select())
            .load(conn)?;

        // Grade each pick. Picks on undecided games are reset to NULL.
        let mut by_user: BTreeMap<i32, Vec<(&Pick, &Game)>> = BTreeMap::new();
        for pick in &week_picks {
            let Some(game) = games_by_id.get(&pick.game_id) else {
                continue;
            };
            let grade = grade_pick(pick, game);
            if grade != pick.is_correct.zip(pick.points_earned) {
                diesel::update(picks::table.filter(picks::id.eq(pick.id)))
                    .set((
                        picks::is_correct.eq(grade.map(|(correct, _)| correct)),
                        picks::points_earned.eq(grade.map(|(_, points)| points)),
                    ))
                    .execute(conn)?;
            }
            by_user.entry(pick.user_id).or_default().push((pick, *game));
        }

        // Find-or-create each user's row, rewriting it only when a total changed.
        let existing: HashMap<i32, WeeklyScore> = weekly_scores::table
            .filter(weekly_scores::season.eq(season))
            .filter(weekly_scores::week.eq(week))
            .select(WeeklyScore::as_select())
            .load(conn)?
            .into_iter()
            .map(|row| (row.user_id, row))
            .collect();

        let now = Utc::now().naive_utc();
        for (&user_id, user_picks) in &by_user {
            let tally = tally_week(user_id, user_picks);
            let row = NewWeeklyScore {
                user_id,
                week,
                season,
                correct_picks: tally.correct_picks,
                total_picks: tally.total_picks,
                total_points: tally.total_points,
                possible_points: tally.possible_points,
                win_percentage: tally.win_percentage,
                calculated_at: now,
            };
            match existing.get(&user_id) {
                None => {
                    diesel::insert_into(weekly_scores::table)
                        .values(&row)
                        .execute(conn)?;
                }
                Some(current) if !same_totals(current, &tally) => {
                    diesel::update(weekly_scores::table.filter(weekly_scores::id.eq(current.id)))
                        .set(&row)
                        .execute(conn)?;
                }
                Some(_) => {}
            }
        }

        // Rows left over from users who no longer hold a pick this week.
        let stale: Vec<i32> = existing
            .keys()
            .filter(|user_id| !by_user.contains_key(user_id))
            .copied()
            .collect();
        if !stale.is_empty() {
            diesel::delete(
                weekly_scores::table
                    .filter(weekly_scores::season.eq(season))
                    .filter(weekly_scores::week.eq(week))
                    .filter(weekly_scores::user_id.eq_any(stale)),
            )
            .execute(conn)?;
        }

        let mut leaderboard = load_leaderboard(conn, week, season)?;
        rank_leaderboard(&mut leaderboard);
        for entry in &leaderboard {
            diesel::update(
                weekly_scores::table
                    .filter(weekly_scores::season.eq(season))
                    .filter(weekly_scores::week.eq(week))
                    .filter(weekly_scores::user_id.eq(entry.user_id)),
            )
            .set(weekly_scores::weekly_rank.eq(entry.weekly_rank))
            .execute(conn)?;
        }

        Ok(RecalculateSummary {
            week,
            season,
            users_updated: by_user.len(),
            leaderboard,
        })
    })?;

    log!(
        "Recalculated week {} of {}: {} users scored",
        week,
        season,
        summary.users_updated
    );
    Ok(summary)
}

#[cfg(feature = "ssr")]
fn same_totals(row: &WeeklyScore, tally: &WeeklyTally) -> bool {
    row.correct_picks == tally.correct_picks
        && row.total_picks == tally.total_picks
        && row.total_points == tally.total_points
        && row.possible_points == tally.possible_points
        && row.win_percentage == tally.win_percentage
}

#[cfg(feature = "ssr")]
fn load_leaderboard(
    conn: &mut SqliteConnection,
    week: i32,
    season: i32,
) -> Result<Vec<LeaderboardEntry>, diesel::result::Error> {
    let rows: Vec<(WeeklyScore, User)> = weekly_scores::table
        .inner_join(users::table)
        .filter(weekly_scores::season.eq(season))
        .filter(weekly_scores::week.eq(week))
        .select((WeeklyScore::as_select(), User::as_select()))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(score, user)| LeaderboardEntry {
            user_id: user.id,
            display_name: user.display_name().to_string(),
            username: user.username,
            week: score.week,
            season: score.season,
            correct_picks: score.correct_picks,
            total_picks: score.total_picks,
            total_points: score.total_points,
            possible_points: score.possible_points,
            win_percentage: score.win_percentage,
            weekly_rank: score.weekly_rank,
        })
        .collect())
}

/// Returns the stored leaderboard for a week, best-first, with the ranks from the last recompute.
#[cfg(feature = "ssr")]
pub fn weekly_leaderboard(
    conn: &mut SqliteConnection,
    week: i32,
    season: i32,
) -> Result<Vec<LeaderboardEntry>, PoolError> {
    validate_week(week, season)?;
    let mut rows = load_leaderboard(conn, week, season)?;
    rows.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.correct_picks.cmp(&a.correct_picks))
            .then(
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
            )
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn game(id: i32, home: &str, away: &str, score: Option<(i32, i32)>) -> Game {
        Game {
            id,
            season: 2024,
            week: 3,
            kickoff_at: NaiveDateTime::default(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            spread: -2.5,
            status: if score.is_some() { "final" } else { "scheduled" }.to_string(),
        }
    }

    fn pick(user_id: i32, game_id: i32, team: &str, confidence: i32) -> Pick {
        Pick {
            id: 0,
            user_id,
            game_id,
            selected_team: team.to_string(),
            confidence,
            tiebreaker_points: None,
            is_correct: None,
            points_earned: None,
            created_at: NaiveDateTime::default(),
        }
    }

    fn entry(user_id: i32, name: &str, total_points: i32, correct_picks: i32) -> LeaderboardEntry {
        LeaderboardEntry {
            user_id,
            username: name.to_lowercase(),
            display_name: name.to_string(),
            week: 3,
            season: 2024,
            correct_picks,
            total_picks: 4,
            total_points,
            possible_points: 40,
            win_percentage: percentage(correct_picks, 4),
            weekly_rank: None,
        }
    }

    #[test]
    fn test_winning_team() {
        let score = |h, a| GameScore {
            home_score: h,
            away_score: a,
        };
        assert_eq!(winning_team("KC", "BUF", score(27, 24)), Some("KC"));
        assert_eq!(winning_team("KC", "BUF", score(10, 24)), Some("BUF"));
        assert_eq!(winning_team("KC", "BUF", score(20, 20)), None);
    }

    #[test]
    fn test_grade_pick_waits_for_final() {
        let g = game(1, "KC", "BUF", None);
        assert_eq!(grade_pick(&pick(1, 1, "KC", 5), &g), None);

        let mut in_progress = game(1, "KC", "BUF", Some((14, 3)));
        in_progress.status = "in_progress".to_string();
        assert_eq!(grade_pick(&pick(1, 1, "KC", 5), &in_progress), None);
    }

    #[test]
    fn test_grade_pick_final() {
        let g = game(1, "KC", "BUF", Some((31, 17)));
        assert_eq!(grade_pick(&pick(1, 1, "KC", 5), &g), Some((true, 5)));
        assert_eq!(grade_pick(&pick(2, 1, "BUF", 5), &g), Some((false, 0)));
    }

    #[test]
    fn test_tied_game_is_incorrect_for_both_sides() {
        let g = game(1, "KC", "BUF", Some((20, 20)));
        assert_eq!(grade_pick(&pick(1, 1, "KC", 3), &g), Some((false, 0)));
        assert_eq!(grade_pick(&pick(2, 1, "BUF", 3), &g), Some((false, 0)));
    }

    #[test]
    fn test_tally_counts_undecided_picks() {
        let finished = game(1, "KC", "BUF", Some((31, 17)));
        let pending = game(2, "DAL", "PHI", None);
        let p1 = pick(1, 1, "KC", 10);
        let p2 = pick(1, 2, "DAL", 5);

        let tally = tally_week(1, &[(&p1, &finished), (&p2, &pending)]);
        assert_eq!(tally.total_picks, 2);
        assert_eq!(tally.correct_picks, 1);
        assert_eq!(tally.total_points, 10);
        assert_eq!(tally.possible_points, 10);
        assert_eq!(tally.win_percentage, 50.0);
    }

    #[test]
    fn test_tally_empty_week() {
        let tally = tally_week(4, &[]);
        assert_eq!(tally.total_picks, 0);
        assert_eq!(tally.win_percentage, 0.0);
    }

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn test_rank_leaderboard_shared_ties() {
        let mut rows = vec![
            entry(4, "Dana", 15, 2),
            entry(1, "Avery", 20, 3),
            entry(2, "blake", 20, 3),
            entry(3, "Casey", 20, 3),
        ];
        rank_leaderboard(&mut rows);
        let ranks: Vec<_> = rows.iter().map(|r| r.weekly_rank).collect();
        assert_eq!(ranks, vec![Some(1), Some(1), Some(1), Some(4)]);
        assert_eq!(rows[1].display_name, "blake");
    }

    #[test]
    fn test_rank_leaderboard_correct_picks_break_point_ties() {
        let mut rows = vec![entry(1, "Avery", 20, 2), entry(2, "Blake", 20, 3)];
        rank_leaderboard(&mut rows);
        assert_eq!(rows[0].user_id, 2);
        assert_eq!(rows[0].weekly_rank, Some(1));
        assert_eq!(rows[1].weekly_rank, Some(2));
    }
}

#[cfg(all(test, feature = "ssr"))]
mod db_tests {
    use super::*;
    use crate::test_support::*;

    fn stored_rows(conn: &mut SqliteConnection, week: i32) -> QueryResult<Vec<WeeklyScore>> {
        weekly_scores::table
            .filter(weekly_scores::week.eq(week))
            .order(weekly_scores::user_id.asc())
            .select(WeeklyScore::as_select())
            .load(conn)
    }

    #[test]
    fn test_two_final_games_scenario() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", Some("Avery"), false)?;
            let b = insert_user(conn, "b", Some("Blake"), false)?;
            let g1 = insert_game(conn, 3, hours_from_now(-48), "KC", "BUF")?;
            let g2 = insert_game(conn, 3, hours_from_now(-47), "DAL", "PHI")?;
            finish_game(conn, g1, 27, 20)?;
            finish_game(conn, g2, 10, 24)?;

            insert_pick(conn, a, g1, "KC", 10)?;
            insert_pick(conn, a, g2, "PHI", 5)?;
            insert_pick(conn, b, g1, "KC", 10)?;
            insert_pick(conn, b, g2, "DAL", 5)?;

            let summary = recompute_week(conn, 3, SEASON)?;
            assert_eq!(summary.users_updated, 2);
            assert_eq!(summary.leaderboard.len(), 2);

            let top = &summary.leaderboard[0];
            assert_eq!(top.user_id, a);
            assert_eq!(top.correct_picks, 2);
            assert_eq!(top.total_points, 15);
            assert_eq!(top.weekly_rank, Some(1));

            let second = &summary.leaderboard[1];
            assert_eq!(second.user_id, b);
            assert_eq!(second.correct_picks, 1);
            assert_eq!(second.total_points, 10);
            assert_eq!(second.possible_points, 15);
            assert_eq!(second.weekly_rank, Some(2));

            // Picks were graded in place.
            let graded: Vec<(Option<bool>, Option<i32>)> = picks::table
                .filter(picks::user_id.eq(b))
                .order(picks::game_id.asc())
                .select((picks::is_correct, picks::points_earned))
                .load(conn)?;
            assert_eq!(graded, vec![(Some(true), Some(10)), (Some(false), Some(0))]);

            Ok(())
        });
    }

    #[test]
    fn test_three_way_tie_ranks() {
        run_test_in_database(|conn| {
            let g1 = insert_game(conn, 5, hours_from_now(-30), "SF", "SEA")?;
            finish_game(conn, g1, 21, 14)?;
            for name in ["ann", "ben", "cat"] {
                let user = insert_user(conn, name, None, false)?;
                insert_pick(conn, user, g1, "SF", 20)?;
            }
            let loser = insert_user(conn, "dan", None, false)?;
            let g2 = insert_game(conn, 5, hours_from_now(-29), "NYJ", "MIA")?;
            finish_game(conn, g2, 3, 6)?;
            insert_pick(conn, loser, g2, "MIA", 15)?;

            recompute_week(conn, 5, SEASON)?;
            let mut ranks: Vec<i32> = stored_rows(conn, 5)?
                .into_iter()
                .filter_map(|r| r.weekly_rank)
                .collect();
            ranks.sort();
            assert_eq!(ranks, vec![1, 1, 1, 4]);

            Ok(())
        });
    }

    #[test]
    fn test_recompute_is_idempotent() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", None, false)?;
            let b = insert_user(conn, "b", None, false)?;
            let g1 = insert_game(conn, 2, hours_from_now(-10), "GB", "CHI")?;
            let g2 = insert_game(conn, 2, hours_from_now(20), "DET", "MIN")?;
            finish_game(conn, g1, 24, 10)?;
            insert_pick(conn, a, g1, "GB", 3)?;
            insert_pick(conn, a, g2, "DET", 2)?;
            insert_pick(conn, b, g1, "CHI", 1)?;

            recompute_week(conn, 2, SEASON)?;
            let first = stored_rows(conn, 2)?;
            recompute_week(conn, 2, SEASON)?;
            let second = stored_rows(conn, 2)?;
            assert_eq!(first, second);

            // Total picks count every pick, final or not.
            assert_eq!(first[0].total_picks, 2);
            assert_eq!(first[0].possible_points, 3);
            assert_eq!(first[1].total_picks, 1);

            Ok(())
        });
    }

    #[test]
    fn test_recompute_updates_after_correction() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", None, false)?;
            let g1 = insert_game(conn, 4, hours_from_now(-10), "GB", "CHI")?;
            finish_game(conn, g1, 24, 10)?;
            insert_pick(conn, a, g1, "CHI", 4)?;

            recompute_week(conn, 4, SEASON)?;
            assert_eq!(stored_rows(conn, 4)?[0].total_points, 0);

            // An admin corrects the result.
            finish_game(conn, g1, 10, 24)?;
            recompute_week(conn, 4, SEASON)?;
            let rows = stored_rows(conn, 4)?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].total_points, 4);
            assert_eq!(rows[0].win_percentage, 100.0);

            Ok(())
        });
    }

    #[test]
    fn test_week_without_final_games_scores_zero() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", None, false)?;
            let g1 = insert_game(conn, 6, hours_from_now(5), "LV", "DEN")?;
            insert_pick(conn, a, g1, "LV", 1)?;

            let summary = recompute_week(conn, 6, SEASON)?;
            assert_eq!(summary.users_updated, 1);
            assert_eq!(summary.leaderboard[0].total_points, 0);
            assert_eq!(summary.leaderboard[0].correct_picks, 0);
            assert_eq!(summary.leaderboard[0].total_picks, 1);

            Ok(())
        });
    }

    #[test]
    fn test_week_without_picks_is_a_noop() {
        run_test_in_database(|conn| {
            let summary = recompute_week(conn, 9, SEASON)?;
            assert_eq!(summary.users_updated, 0);
            assert!(summary.leaderboard.is_empty());

            Ok(())
        });
    }

    #[test]
    fn test_recompute_rejects_bad_week() {
        run_test_in_database(|conn| {
            let err = recompute_week(conn, 0, SEASON).expect_err("week 0 is invalid");
            assert!(matches!(err, PoolError::Validation(_)));

            Ok(())
        });
    }
}
