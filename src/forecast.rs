//! What-if projections for a week in progress. Nothing here writes to the database.

#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
use std::collections::{BTreeMap, HashMap};

use crate::model::{ForecastEntry, Game, GameScore, Pick, User, WeeklyScore};
use crate::ranking::positional_ranks;
#[cfg(feature = "ssr")]
use crate::schema::{games, picks, users, weekly_scores};
use crate::scoring::{percentage, winning_team};
use crate::standings::build_standings;
use crate::PoolError;
#[cfg(feature = "ssr")]
use crate::validate_week;

/// The largest season rank movement a forecast reports in either direction.
pub const MAX_RANK_SWING: i32 = 5;

/// Rejects negative scores and scores for games outside the week being forecast.
pub fn validate_hypothetical(
    hypothetical: &HashMap<i32, GameScore>,
    week_games: &[Game],
) -> Result<(), PoolError> {
    for (game_id, score) in hypothetical {
        if score.home_score < 0 || score.away_score < 0 {
            return Err(PoolError::validation(format!(
                "scores for game {} must not be negative",
                game_id
            )));
        }
        if !week_games.iter().any(|g| g.id == *game_id) {
            return Err(PoolError::validation(format!(
                "game {} is not part of this week",
                game_id
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Projection {
    correct: i32,
    total: i32,
    points: i32,
}

/// Projects each participant's week from hypothetical scores and ranks them.
///
/// Picks on games missing from `hypothetical` stay undecided and never count as correct, and a
/// hypothetical tie decides neither side. Weekly ranks are strictly positional (correct picks
/// descending, then display name), unlike the shared ranks of the stored leaderboard.
///
/// `season_weekly` holds the season's stored weekly rows. The current season rank comes from
/// those rows as they are; the rank change re-ranks the season with this week's stored rows
/// replaced by the projection, and is clamped to `MAX_RANK_SWING` either way.
pub fn project_week(
    users: &[User],
    week_games: &[Game],
    week_picks: &[Pick],
    hypothetical: &HashMap<i32, GameScore>,
    season_weekly: &[WeeklyScore],
    week: i32,
) -> Vec<ForecastEntry> {
    if week_games.is_empty() {
        return Vec::new();
    }
    let games_by_id: HashMap<i32, &Game> = week_games.iter().map(|g| (g.id, g)).collect();

    let mut projections: BTreeMap<i32, Projection> = BTreeMap::new();
    for pick in week_picks {
        let Some(game) = games_by_id.get(&pick.game_id) else {
            continue;
        };
        let projection = projections.entry(pick.user_id).or_default();
        projection.total += 1;

        let winner = hypothetical
            .get(&pick.game_id)
            .and_then(|score| winning_team(&game.home_team, &game.away_team, *score));
        if winner == Some(pick.selected_team.as_str()) {
            projection.correct += 1;
            projection.points += pick.confidence;
        }
    }

    let names: HashMap<i32, String> = users
        .iter()
        .map(|u| (u.id, u.display_name().to_string()))
        .collect();

    let current_ranks = season_ranks(users, season_weekly.iter().cloned());
    let projected_rows = season_weekly
        .iter()
        .filter(|row| row.week != week)
        .cloned()
        .chain(projections.iter().map(|(&user_id, p)| WeeklyScore {
            id: 0,
            user_id,
            week,
            season: week_games[0].season,
            correct_picks: p.correct,
            total_picks: p.total,
            total_points: p.points,
            possible_points: 0,
            win_percentage: percentage(p.correct, p.total),
            weekly_rank: None,
            calculated_at: Default::default(),
        }));
    let projected_ranks = season_ranks(users, projected_rows);

    let mut entries: Vec<ForecastEntry> = projections
        .into_iter()
        .map(|(user_id, p)| {
            let yearly_rank = current_ranks.get(&user_id).copied();
            let yearly_rank_change = match (yearly_rank, projected_ranks.get(&user_id)) {
                (Some(current), Some(projected)) => {
                    (projected - current).clamp(-MAX_RANK_SWING, MAX_RANK_SWING)
                }
                _ => 0,
            };
            ForecastEntry {
                user_id,
                display_name: names
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| format!("User {}", user_id)),
                correct_picks: p.correct,
                total_picks: p.total,
                projected_points: p.points,
                weekly_record: format!("{}-{}", p.correct, p.total - p.correct),
                weekly_rank: 0,
                yearly_rank,
                yearly_rank_change,
            }
        })
        .collect();

    entries.sort_by(|a, b| {
        b.correct_picks
            .cmp(&a.correct_picks)
            .then(
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
            )
            .then(a.user_id.cmp(&b.user_id))
    });
    let ranks = positional_ranks(entries.len());
    for (entry, rank) in entries.iter_mut().zip(ranks) {
        entry.weekly_rank = rank;
    }
    entries
}

fn season_ranks(
    users: &[User],
    weekly: impl Iterator<Item = WeeklyScore>,
) -> HashMap<i32, i32> {
    let rows: Vec<WeeklyScore> = weekly.collect();
    build_standings(users, &rows)
        .into_iter()
        .map(|s| (s.user_id, s.season_rank))
        .collect()
}

/// Loads the week and the season so far, then projects the week from `hypothetical`.
#[cfg(feature = "ssr")]
pub fn forecast_week(
    conn: &mut SqliteConnection,
    hypothetical: &HashMap<i32, GameScore>,
    week: i32,
    season: i32,
) -> Result<Vec<ForecastEntry>, PoolError> {
    validate_week(week, season)?;

    let week_games: Vec<Game> = games::table
        .filter(games::season.eq(season))
        .filter(games::week.eq(week))
        .select(Game::as_select())
        .load(conn)?;
    if week_games.is_empty() {
        return Ok(Vec::new());
    }
    validate_hypothetical(hypothetical, &week_games)?;

    let game_ids: Vec<i32> = week_games.iter().map(|g| g.id).collect();
    let week_picks: Vec<Pick> = picks::table
        .filter(picks::game_id.eq_any(game_ids))
        .select(Pick::as_select())
        .load(conn)?;
    let all_users: Vec<User> = users::table.select(User::as_select()).load(conn)?;
    let season_weekly: Vec<WeeklyScore> = weekly_scores::table
        .filter(weekly_scores::season.eq(season))
        .select(WeeklyScore::as_select())
        .load(conn)?;

    Ok(project_week(
        &all_users,
        &week_games,
        &week_picks,
        hypothetical,
        &season_weekly,
        week,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn user(id: i32, name: &str) -> User {
        User {
            id,
            username: name.to_lowercase(),
            alias: Some(name.to_string()),
            is_admin: false,
            is_active: true,
            created_at: NaiveDateTime::default(),
        }
    }

    fn game(id: i32, home: &str, away: &str) -> Game {
        Game {
            id,
            season: 2024,
            week: 7,
            kickoff_at: NaiveDateTime::default(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_score: None,
            away_score: None,
            spread: 1.5,
            status: "in_progress".to_string(),
        }
    }

    fn pick(user_id: i32, game_id: i32, team: &str) -> Pick {
        Pick {
            id: 0,
            user_id,
            game_id,
            selected_team: team.to_string(),
            confidence: 1,
            tiebreaker_points: None,
            is_correct: None,
            points_earned: None,
            created_at: NaiveDateTime::default(),
        }
    }

    fn score(home_score: i32, away_score: i32) -> GameScore {
        GameScore {
            home_score,
            away_score,
        }
    }

    fn week_row(user_id: i32, week: i32, correct: i32, points: i32) -> WeeklyScore {
        WeeklyScore {
            id: 0,
            user_id,
            week,
            season: 2024,
            correct_picks: correct,
            total_picks: 2,
            total_points: points,
            possible_points: 2,
            win_percentage: percentage(correct, 2),
            weekly_rank: None,
            calculated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn test_records_and_positional_ranks() {
        let users = vec![user(1, "Casey"), user(2, "avery"), user(3, "Blake")];
        let games = vec![game(10, "KC", "BUF"), game(11, "DAL", "PHI")];
        let picks = vec![
            pick(1, 10, "KC"),
            pick(1, 11, "PHI"),
            pick(2, 10, "KC"),
            pick(2, 11, "DAL"),
            pick(3, 10, "KC"),
            pick(3, 11, "DAL"),
        ];
        let hypothetical = HashMap::from([(10, score(21, 14)), (11, score(7, 17))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &[], 7);
        let rows: Vec<(&str, &str, i32)> = entries
            .iter()
            .map(|e| (e.display_name.as_str(), e.weekly_record.as_str(), e.weekly_rank))
            .collect();
        // Avery and Blake tie on one correct pick but still get distinct ranks.
        assert_eq!(
            rows,
            vec![("Casey", "2-0", 1), ("avery", "1-1", 2), ("Blake", "1-1", 3)]
        );
    }

    #[test]
    fn test_missing_games_are_undecided() {
        let users = vec![user(1, "Avery")];
        let games = vec![game(10, "KC", "BUF"), game(11, "DAL", "PHI")];
        let picks = vec![pick(1, 10, "KC"), pick(1, 11, "DAL")];
        let hypothetical = HashMap::from([(10, score(3, 0))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &[], 7);
        assert_eq!(entries[0].correct_picks, 1);
        assert_eq!(entries[0].total_picks, 2);
        assert_eq!(entries[0].weekly_record, "1-1");
    }

    #[test]
    fn test_hypothetical_tie_decides_neither_side() {
        let users = vec![user(1, "Avery"), user(2, "Blake")];
        let games = vec![game(10, "KC", "BUF")];
        let picks = vec![pick(1, 10, "KC"), pick(2, 10, "BUF")];
        let hypothetical = HashMap::from([(10, score(17, 17))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &[], 7);
        assert!(entries.iter().all(|e| e.correct_picks == 0));
        assert!(entries.iter().all(|e| e.weekly_record == "0-1"));
    }

    #[test]
    fn test_empty_week() {
        let users = vec![user(1, "Avery")];
        let entries = project_week(&users, &[], &[], &HashMap::new(), &[], 7);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_users_without_picks_are_omitted() {
        let users = vec![user(1, "Avery"), user(2, "Blake")];
        let games = vec![game(10, "KC", "BUF")];
        let picks = vec![pick(1, 10, "KC")];

        let entries = project_week(&users, &games, &picks, &HashMap::new(), &[], 7);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, 1);
        assert_eq!(entries[0].weekly_record, "0-1");
    }

    #[test]
    fn test_yearly_rank_and_change() {
        let users = vec![user(1, "Avery"), user(2, "Blake")];
        // Avery leads the season by one point going into week 7.
        let season = vec![week_row(1, 6, 2, 2), week_row(2, 6, 1, 1)];
        let games = vec![game(10, "KC", "BUF"), game(11, "DAL", "PHI")];
        let picks = vec![
            pick(1, 10, "BUF"),
            pick(1, 11, "PHI"),
            pick(2, 10, "KC"),
            pick(2, 11, "DAL"),
        ];
        let hypothetical = HashMap::from([(10, score(21, 14)), (11, score(28, 3))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &season, 7);
        let blake = entries.iter().find(|e| e.user_id == 2).unwrap();
        assert_eq!(blake.weekly_rank, 1);
        assert_eq!(blake.yearly_rank, Some(2));
        assert_eq!(blake.yearly_rank_change, -1);

        let avery = entries.iter().find(|e| e.user_id == 1).unwrap();
        assert_eq!(avery.yearly_rank, Some(1));
        assert_eq!(avery.yearly_rank_change, 1);
    }

    #[test]
    fn test_already_scored_week_is_replaced_not_added() {
        let users = vec![user(1, "Avery"), user(2, "Blake")];
        // Week 7 was partly scored already: Blake holds five stored points for it.
        let season = vec![week_row(1, 6, 2, 2), week_row(2, 6, 1, 1), week_row(2, 7, 1, 5)];
        let games = vec![game(10, "KC", "BUF")];
        let picks = vec![pick(1, 10, "KC"), pick(2, 10, "BUF")];
        let hypothetical = HashMap::from([(10, score(30, 0))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &season, 7);
        let avery = entries.iter().find(|e| e.user_id == 1).unwrap();
        assert_eq!(avery.yearly_rank, Some(2));
        assert_eq!(avery.yearly_rank_change, -1);
        let blake = entries.iter().find(|e| e.user_id == 2).unwrap();
        assert_eq!(blake.yearly_rank, Some(1));
        assert_eq!(blake.yearly_rank_change, 1);
    }

    #[test]
    fn test_rank_change_is_clamped() {
        let mut users: Vec<User> = (1..=8).map(|id| user(id, &format!("User{}", id))).collect();
        users.push(user(9, "Underdog"));
        // Underdog starts last; everybody else has one point.
        let mut season: Vec<WeeklyScore> = (1..=8).map(|id| week_row(id, 1, 1, 1)).collect();
        season.push(week_row(9, 1, 0, 0));
        let games = vec![game(10, "KC", "BUF")];
        let mut picks: Vec<Pick> = (1..=8).map(|id| pick(id, 10, "BUF")).collect();
        let mut big = pick(9, 10, "KC");
        big.confidence = 10;
        picks.push(big);
        let hypothetical = HashMap::from([(10, score(24, 0))]);

        let entries = project_week(&users, &games, &picks, &hypothetical, &season, 2);
        let underdog = entries.iter().find(|e| e.user_id == 9).unwrap();
        assert_eq!(underdog.yearly_rank, Some(9));
        assert_eq!(underdog.yearly_rank_change, -MAX_RANK_SWING);
    }

    #[test]
    fn test_validate_hypothetical() {
        let games = vec![game(10, "KC", "BUF")];
        assert!(validate_hypothetical(&HashMap::from([(10, score(7, 3))]), &games).is_ok());
        assert!(matches!(
            validate_hypothetical(&HashMap::from([(10, score(-1, 3))]), &games),
            Err(PoolError::Validation(_))
        ));
        assert!(matches!(
            validate_hypothetical(&HashMap::from([(99, score(7, 3))]), &games),
            Err(PoolError::Validation(_))
        ));
    }
}

#[cfg(all(test, feature = "ssr"))]
mod db_tests {
    use super::*;
    use crate::scoring::recompute_week;
    use crate::test_support::*;

    #[test]
    fn test_forecast_does_not_write() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", Some("Avery"), false)?;
            let b = insert_user(conn, "b", Some("Blake"), false)?;
            let g1 = insert_game(conn, 8, hours_from_now(-2), "KC", "BUF")?;
            insert_pick(conn, a, g1, "KC", 1)?;
            insert_pick(conn, b, g1, "BUF", 1)?;

            let hypothetical = HashMap::from([(
                g1,
                GameScore {
                    home_score: 14,
                    away_score: 10,
                },
            )]);
            let entries = forecast_week(conn, &hypothetical, 8, SEASON)?;
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].user_id, a);
            assert_eq!(entries[0].weekly_record, "1-0");
            // Nobody has a season rank before any week is scored.
            assert_eq!(entries[0].yearly_rank, None);

            let graded: i64 = picks::table
                .filter(picks::is_correct.is_not_null())
                .count()
                .get_result(conn)?;
            assert_eq!(graded, 0);
            let scores: i64 = weekly_scores::table.count().get_result(conn)?;
            assert_eq!(scores, 0);

            Ok(())
        });
    }

    #[test]
    fn test_forecast_uses_current_season_rank() {
        run_test_in_database(|conn| {
            let a = insert_user(conn, "a", Some("Avery"), false)?;
            let b = insert_user(conn, "b", Some("Blake"), false)?;
            let w1 = insert_game(conn, 1, hours_from_now(-100), "SF", "LA")?;
            finish_game(conn, w1, 20, 17)?;
            insert_pick(conn, a, w1, "SF", 1)?;
            insert_pick(conn, b, w1, "LA", 1)?;
            recompute_week(conn, 1, SEASON)?;

            let w2 = insert_game(conn, 2, hours_from_now(-1), "SEA", "ARI")?;
            insert_pick(conn, a, w2, "SEA", 1)?;
            insert_pick(conn, b, w2, "ARI", 1)?;

            let entries = forecast_week(conn, &HashMap::new(), 2, SEASON)?;
            let blake = entries.iter().find(|e| e.user_id == b).unwrap();
            assert_eq!(blake.yearly_rank, Some(2));
            assert_eq!(blake.yearly_rank_change, 0);
            assert_eq!(blake.weekly_record, "0-1");

            Ok(())
        });
    }

    #[test]
    fn test_forecast_for_empty_week() {
        run_test_in_database(|conn| {
            let entries = forecast_week(conn, &HashMap::new(), 12, SEASON)?;
            assert!(entries.is_empty());

            Ok(())
        });
    }
}
