//! Season standings, summed from the stored weekly scores on every read.

#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
use std::collections::BTreeMap;

use crate::model::{SeasonStanding, User, WeeklyScore};
use crate::ranking::competition_ranks;
#[cfg(feature = "ssr")]
use crate::schema::{users, weekly_scores};
use crate::scoring::percentage;
#[cfg(feature = "ssr")]
use crate::{validate_season, PoolError};

/// Sorts standings best-first and assigns shared season ranks.
///
/// Order is total points, then correct picks, then weeks played, all descending, with the
/// display name (case-insensitive) fixing the order inside a tie. Rows equal on the first three
/// keys share a rank.
pub fn rank_standings(standings: &mut [SeasonStanding]) {
    standings.sort_by(|a, b| {
        b.total_points
            .cmp(&a.total_points)
            .then(b.total_correct.cmp(&a.total_correct))
            .then(b.weeks_played.cmp(&a.weeks_played))
            .then(
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase()),
            )
            .then(a.user_id.cmp(&b.user_id))
    });
    let ranks = competition_ranks(standings, |s| {
        (s.total_points, s.total_correct, s.weeks_played)
    });
    for (standing, rank) in standings.iter_mut().zip(ranks) {
        standing.season_rank = rank;
    }
}

/// Sums weekly rows per user into ranked season standings.
///
/// Users without a single scored week are left out, except admins, who always appear (with
/// zeros) so the pool's own account is visible from the first week.
pub fn build_standings(users: &[User], weekly: &[WeeklyScore]) -> Vec<SeasonStanding> {
    let mut totals: BTreeMap<i32, SeasonStanding> = BTreeMap::new();

    for user in users {
        let standing = SeasonStanding {
            user_id: user.id,
            display_name: user.display_name().to_string(),
            weeks_played: 0,
            total_correct: 0,
            total_games: 0,
            total_points: 0,
            total_possible: 0,
            season_win_percentage: 0.0,
            season_rank: 0,
        };
        totals.insert(user.id, standing);
    }

    for row in weekly {
        // Scores for users we don't know about can't be displayed.
        let Some(standing) = totals.get_mut(&row.user_id) else {
            continue;
        };
        standing.weeks_played += 1;
        standing.total_correct += row.correct_picks;
        standing.total_games += row.total_picks;
        standing.total_points += row.total_points;
        standing.total_possible += row.possible_points;
    }

    let admins: Vec<i32> = users.iter().filter(|u| u.is_admin).map(|u| u.id).collect();
    let mut standings: Vec<SeasonStanding> = totals
        .into_values()
        .filter(|s| s.weeks_played > 0 || admins.contains(&s.user_id))
        .map(|mut s| {
            s.season_win_percentage = percentage(s.total_correct, s.total_games);
            s
        })
        .collect();

    rank_standings(&mut standings);
    standings
}

/// Loads every weekly score of the season and returns the ranked standings.
#[cfg(feature = "ssr")]
pub fn season_standings(
    conn: &mut SqliteConnection,
    season: i32,
) -> Result<Vec<SeasonStanding>, PoolError> {
    validate_season(season)?;

    let weekly: Vec<WeeklyScore> = weekly_scores::table
        .filter(weekly_scores::season.eq(season))
        .select(WeeklyScore::as_select())
        .load(conn)?;
    let all_users: Vec<User> = users::table.select(User::as_select()).load(conn)?;

    Ok(build_standings(&all_users, &weekly))
}
