use chrono::NaiveDateTime;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::users))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct User {
    pub id: i32,
    pub username: String,
    pub alias: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl User {
    /// The name shown on leaderboards: the alias when set, the username otherwise.
    pub fn display_name(&self) -> &str {
        match self.alias.as_deref() {
            Some(alias) if !alias.trim().is_empty() => alias,
            _ => &self.username,
        }
    }
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub alias: Option<&'a str>,
    pub is_admin: bool,
    // is_active and created_at use defaults
}

/// Lifecycle of a scheduled game. Scores are only recorded once a game is final.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::InProgress => "in_progress",
            GameStatus::Final => "final",
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(GameStatus::Scheduled),
            "in_progress" => Ok(GameStatus::InProgress),
            "final" => Ok(GameStatus::Final),
            other => Err(format!("Unknown game status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::games))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct Game {
    pub id: i32,
    pub season: i32,
    pub week: i32,
    pub kickoff_at: NaiveDateTime,
    pub home_team: String,
    pub away_team: String,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    /// Negative when the home team is favored.
    pub spread: f64,
    pub status: String,
}

impl Game {
    /// Parses the stored status. Unknown values are treated as scheduled.
    pub fn state(&self) -> GameStatus {
        self.status.parse().unwrap_or(GameStatus::Scheduled)
    }

    /// Final scores, if the game has concluded.
    pub fn final_score(&self) -> Option<GameScore> {
        if self.state() != GameStatus::Final {
            return None;
        }
        match (self.home_score, self.away_score) {
            (Some(home_score), Some(away_score)) => Some(GameScore {
                home_score,
                away_score,
            }),
            _ => None,
        }
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::games)]
pub struct NewGame<'a> {
    pub season: i32,
    pub week: i32,
    pub kickoff_at: NaiveDateTime,
    pub home_team: &'a str,
    pub away_team: &'a str,
    pub spread: f64,
    // scores are NULL and status is 'scheduled' until results are entered
}

/// A home/away score pair, real or hypothetical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameScore {
    pub home_score: i32,
    pub away_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::picks))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct Pick {
    pub id: i32,
    pub user_id: i32,
    pub game_id: i32,
    pub selected_team: String,
    /// Weight of the pick: the points earned when it is correct.
    pub confidence: i32,
    pub tiebreaker_points: Option<i32>,
    pub is_correct: Option<bool>,
    pub points_earned: Option<i32>,
    pub created_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::picks)]
pub struct NewPick<'a> {
    pub user_id: i32,
    pub game_id: i32,
    pub selected_team: &'a str,
    pub confidence: i32,
    pub tiebreaker_points: Option<i32>,
}

/// One pick as submitted by a user for the week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickSubmission {
    pub game_id: i32,
    pub selected_team: String,
    #[serde(default = "default_confidence")]
    pub confidence: i32,
    #[serde(default)]
    pub tiebreaker_points: Option<i32>,
}

fn default_confidence() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ssr", derive(Queryable, Selectable))]
#[cfg_attr(feature = "ssr", diesel(table_name = crate::schema::weekly_scores))]
#[cfg_attr(feature = "ssr", diesel(check_for_backend(Sqlite)))]
pub struct WeeklyScore {
    pub id: i32,
    pub user_id: i32,
    pub week: i32,
    pub season: i32,
    pub correct_picks: i32,
    pub total_picks: i32,
    pub total_points: i32,
    pub possible_points: i32,
    pub win_percentage: f64,
    pub weekly_rank: Option<i32>,
    pub calculated_at: NaiveDateTime,
}

#[cfg(feature = "ssr")]
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::weekly_scores)]
pub struct NewWeeklyScore {
    pub user_id: i32,
    pub week: i32,
    pub season: i32,
    pub correct_picks: i32,
    pub total_picks: i32,
    pub total_points: i32,
    pub possible_points: i32,
    pub win_percentage: f64,
    pub calculated_at: NaiveDateTime,
    // weekly_rank is assigned after every row of the week is written
}

/// A weekly score joined with the user's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaderboardEntry {
    pub user_id: i32,
    pub username: String,
    pub display_name: String,
    pub week: i32,
    pub season: i32,
    pub correct_picks: i32,
    pub total_picks: i32,
    pub total_points: i32,
    pub possible_points: i32,
    pub win_percentage: f64,
    pub weekly_rank: Option<i32>,
}

/// Result of recomputing a week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecalculateSummary {
    pub week: i32,
    pub season: i32,
    pub users_updated: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// A user's season totals. Computed on every read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonStanding {
    pub user_id: i32,
    pub display_name: String,
    pub weeks_played: i32,
    pub total_correct: i32,
    pub total_games: i32,
    pub total_points: i32,
    pub total_possible: i32,
    pub season_win_percentage: f64,
    pub season_rank: i32,
}

/// One row of a what-if projection for a week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastEntry {
    pub user_id: i32,
    pub display_name: String,
    pub correct_picks: i32,
    pub total_picks: i32,
    pub projected_points: i32,
    pub weekly_record: String,
    pub weekly_rank: i32,
    pub yearly_rank: Option<i32>,
    /// Negative values are an improvement.
    pub yearly_rank_change: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PickPercentages {
    pub home_picks: i32,
    pub away_picks: i32,
    pub home_percentage: f64,
    pub away_percentage: f64,
    pub is_upset: bool,
}

/// A user's row in the recap grid. `picks` maps game id to the selected team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecapRow {
    pub user_id: i32,
    pub display_name: String,
    pub picks: BTreeMap<i32, Option<String>>,
    pub tiebreaker_points: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recap {
    pub week: i32,
    pub season: i32,
    pub games: Vec<Game>,
    pub tiebreaker_game_id: Option<i32>,
    pub per_user_picks: Vec<RecapRow>,
    pub pick_percentages: BTreeMap<i32, PickPercentages>,
}

/// The recap is withheld until the week's first kickoff.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "recap", rename_all = "snake_case")]
pub enum RecapOutcome {
    Available(Recap),
    Gated { unlocks_at: NaiveDateTime },
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::sessions)]
pub struct NewSession {
    pub user_id: i32,
    pub token: String,
    // created_at uses default
}

#[cfg(feature = "ssr")]
#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::admin_sessions)]
pub struct NewAdminSession {
    pub token: String,
}
