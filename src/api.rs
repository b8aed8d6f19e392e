//! JSON routes for scripts and external clients, next to the Leptos pages.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use diesel::SqliteConnection;
use leptos::logging::log;
use serde::Deserialize;
use std::collections::HashMap;

use crate::app::DbPool;
use crate::forecast::forecast_week;
use crate::model::{ForecastEntry, GameScore, LeaderboardEntry, RecalculateSummary, RecapOutcome,
    SeasonStanding};
use crate::recap::week_recap;
use crate::scoring::{recompute_week, weekly_leaderboard};
use crate::settings::current_clock;
use crate::standings::season_standings;
use crate::{validate_admin_token, PoolError};

pub const ADMIN_COOKIE: &str = "admin_token";
pub const SESSION_COOKIE: &str = "session_token";

/// Runs a blocking store call on tokio's blocking pool with a pooled connection.
pub async fn run_blocking<T, F>(pool: DbPool, f: F) -> Result<T, PoolError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, PoolError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        f(&mut conn)
    })
    .await
    .map_err(|e| PoolError::Pool(e.to_string()))?
}

/// Finds a cookie by name in the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn require_admin(conn: &mut SqliteConnection, token: Option<&str>) -> Result<(), PoolError> {
    match token {
        Some(token) if validate_admin_token(conn, token)? => Ok(()),
        _ => Err(PoolError::Unauthorized),
    }
}

/// The requested season, or the one on the season clock.
fn resolve_season(conn: &mut SqliteConnection, season: Option<i32>) -> Result<i32, PoolError> {
    match season {
        Some(season) => Ok(season),
        None => Ok(current_clock(conn)?.season),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SeasonQuery {
    pub season: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub week: i32,
    pub season: Option<i32>,
    #[serde(default)]
    pub scores: HashMap<i32, GameScore>,
}

pub fn router<S>(pool: DbPool) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/scores/calculate/{week}", post(calculate_week))
        .route("/scores/season", get(season_scores))
        .route("/scores/week/{week}", get(week_scores))
        .route("/tracker/forecast", post(forecast))
        .route("/recap/week/{week}", get(recap))
        .with_state(pool)
}

async fn calculate_week(
    State(pool): State<DbPool>,
    Path(week): Path<i32>,
    Query(query): Query<SeasonQuery>,
    headers: HeaderMap,
) -> Result<Json<RecalculateSummary>, PoolError> {
    let token = cookie_value(&headers, ADMIN_COOKIE);
    let summary = run_blocking(pool, move |conn| {
        require_admin(conn, token.as_deref())?;
        let season = resolve_season(conn, query.season)?;
        recompute_week(conn, week, season)
    })
    .await?;
    log!(
        "Recalculated week {} of {} over HTTP ({} users)",
        summary.week,
        summary.season,
        summary.users_updated
    );
    Ok(Json(summary))
}

async fn season_scores(
    State(pool): State<DbPool>,
    Query(query): Query<SeasonQuery>,
) -> Result<Json<Vec<SeasonStanding>>, PoolError> {
    let standings = run_blocking(pool, move |conn| {
        let season = resolve_season(conn, query.season)?;
        season_standings(conn, season)
    })
    .await?;
    Ok(Json(standings))
}

async fn week_scores(
    State(pool): State<DbPool>,
    Path(week): Path<i32>,
    Query(query): Query<SeasonQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, PoolError> {
    let leaderboard = run_blocking(pool, move |conn| {
        let season = resolve_season(conn, query.season)?;
        weekly_leaderboard(conn, week, season)
    })
    .await?;
    Ok(Json(leaderboard))
}

async fn forecast(
    State(pool): State<DbPool>,
    Json(request): Json<ForecastRequest>,
) -> Result<Json<Vec<ForecastEntry>>, PoolError> {
    let entries = run_blocking(pool, move |conn| {
        let season = resolve_season(conn, request.season)?;
        forecast_week(conn, &request.scores, request.week, season)
    })
    .await?;
    Ok(Json(entries))
}

async fn recap(
    State(pool): State<DbPool>,
    Path(week): Path<i32>,
    Query(query): Query<SeasonQuery>,
) -> Result<Json<RecapOutcome>, PoolError> {
    let outcome = run_blocking(pool, move |conn| {
        let season = resolve_season(conn, query.season)?;
        week_recap(conn, week, season, Utc::now().naive_utc())
    })
    .await?;
    Ok(Json(outcome))
}
