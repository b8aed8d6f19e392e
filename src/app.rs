use chrono::{NaiveDateTime, Utc};
use leptos::ev::SubmitEvent;
use leptos::logging::log;
use leptos::prelude::*;
use leptos::server_fn::codec::Json;
use leptos::server_fn::error::NoCustomError;
use leptos::task::spawn_local;
use leptos_meta::{provide_meta_context, MetaTags, Stylesheet, Title};
use leptos_router::{
    components::{Route, Router, Routes, A},
    hooks::{use_navigate, use_params_map},
    path, NavigateOptions,
};
use std::collections::{BTreeMap, HashMap};
#[cfg(feature = "ssr")]
use std::env;

use crate::games::ScheduledGame;
use crate::recap::tiebreaker_game;
use crate::model::{
    ForecastEntry, Game, GameScore, LeaderboardEntry, Pick, PickSubmission, RecalculateSummary,
    RecapOutcome, SeasonStanding, User,
};
use crate::settings::SeasonClock;
#[cfg(feature = "ssr")]
use crate::{
    api::{cookie_value, require_admin, run_blocking, ADMIN_COOKIE, SESSION_COOKIE},
    create_admin_session, create_user, create_user_session, delete_admin_session,
    forecast::forecast_week,
    games::{create_game, record_game_result, week_games},
    get_user_by_token,
    picks::{submit_picks, user_picks},
    recap::week_recap,
    scoring::{recompute_week, weekly_leaderboard},
    settings::{current_clock, set_current_clock},
    standings::season_standings,
    PoolError,
};

#[cfg(feature = "ssr")]
use diesel::r2d2::{ConnectionManager, Pool};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[cfg(feature = "ssr")]
fn server_error(e: PoolError) -> ServerFnError<NoCustomError> {
    if !e.is_client_error() {
        leptos::logging::error!("Server function failed: {}", e);
    }
    ServerFnError::ServerError(e.public_message())
}

// Runs a store call against the pool provided to server functions.
#[cfg(feature = "ssr")]
async fn with_conn<T, F>(f: F) -> Result<T, ServerFnError<NoCustomError>>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, PoolError> + Send + 'static,
{
    let pool: DbPool = expect_context();
    run_blocking(pool, f).await.map_err(server_error)
}

#[cfg(feature = "ssr")]
async fn request_cookie(name: &str) -> Result<Option<String>, ServerFnError<NoCustomError>> {
    use axum::http::HeaderMap;
    use leptos_axum::extract;

    let headers: HeaderMap = extract()
        .await
        .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?;
    Ok(cookie_value(&headers, name))
}

#[cfg(feature = "ssr")]
fn set_cookie(cookie: &str) -> Result<(), ServerFnError<NoCustomError>> {
    use leptos_axum::ResponseOptions;

    let resp: ResponseOptions = expect_context();
    resp.insert_header(
        axum::http::header::SET_COOKIE,
        axum::http::HeaderValue::from_str(cookie)
            .map_err(|e| ServerFnError::<NoCustomError>::ServerError(e.to_string()))?,
    );
    Ok(())
}

// Returns an empty result if the current request is from an admin, or an error otherwise.
#[cfg(feature = "ssr")]
async fn check_admin() -> Result<(), ServerFnError<NoCustomError>> {
    let token = request_cookie(ADMIN_COOKIE).await?;
    with_conn(move |conn| require_admin(conn, token.as_deref())).await
}

// The user behind the session cookie. A missing or stale session is unauthorized.
#[cfg(feature = "ssr")]
async fn session_user() -> Result<User, ServerFnError<NoCustomError>> {
    let token = request_cookie(SESSION_COOKIE).await?;
    with_conn(move |conn| {
        let token = token.ok_or(PoolError::Unauthorized)?;
        get_user_by_token(conn, &token).map_err(|e| match e {
            PoolError::NotFound(_) => PoolError::Unauthorized,
            other => other,
        })
    })
    .await
}

#[server(GetSeasonClock)]
pub async fn get_season_clock() -> Result<SeasonClock, ServerFnError<NoCustomError>> {
    with_conn(current_clock).await
}

#[server(SetSeasonClock)]
pub async fn set_season_clock(week: i32, season: i32) -> Result<(), ServerFnError<NoCustomError>> {
    check_admin().await?;
    with_conn(move |conn| set_current_clock(conn, SeasonClock { week, season })).await
}

#[server(GetWeeklyLeaderboard)]
pub async fn get_weekly_leaderboard(
    week: Option<i32>,
    season: Option<i32>,
) -> Result<(SeasonClock, Vec<LeaderboardEntry>), ServerFnError<NoCustomError>> {
    with_conn(move |conn| {
        let clock = current_clock(conn)?.with_overrides(week, season);
        let rows = weekly_leaderboard(conn, clock.week, clock.season)?;
        Ok((clock, rows))
    })
    .await
}

#[server(GetSeasonStandings)]
pub async fn get_season_standings(
    season: Option<i32>,
) -> Result<(i32, Vec<SeasonStanding>), ServerFnError<NoCustomError>> {
    with_conn(move |conn| {
        let season = season.unwrap_or(current_clock(conn)?.season);
        Ok((season, season_standings(conn, season)?))
    })
    .await
}

#[server(GetRecap)]
pub async fn get_recap(
    week: i32,
    season: Option<i32>,
) -> Result<RecapOutcome, ServerFnError<NoCustomError>> {
    with_conn(move |conn| {
        let clock = current_clock(conn)?.with_overrides(Some(week), season);
        week_recap(conn, clock.week, clock.season, Utc::now().naive_utc())
    })
    .await
}

#[server(GetWeekGames)]
pub async fn get_week_games(
    week: Option<i32>,
    season: Option<i32>,
) -> Result<(SeasonClock, Vec<Game>), ServerFnError<NoCustomError>> {
    with_conn(move |conn| {
        let clock = current_clock(conn)?.with_overrides(week, season);
        let games = week_games(conn, clock.week, clock.season)?;
        Ok((clock, games))
    })
    .await
}

#[server(name = RunForecast, input = Json)]
pub async fn run_forecast(
    week: i32,
    season: i32,
    scores: HashMap<i32, GameScore>,
) -> Result<Vec<ForecastEntry>, ServerFnError<NoCustomError>> {
    with_conn(move |conn| forecast_week(conn, &scores, week, season)).await
}

#[server(RecalculateWeek)]
pub async fn recalculate_week(
    week: i32,
    season: i32,
) -> Result<RecalculateSummary, ServerFnError<NoCustomError>> {
    check_admin().await?;
    let summary = with_conn(move |conn| recompute_week(conn, week, season)).await?;
    log!(
        "Admin recalculated week {} of {}: {} users",
        week,
        season,
        summary.users_updated
    );
    Ok(summary)
}

#[server(RecordGameResult)]
pub async fn record_result(
    game_id: i32,
    home_score: i32,
    away_score: i32,
) -> Result<Game, ServerFnError<NoCustomError>> {
    check_admin().await?;
    with_conn(move |conn| record_game_result(conn, game_id, home_score, away_score)).await
}

#[server(name = ScheduleGame, input = Json)]
pub async fn schedule_game(game: ScheduledGame) -> Result<Game, ServerFnError<NoCustomError>> {
    check_admin().await?;
    with_conn(move |conn| create_game(conn, &game)).await
}

/// Adds a user and returns their first session token.
#[server(AddUser)]
pub async fn add_user(
    username: String,
    alias: Option<String>,
    is_admin: bool,
) -> Result<String, ServerFnError<NoCustomError>> {
    check_admin().await?;
    with_conn(move |conn| {
        let user = create_user(conn, &username, alias.as_deref(), is_admin)?;
        create_user_session(conn, user.id)
    })
    .await
}

#[server(GetCurrentUser)]
pub async fn get_current_user() -> Result<Option<User>, ServerFnError<NoCustomError>> {
    let token = request_cookie(SESSION_COOKIE).await?;
    with_conn(move |conn| match token {
        Some(token) => match get_user_by_token(conn, &token) {
            Ok(user) => Ok(Some(user)),
            Err(PoolError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
        None => Ok(None),
    })
    .await
}

#[server(Login)]
pub async fn login(token: String) -> Result<(), ServerFnError<NoCustomError>> {
    let token = token.trim().to_string();
    let lookup = token.clone();
    with_conn(move |conn| get_user_by_token(conn, &lookup)).await?;

    set_cookie(&format!(
        "{}={}; Max-Age=31536000; Path=/; HttpOnly; SameSite=Strict",
        SESSION_COOKIE, token
    ))
}

#[server(GetMyPicks)]
pub async fn get_my_picks(
    week: i32,
    season: i32,
) -> Result<Vec<Pick>, ServerFnError<NoCustomError>> {
    let user = session_user().await?;
    with_conn(move |conn| user_picks(conn, user.id, week, season)).await
}

#[server(name = SubmitPicks, input = Json)]
pub async fn submit_my_picks(
    week: i32,
    season: i32,
    picks: Vec<PickSubmission>,
) -> Result<Vec<Pick>, ServerFnError<NoCustomError>> {
    let user = session_user().await?;
    with_conn(move |conn| {
        submit_picks(conn, user.id, week, season, &picks, Utc::now().naive_utc())
    })
    .await
}

// Checks if the current request is from an admin. Returns true if it is, false otherwise.
#[server(IsAdmin)]
pub async fn is_admin() -> Result<bool, ServerFnError<NoCustomError>> {
    match check_admin().await {
        Ok(()) => Ok(true),
        Err(ServerFnError::ServerError(msg)) if msg == PoolError::Unauthorized.public_message() => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

#[server(AdminLogin)]
pub async fn admin_login(password: String) -> Result<(), ServerFnError<NoCustomError>> {
    let admin_password = env::var("ADMIN_PASSWORD").map_err(|_| {
        ServerFnError::<NoCustomError>::ServerError("Admin password not set".to_string())
    })?;

    if password != admin_password {
        leptos::logging::warn!("Rejected admin login");
        return Err(ServerFnError::ServerError("Invalid password".to_string()));
    }

    let token = with_conn(create_admin_session).await?;
    set_cookie(&format!(
        "{}={}; Max-Age=86400; Path=/; HttpOnly; SameSite=Strict",
        ADMIN_COOKIE, token
    ))
}

#[server(AdminLogout)]
pub async fn admin_logout() -> Result<(), ServerFnError<NoCustomError>> {
    if let Some(token) = request_cookie(ADMIN_COOKIE).await? {
        with_conn(move |conn| delete_admin_session(conn, &token)).await?;
    }
    set_cookie(&format!(
        "{}=; Max-Age=0; Path=/; HttpOnly; SameSite=Strict",
        ADMIN_COOKIE
    ))
}

/// Formats the time left until a recap opens, e.g. `1d 02:03:04`.
pub fn format_countdown(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let clock = format!(
        "{:02}:{:02}:{:02}",
        (seconds % 86_400) / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    );
    if days > 0 {
        format!("{}d {}", days, clock)
    } else {
        clock
    }
}

/// Turns the tracker's score boxes into hypothetical scores. Games with either box blank or
/// unparseable are left undecided.
pub fn hypothetical_from_inputs(inputs: &BTreeMap<i32, (String, String)>) -> HashMap<i32, GameScore> {
    inputs
        .iter()
        .filter_map(|(game_id, (home, away))| {
            let home_score = home.trim().parse().ok()?;
            let away_score = away.trim().parse().ok()?;
            Some((
                *game_id,
                GameScore {
                    home_score,
                    away_score,
                },
            ))
        })
        .collect()
}

/// Parses a `datetime-local` input value. Kickoffs are entered and stored in UTC.
pub fn parse_kickoff(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn matchup(game: &Game) -> String {
    match game.final_score() {
        Some(score) => format!(
            "{} {} @ {} {}",
            game.away_team, score.away_score, game.home_team, score.home_score
        ),
        None => format!("{} @ {}", game.away_team, game.home_team),
    }
}

pub fn shell(options: LeptosOptions) -> impl IntoView {
    view! {
        <!DOCTYPE html>
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <AutoReload options=options.clone() />
                <HydrationScripts options />
                <MetaTags />
            </head>
            <body>
                <App />
            </body>
        </html>
    }
}

#[component]
pub fn App() -> impl IntoView {
    // Provides context that manages stylesheets, titles, meta tags, etc.
    provide_meta_context();

    view! {
        // id=leptos means cargo-leptos will hot-reload this stylesheet
        <Stylesheet id="leptos" href="/pkg/pickem-pool.css" />
        <Title text="Pick'em Pool" />

        <Router>
            <nav class="nav">
                <A href="/">"Week"</A>
                <A href="/season">"Season"</A>
                <A href="/tracker">"Tracker"</A>
                <A href="/picks">"My Picks"</A>
            </nav>
            <main>
                <Routes fallback=|| "Page not found.".into_view()>
                    <Route path=path!("/") view=WeeklyLeaderboard />
                    <Route path=path!("/season") view=SeasonStandings />
                    <Route path=path!("/recap/:week") view=RecapPage />
                    <Route path=path!("/tracker") view=Tracker />
                    <Route path=path!("/picks") view=MyPicks />
                    <Route path=path!("/login") view=Login />
                    <Route path=path!("/admin/login") view=AdminLogin />
                    <Route path=path!("/admin") view=AdminDashboard />
                </Routes>
            </main>
        </Router>
    }
}

#[component]
fn WeeklyLeaderboard() -> impl IntoView {
    // None shows the week on the season clock.
    let week = RwSignal::new(None::<i32>);
    let board = Resource::new(move || week.get(), |week| get_weekly_leaderboard(week, None));

    view! {
        <div>
            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    board
                        .with(|result| match result {
                            Some(Ok((clock, rows))) => {
                                let shown = clock.week;
                                view! {
                                    <header class="week-header">
                                        <button
                                            disabled=shown <= 1
                                            on:click=move |_| week.set(Some(shown - 1))
                                        >
                                            "Previous"
                                        </button>
                                        <h1>{format!("Week {} ({})", clock.week, clock.season)}</h1>
                                        <button on:click=move |_| {
                                            week.set(Some(shown + 1))
                                        }>"Next"</button>
                                    </header>
                                    <p>
                                        <a href=format!("/recap/{}", clock.week)>"Pick recap"</a>
                                    </p>
                                    <LeaderboardTable rows=rows.clone() />
                                }
                                    .into_any()
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{e.to_string()}</p> }.into_any()
                            }
                            None => view! { "Loading..." }.into_any(),
                        })
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn LeaderboardTable(rows: Vec<LeaderboardEntry>) -> impl IntoView {
    if rows.is_empty() {
        return view! { <p>"No scores for this week yet."</p> }.into_any();
    }
    view! {
        <table class="standings-table">
            <tbody>
                <tr>
                    <th>"Rank"</th>
                    <th>"Name"</th>
                    <th>"Correct"</th>
                    <th>"Points"</th>
                    <th>"Win %"</th>
                </tr>
                {rows
                    .into_iter()
                    .map(|row| {
                        view! {
                            <tr>
                                <td>{row.weekly_rank.map(|r| r.to_string()).unwrap_or_default()}</td>
                                <td>{row.display_name}</td>
                                <td>{format!("{}/{}", row.correct_picks, row.total_picks)}</td>
                                <td>{format!("{}/{}", row.total_points, row.possible_points)}</td>
                                <td>{format!("{:.2}", row.win_percentage)}</td>
                            </tr>
                        }
                    })
                    .collect_view()}
            </tbody>
        </table>
    }
        .into_any()
}

#[component]
fn SeasonStandings() -> impl IntoView {
    let season = RwSignal::new(None::<i32>);
    let standings = Resource::new(move || season.get(), get_season_standings);

    view! {
        <div>
            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    standings
                        .with(|result| match result {
                            Some(Ok((shown, rows))) => {
                                let shown = *shown;
                                view! {
                                    <header class="week-header">
                                        <button on:click=move |_| {
                                            season.set(Some(shown - 1))
                                        }>"Previous"</button>
                                        <h1>{format!("{} Season", shown)}</h1>
                                        <button on:click=move |_| {
                                            season.set(Some(shown + 1))
                                        }>"Next"</button>
                                    </header>
                                    <table class="standings-table">
                                        <tbody>
                                            <tr>
                                                <th>"Rank"</th>
                                                <th>"Name"</th>
                                                <th>"Weeks"</th>
                                                <th>"Correct"</th>
                                                <th>"Points"</th>
                                                <th>"Win %"</th>
                                            </tr>
                                            {rows
                                                .iter()
                                                .map(|row| {
                                                    view! {
                                                        <tr>
                                                            <td>{row.season_rank}</td>
                                                            <td>{row.display_name.clone()}</td>
                                                            <td>{row.weeks_played}</td>
                                                            <td>
                                                                {format!("{}/{}", row.total_correct, row.total_games)}
                                                            </td>
                                                            <td>
                                                                {format!("{}/{}", row.total_points, row.total_possible)}
                                                            </td>
                                                            <td>{format!("{:.2}", row.season_win_percentage)}</td>
                                                        </tr>
                                                    }
                                                })
                                                .collect_view()}
                                        </tbody>
                                    </table>
                                }
                                    .into_any()
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{e.to_string()}</p> }.into_any()
                            }
                            None => view! { "Loading..." }.into_any(),
                        })
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn RecapPage() -> impl IntoView {
    let params = use_params_map();
    let week = move || {
        params
            .read()
            .get("week")
            .and_then(|w| w.parse::<i32>().ok())
            .unwrap_or(1)
    };
    let recap = Resource::new(week, |week| get_recap(week, None));

    // Ticks once a second in the browser while the recap is gated, and reloads it once the
    // first game kicks off.
    let now = RwSignal::new(Utc::now().naive_utc());
    #[cfg(feature = "hydrate")]
    Effect::new(move || {
        spawn_local(async move {
            loop {
                gloo_timers::future::TimeoutFuture::new(1_000).await;
                let tick = Utc::now().naive_utc();
                if now.try_set(tick).is_some() {
                    break;
                }
                let opened = recap.with_untracked(|r| match r {
                    Some(Ok(RecapOutcome::Gated { unlocks_at })) => *unlocks_at <= tick,
                    _ => false,
                });
                if opened {
                    recap.refetch();
                }
            }
        });
    });

    view! {
        <div>
            <h1>{move || format!("Week {} Recap", week())}</h1>
            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    recap
                        .with(|result| match result {
                            Some(Ok(RecapOutcome::Gated { unlocks_at })) => {
                                let unlocks_at = *unlocks_at;
                                view! {
                                    <p class="gated">
                                        "Picks are revealed at the first kickoff: "
                                        {unlocks_at.format("%a %b %-d %H:%M UTC").to_string()}
                                    </p>
                                    <p class="countdown">
                                        {move || format_countdown(
                                            (unlocks_at - now.get()).num_seconds(),
                                        )}
                                    </p>
                                }
                                    .into_any()
                            }
                            Some(Ok(RecapOutcome::Available(recap))) => {
                                let games = recap.games.clone();
                                let header_games = games.clone();
                                view! {
                                    <div class="table-responsive">
                                        <table class="recap-table">
                                            <tbody>
                                                <tr>
                                                    <th>"Name"</th>
                                                    {header_games
                                                        .iter()
                                                        .map(|game| {
                                                            let split = recap.pick_percentages.get(&game.id).copied();
                                                            let upset = split.is_some_and(|s| s.is_upset);
                                                            view! {
                                                                <th class:upset=upset>
                                                                    <div>{matchup(game)}</div>
                                                                    <div class="split">
                                                                        {split
                                                                            .map(|s| {
                                                                                format!(
                                                                                    "{:.0}% / {:.0}%",
                                                                                    s.away_percentage,
                                                                                    s.home_percentage,
                                                                                )
                                                                            })
                                                                            .unwrap_or_default()}
                                                                    </div>
                                                                </th>
                                                            }
                                                        })
                                                        .collect_view()}
                                                    <th>"Tiebreaker"</th>
                                                </tr>
                                                {recap
                                                    .per_user_picks
                                                    .iter()
                                                    .map(|row| {
                                                        view! {
                                                            <tr>
                                                                <td>{row.display_name.clone()}</td>
                                                                {games
                                                                    .iter()
                                                                    .map(|game| {
                                                                        let team = row.picks.get(&game.id).cloned().flatten();
                                                                        view! { <td>{team.unwrap_or_else(|| "-".to_string())}</td> }
                                                                    })
                                                                    .collect_view()}
                                                                <td>
                                                                    {row
                                                                        .tiebreaker_points
                                                                        .map(|p| p.to_string())
                                                                        .unwrap_or_default()}
                                                                </td>
                                                            </tr>
                                                        }
                                                    })
                                                    .collect_view()}
                                            </tbody>
                                        </table>
                                    </div>
                                }
                                    .into_any()
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{e.to_string()}</p> }.into_any()
                            }
                            None => view! { "Loading..." }.into_any(),
                        })
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn Tracker() -> impl IntoView {
    let games = Resource::new(|| (), |_| get_week_games(None, None));
    // Score boxes per game: (home, away) as typed.
    let inputs = RwSignal::new(BTreeMap::<i32, (String, String)>::new());
    let results = RwSignal::new(Vec::<ForecastEntry>::new());
    let error = RwSignal::new(String::new());

    let run = move |clock: SeasonClock| {
        let scores = hypothetical_from_inputs(&inputs.get_untracked());
        spawn_local(async move {
            match run_forecast(clock.week, clock.season, scores).await {
                Ok(entries) => {
                    error.set(String::new());
                    results.set(entries);
                }
                Err(e) => error.set(e.to_string()),
            }
        });
    };

    view! {
        <div>
            <h1>"Live Tracker"</h1>
            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    games
                        .with(|result| match result {
                            Some(Ok((clock, week_games))) => {
                                let clock = *clock;
                                view! {
                                    <p>{format!("Week {} ({})", clock.week, clock.season)}</p>
                                    <table class="tracker-table">
                                        <tbody>
                                            {week_games
                                                .iter()
                                                .map(|game| {
                                                    let id = game.id;
                                                    view! {
                                                        <tr>
                                                            <td>{game.away_team.clone()}</td>
                                                            <td>
                                                                <input
                                                                    type="number"
                                                                    min="0"
                                                                    on:input=move |ev| {
                                                                        let value = event_target_value(&ev);
                                                                        inputs.update(|m| m.entry(id).or_default().1 = value);
                                                                    }
                                                                />
                                                            </td>
                                                            <td>"@"</td>
                                                            <td>{game.home_team.clone()}</td>
                                                            <td>
                                                                <input
                                                                    type="number"
                                                                    min="0"
                                                                    on:input=move |ev| {
                                                                        let value = event_target_value(&ev);
                                                                        inputs.update(|m| m.entry(id).or_default().0 = value);
                                                                    }
                                                                />
                                                            </td>
                                                        </tr>
                                                    }
                                                })
                                                .collect_view()}
                                        </tbody>
                                    </table>
                                    <button class="btn-primary" on:click=move |_| run(clock)>
                                        "Run forecast"
                                    </button>
                                }
                                    .into_any()
                            }
                            Some(Err(e)) => {
                                view! { <p class="error">{e.to_string()}</p> }.into_any()
                            }
                            None => view! { "Loading..." }.into_any(),
                        })
                }}
            </Suspense>
            {move || (!error.get().is_empty()).then(|| view! { <p class="error">{error.get()}</p> })}
            <table class="standings-table">
                <tbody>
                    <tr>
                        <th>"Rank"</th>
                        <th>"Name"</th>
                        <th>"Record"</th>
                        <th>"Points"</th>
                        <th>"Season"</th>
                    </tr>
                    <For
                        each=move || results.get()
                        key=|entry| entry.user_id
                        children=move |entry| {
                            let movement = match entry.yearly_rank_change {
                                0 => "-".to_string(),
                                change if change < 0 => format!("up {}", -change),
                                change => format!("down {}", change),
                            };
                            view! {
                                <tr>
                                    <td>{entry.weekly_rank}</td>
                                    <td>{entry.display_name.clone()}</td>
                                    <td>{entry.weekly_record.clone()}</td>
                                    <td>{entry.projected_points}</td>
                                    <td>
                                        {entry.yearly_rank.map(|r| r.to_string()).unwrap_or_default()}
                                        " (" {movement} ")"
                                    </td>
                                </tr>
                            }
                        }
                    />
                </tbody>
            </table>
        </div>
    }
}

#[component]
fn MyPicks() -> impl IntoView {
    let user = Resource::new(|| (), |_| get_current_user());
    let games = Resource::new(|| (), |_| get_week_games(None, None));
    // Per game: (selected team, confidence as typed).
    let choices = RwSignal::new(BTreeMap::<i32, (String, String)>::new());
    let tiebreaker = RwSignal::new(String::new());
    let message = RwSignal::new(String::new());

    // Load the saved picks once the week is known.
    Effect::new(move || {
        if let Some(Ok((clock, _))) = games.get() {
            spawn_local(async move {
                if let Ok(saved) = get_my_picks(clock.week, clock.season).await {
                    choices.set(
                        saved
                            .iter()
                            .map(|p| (p.game_id, (p.selected_team.clone(), p.confidence.to_string())))
                            .collect(),
                    );
                    if let Some(points) = saved.iter().find_map(|p| p.tiebreaker_points) {
                        tiebreaker.set(points.to_string());
                    }
                }
            });
        }
    });

    let submit = move |clock: SeasonClock, last_game: Option<i32>| {
        let picks: Vec<PickSubmission> = choices
            .get_untracked()
            .into_iter()
            .filter(|(_, (team, _))| !team.is_empty())
            .map(|(game_id, (team, confidence))| PickSubmission {
                game_id,
                selected_team: team,
                confidence: confidence.trim().parse().unwrap_or(1),
                tiebreaker_points: if Some(game_id) == last_game {
                    tiebreaker.get_untracked().trim().parse().ok()
                } else {
                    None
                },
            })
            .collect();
        spawn_local(async move {
            match submit_my_picks(clock.week, clock.season, picks).await {
                Ok(saved) => message.set(format!("Saved {} picks.", saved.len())),
                Err(e) => message.set(e.to_string()),
            }
        });
    };

    view! {
        <div>
            <h1>"My Picks"</h1>
            <Suspense fallback=|| {
                view! { "Loading..." }
            }>
                {move || {
                    match (user.get(), games.get()) {
                        (Some(Ok(None)), _) => {
                            view! {
                                <p>
                                    <a href="/login">"Log in"</a>
                                    " to make picks."
                                </p>
                            }
                                .into_any()
                        }
                        (Some(Ok(Some(user))), Some(Ok((clock, week_games)))) => {
                            let now = Utc::now().naive_utc();
                            let last_game = tiebreaker_game(&week_games).map(|g| g.id);
                            view! {
                                <p>
                                    {format!(
                                        "{}, week {} ({})",
                                        user.display_name(),
                                        clock.week,
                                        clock.season,
                                    )}
                                </p>
                                <table class="picks-table">
                                    <tbody>
                                        {week_games
                                            .iter()
                                            .map(|game| {
                                                let id = game.id;
                                                let locked = game.kickoff_at <= now;
                                                let teams = [game.away_team.clone(), game.home_team.clone()];
                                                view! {
                                                    <tr class:locked=locked>
                                                        {teams
                                                            .into_iter()
                                                            .map(|team| {
                                                                let chosen = team.clone();
                                                                let label = team.clone();
                                                                view! {
                                                                    <td>
                                                                        <label>
                                                                            <input
                                                                                type="radio"
                                                                                name=format!("game-{}", id)
                                                                                disabled=locked
                                                                                prop:checked=move || {
                                                                                    choices
                                                                                        .with(|c| c.get(&id).is_some_and(|(t, _)| *t == team))
                                                                                }
                                                                                on:change=move |_| {
                                                                                    let team = chosen.clone();
                                                                                    choices.update(|c| c.entry(id).or_default().0 = team);
                                                                                }
                                                                            />
                                                                            {label}
                                                                        </label>
                                                                    </td>
                                                                }
                                                            })
                                                            .collect_view()}
                                                        <td>
                                                            <input
                                                                type="number"
                                                                min="1"
                                                                placeholder="1"
                                                                disabled=locked
                                                                prop:value=move || {
                                                                    choices.with(|c| c.get(&id).map(|(_, conf)| conf.clone()).unwrap_or_default())
                                                                }
                                                                on:input=move |ev| {
                                                                    let value = event_target_value(&ev);
                                                                    choices.update(|c| c.entry(id).or_default().1 = value);
                                                                }
                                                            />
                                                        </td>
                                                    </tr>
                                                }
                                            })
                                            .collect_view()}
                                    </tbody>
                                </table>
                                <label>
                                    "Tiebreaker (total points in the last game): "
                                    <input
                                        type="number"
                                        min="0"
                                        prop:value=move || tiebreaker.get()
                                        on:input=move |ev| tiebreaker.set(event_target_value(&ev))
                                    />
                                </label>
                                <button
                                    class="btn-primary"
                                    on:click=move |_| submit(clock, last_game)
                                >
                                    "Save picks"
                                </button>
                                <p>{move || message.get()}</p>
                            }
                                .into_any()
                        }
                        (Some(Err(e)), _) | (_, Some(Err(e))) => {
                            view! { <p class="error">{e.to_string()}</p> }.into_any()
                        }
                        _ => view! { "Loading..." }.into_any(),
                    }
                }}
            </Suspense>
        </div>
    }
}

#[component]
fn Login() -> impl IntoView {
    let token = RwSignal::new(String::new());
    let error = RwSignal::new(String::new());

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let t = token.get();
        if t.trim().is_empty() {
            error.set("Please enter your token.".to_string());
            return;
        }
        spawn_local(async move {
            match login(t).await {
                Ok(_) => {
                    error.set(String::new());
                    let navigate = use_navigate();
                    navigate("/picks", NavigateOptions::default());
                }
                Err(e) => error.set(e.to_string()),
            }
        });
    };

    view! {
        <div>
            <h1>"Login"</h1>
            <form on:submit=submit>
                <label>
                    "Token: "
                    <input type="text" on:input=move |ev| token.set(event_target_value(&ev)) />
                </label>
                <button type="submit">"Login"</button>
            </form>
            {move || (!error.get().is_empty()).then(|| view! { <p>{error.get()}</p> })}
        </div>
    }
}

#[component]
fn AdminLogin() -> impl IntoView {
    let password = RwSignal::new(String::new());
    let error = RwSignal::new(String::new());

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let p = password.get();
        if p.is_empty() {
            error.set("Please enter password.".to_string());
            return;
        }
        spawn_local(async move {
            match admin_login(p).await {
                Ok(_) => {
                    error.set(String::new());
                    let navigate = use_navigate();
                    navigate("/admin", NavigateOptions::default());
                }
                Err(e) => error.set(e.to_string()),
            }
        });
    };

    view! {
        <div>
            <h1>"Admin Login"</h1>
            <form on:submit=submit>
                <label>
                    "Password: "
                    <input
                        type="password"
                        on:input=move |ev| password.set(event_target_value(&ev))
                    />
                </label>
                <button type="submit">"Login"</button>
            </form>
            {move || (!error.get().is_empty()).then(|| view! { <p>{error.get()}</p> })}
        </div>
    }
}

#[component]
fn AdminDashboard() -> impl IntoView {
    let is_admin_fetcher = Resource::new(|| (), |_| is_admin());
    // The week being administered. None follows the season clock.
    let admin_week = RwSignal::new(None::<i32>);
    let games_fetcher = Resource::new(move || admin_week.get(), |week| get_week_games(week, None));

    let navigate = use_navigate();
    Effect::new(move || {
        is_admin_fetcher.with(|maybe_result| {
            if let Some(Ok(false)) = maybe_result {
                navigate("/admin/login", NavigateOptions::default());
            }
        });
    });

    // Season clock.
    let clock_week = RwSignal::new(String::new());
    let clock_season = RwSignal::new(String::new());
    let clock_message = RwSignal::new(String::new());
    let clock_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let (Ok(week), Ok(season)) = (
            clock_week.get().trim().parse::<i32>(),
            clock_season.get().trim().parse::<i32>(),
        ) else {
            clock_message.set("Week and season must be numbers.".to_string());
            return;
        };
        spawn_local(async move {
            match set_season_clock(week, season).await {
                Ok(_) => {
                    clock_message.set(format!("Now on week {} of {}.", week, season));
                    admin_week.set(None);
                    games_fetcher.refetch();
                }
                Err(e) => clock_message.set(e.to_string()),
            }
        });
    };

    // Results and recalculation.
    let result_scores = RwSignal::new(BTreeMap::<i32, (String, String)>::new());
    let result_message = RwSignal::new(String::new());
    let save_result = move |game_id: i32| {
        let Some((home, away)) = result_scores.with_untracked(|m| m.get(&game_id).cloned()) else {
            result_message.set("Enter both scores first.".to_string());
            return;
        };
        let (Ok(home_score), Ok(away_score)) = (home.trim().parse(), away.trim().parse()) else {
            result_message.set("Scores must be numbers.".to_string());
            return;
        };
        spawn_local(async move {
            match record_result(game_id, home_score, away_score).await {
                Ok(game) => {
                    result_message.set(format!("Saved {}.", matchup(&game)));
                    games_fetcher.refetch();
                }
                Err(e) => result_message.set(e.to_string()),
            }
        });
    };
    let recalculate = move |clock: SeasonClock| {
        spawn_local(async move {
            match recalculate_week(clock.week, clock.season).await {
                Ok(summary) => result_message.set(format!(
                    "Week {} recalculated for {} users.",
                    summary.week, summary.users_updated
                )),
                Err(e) => result_message.set(e.to_string()),
            }
        });
    };

    // Scheduling.
    let new_home = RwSignal::new(String::new());
    let new_away = RwSignal::new(String::new());
    let new_kickoff = RwSignal::new(String::new());
    let new_spread = RwSignal::new(String::new());
    let schedule_message = RwSignal::new(String::new());
    let schedule_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let Some(Ok((clock, _))) = games_fetcher.get_untracked() else {
            return;
        };
        let Some(kickoff_at) = parse_kickoff(&new_kickoff.get()) else {
            schedule_message.set("Kickoff must be a date and time.".to_string());
            return;
        };
        let game = ScheduledGame {
            season: clock.season,
            week: clock.week,
            kickoff_at,
            home_team: new_home.get(),
            away_team: new_away.get(),
            spread: new_spread.get().trim().parse().unwrap_or(0.0),
        };
        spawn_local(async move {
            match schedule_game(game).await {
                Ok(game) => {
                    schedule_message.set(format!("Scheduled {}.", matchup(&game)));
                    new_home.set(String::new());
                    new_away.set(String::new());
                    games_fetcher.refetch();
                }
                Err(e) => schedule_message.set(e.to_string()),
            }
        });
    };

    // Users.
    let new_username = RwSignal::new(String::new());
    let new_alias = RwSignal::new(String::new());
    let new_is_admin = RwSignal::new(false);
    let user_message = RwSignal::new(String::new());
    let user_submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        let username = new_username.get();
        let alias = Some(new_alias.get()).filter(|a| !a.trim().is_empty());
        let is_admin = new_is_admin.get();
        spawn_local(async move {
            match add_user(username.clone(), alias, is_admin).await {
                Ok(token) => {
                    user_message.set(format!("Added {}. Login token: {}", username, token));
                    new_username.set(String::new());
                    new_alias.set(String::new());
                    new_is_admin.set(false);
                }
                Err(e) => user_message.set(e.to_string()),
            }
        });
    };

    let logout = move |_| {
        spawn_local(async move {
            let _ = admin_logout().await;
            let navigate = use_navigate();
            navigate("/", NavigateOptions::default());
        });
    };

    view! {
        <Suspense fallback=|| {
            "Loading..."
        }>
            {move || {
                if let Some(Ok(true)) = is_admin_fetcher.get() {
                    view! {
                        <div class="admin-container">
                            <header class="admin-header">
                                <h1>"Admin Dashboard"</h1>
                                <button class="btn-logout" on:click=logout>
                                    "Logout"
                                </button>
                            </header>

                            <section class="admin-section">
                                <h2>"Season Clock"</h2>
                                <form class="admin-form" on:submit=clock_submit>
                                    <label>
                                        "Week: "
                                        <input
                                            class="form-input"
                                            type="number"
                                            min="1"
                                            prop:value=move || clock_week.get()
                                            on:input=move |ev| clock_week.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        "Season: "
                                        <input
                                            class="form-input"
                                            type="number"
                                            prop:value=move || clock_season.get()
                                            on:input=move |ev| clock_season.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <button type="submit" class="btn-primary">
                                        "Set"
                                    </button>
                                </form>
                                <p>{move || clock_message.get()}</p>
                            </section>

                            <section class="admin-section">
                                <Suspense fallback=|| {
                                    view! { "Loading..." }
                                }>
                                    {move || {
                                        games_fetcher
                                            .with(|maybe_result| match maybe_result {
                                                Some(Ok((clock, week_games))) => {
                                                    let clock = *clock;
                                                    view! {
                                                        <header class="week-header">
                                                            <button
                                                                disabled=clock.week <= 1
                                                                on:click=move |_| admin_week.set(Some(clock.week - 1))
                                                            >
                                                                "Previous"
                                                            </button>
                                                            <h2>
                                                                {format!("Week {} ({})", clock.week, clock.season)}
                                                            </h2>
                                                            <button on:click=move |_| {
                                                                admin_week.set(Some(clock.week + 1))
                                                            }>"Next"</button>
                                                        </header>
                                                        <table class="admin-table">
                                                            <tbody>
                                                                <tr>
                                                                    <th>"Game"</th>
                                                                    <th>"Kickoff"</th>
                                                                    <th>"Status"</th>
                                                                    <th>"Away"</th>
                                                                    <th>"Home"</th>
                                                                    <th></th>
                                                                </tr>
                                                                {week_games
                                                                    .iter()
                                                                    .map(|game| {
                                                                        let id = game.id;
                                                                        view! {
                                                                            <tr>
                                                                                <td>{matchup(game)}</td>
                                                                                <td>{game.kickoff_at.format("%a %H:%M").to_string()}</td>
                                                                                <td>{game.state().to_string()}</td>
                                                                                <td>
                                                                                    <input
                                                                                        class="score-input"
                                                                                        type="number"
                                                                                        min="0"
                                                                                        on:input=move |ev| {
                                                                                            let value = event_target_value(&ev);
                                                                                            result_scores.update(|m| m.entry(id).or_default().1 = value);
                                                                                        }
                                                                                    />
                                                                                </td>
                                                                                <td>
                                                                                    <input
                                                                                        class="score-input"
                                                                                        type="number"
                                                                                        min="0"
                                                                                        on:input=move |ev| {
                                                                                            let value = event_target_value(&ev);
                                                                                            result_scores.update(|m| m.entry(id).or_default().0 = value);
                                                                                        }
                                                                                    />
                                                                                </td>
                                                                                <td>
                                                                                    <button class="btn-secondary" on:click=move |_| save_result(id)>
                                                                                        "Final"
                                                                                    </button>
                                                                                </td>
                                                                            </tr>
                                                                        }
                                                                    })
                                                                    .collect_view()}
                                                            </tbody>
                                                        </table>
                                                        <button class="btn-primary" on:click=move |_| recalculate(clock)>
                                                            "Recalculate scores"
                                                        </button>
                                                    }
                                                        .into_any()
                                                }
                                                Some(Err(e)) => {
                                                    view! { <p class="error">{e.to_string()}</p> }.into_any()
                                                }
                                                None => view! { "Loading..." }.into_any(),
                                            })
                                    }}
                                </Suspense>
                                <p>{move || result_message.get()}</p>
                            </section>

                            <section class="admin-section">
                                <h2>"Schedule Game"</h2>
                                <form class="admin-form" on:submit=schedule_submit>
                                    <label>
                                        "Away: "
                                        <input
                                            class="form-input"
                                            type="text"
                                            prop:value=move || new_away.get()
                                            on:input=move |ev| new_away.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        "Home: "
                                        <input
                                            class="form-input"
                                            type="text"
                                            prop:value=move || new_home.get()
                                            on:input=move |ev| new_home.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        "Kickoff (UTC): "
                                        <input
                                            class="form-input"
                                            type="datetime-local"
                                            on:input=move |ev| new_kickoff.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        "Home spread: "
                                        <input
                                            class="form-input"
                                            type="number"
                                            step="0.5"
                                            on:input=move |ev| new_spread.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <button type="submit" class="btn-primary">
                                        "Add game"
                                    </button>
                                </form>
                                <p>{move || schedule_message.get()}</p>
                            </section>

                            <section class="admin-section">
                                <h2>"Add Player"</h2>
                                <form class="admin-form" on:submit=user_submit>
                                    <label>
                                        "Username: "
                                        <input
                                            class="form-input"
                                            type="text"
                                            prop:value=move || new_username.get()
                                            on:input=move |ev| new_username.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        "Display name: "
                                        <input
                                            class="form-input"
                                            type="text"
                                            prop:value=move || new_alias.get()
                                            on:input=move |ev| new_alias.set(event_target_value(&ev))
                                        />
                                    </label>
                                    <label>
                                        <input
                                            type="checkbox"
                                            prop:checked=move || new_is_admin.get()
                                            on:change=move |ev| new_is_admin.set(event_target_checked(&ev))
                                        />
                                        " Admin"
                                    </label>
                                    <button type="submit" class="btn-primary">
                                        "Add"
                                    </button>
                                </form>
                                <p class="token-display">{move || user_message.get()}</p>
                            </section>
                        </div>
                    }
                        .into_any()
                } else {
                    view! { "Loading..." }.into_any()
                }
            }}
        </Suspense>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "00:00:00");
        assert_eq!(format_countdown(-30), "00:00:00");
        assert_eq!(format_countdown(3_725), "01:02:05");
        assert_eq!(format_countdown(86_400 + 7_384), "1d 02:03:04");
    }

    #[test]
    fn test_hypothetical_from_inputs() {
        let mut inputs = BTreeMap::new();
        inputs.insert(1, ("24".to_string(), " 17 ".to_string()));
        inputs.insert(2, ("10".to_string(), String::new()));
        inputs.insert(3, ("abc".to_string(), "3".to_string()));

        let scores = hypothetical_from_inputs(&inputs);
        assert_eq!(scores.len(), 1);
        assert_eq!(
            scores.get(&1),
            Some(&GameScore {
                home_score: 24,
                away_score: 17
            })
        );
    }

    #[test]
    fn test_parse_kickoff() {
        let expected = NaiveDate::from_ymd_opt(2024, 9, 8)
            .unwrap()
            .and_hms_opt(17, 25, 0)
            .unwrap();
        assert_eq!(parse_kickoff("2024-09-08T17:25"), Some(expected));
        assert_eq!(parse_kickoff("2024-09-08T17:25:00"), Some(expected));
        assert_eq!(parse_kickoff("Sunday"), None);
    }
}
