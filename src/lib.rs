pub mod app;
pub mod error;
pub mod forecast;
pub mod games;
pub mod model;
pub mod picks;
pub mod ranking;
pub mod recap;
pub mod scoring;
pub mod settings;
pub mod standings;

#[cfg(feature = "ssr")]
pub mod api;
#[cfg(feature = "ssr")]
pub mod schema;
#[cfg(all(test, feature = "ssr"))]
mod test_support;

pub use error::{validate_season, validate_week, PoolError};

#[cfg(feature = "ssr")]
use diesel::connection::SimpleConnection;
#[cfg(feature = "ssr")]
use diesel::prelude::*;
#[cfg(feature = "ssr")]
use diesel::result::{ConnectionError, ConnectionResult, DatabaseErrorKind};
#[cfg(feature = "ssr")]
use diesel::SqliteConnection;
#[cfg(feature = "ssr")]
use dotenvy::dotenv;
#[cfg(feature = "ssr")]
use leptos::logging::log;
#[cfg(feature = "ssr")]
use std::env;
#[cfg(feature = "ssr")]
use uuid::Uuid;

#[cfg(feature = "ssr")]
use crate::model::{NewAdminSession, NewSession, NewUser, User};
#[cfg(feature = "ssr")]
use crate::schema::{
    admin_sessions, games as games_table, picks as picks_table, sessions, users, weekly_scores,
};

#[cfg(feature = "hydrate")]
#[wasm_bindgen::prelude::wasm_bindgen]
pub fn hydrate() {
    use crate::app::*;
    console_error_panic_hook::set_once();
    leptos::mount::hydrate_body(App);
}

/// Schema for a fresh database. Every statement is idempotent.
#[cfg(feature = "ssr")]
pub const MIGRATION_SQL: &str = include_str!("../migrations/2025-08-20-000000_create_pool/up.sql");

// WAL allows reads while a recompute holds the write lock, and the busy timeout makes a second
// writer wait for the first instead of failing.
#[cfg(feature = "ssr")]
const PRAGMAS: &str = "PRAGMA foreign_keys = ON; \
    PRAGMA journal_mode = WAL; \
    PRAGMA synchronous = NORMAL; \
    PRAGMA busy_timeout = 10000;";

#[cfg(feature = "ssr")]
pub fn apply_pragmas(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(PRAGMAS)
}

#[cfg(feature = "ssr")]
pub fn run_migrations(conn: &mut SqliteConnection) -> QueryResult<()> {
    conn.batch_execute(MIGRATION_SQL)
}

/// Applies the PRAGMAs to every connection the pool hands out.
#[cfg(feature = "ssr")]
#[derive(Debug, Clone, Copy)]
pub struct SqlitePragmas;

#[cfg(feature = "ssr")]
impl diesel::r2d2::CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        apply_pragmas(conn).map_err(diesel::r2d2::Error::QueryError)
    }
}

#[cfg(feature = "ssr")]
pub fn database_url() -> Option<String> {
    dotenv().ok();
    env::var("DATABASE_URL").ok()
}

/// Opens a single connection to `DATABASE_URL` with the PRAGMAs applied, for the maintenance
/// binaries.
#[cfg(feature = "ssr")]
pub fn establish_connection() -> ConnectionResult<SqliteConnection> {
    let database_url = database_url().ok_or_else(|| {
        ConnectionError::BadConnection("DATABASE_URL must be set in .env".to_string())
    })?;
    let mut conn = SqliteConnection::establish(&database_url)?;
    apply_pragmas(&mut conn).map_err(ConnectionError::CouldntSetupConfiguration)?;
    log!("Connected to {}", database_url);
    Ok(conn)
}

/// Adds a pool member. Usernames are unique; the alias, when set, is what leaderboards show.
#[cfg(feature = "ssr")]
pub fn create_user(
    conn: &mut SqliteConnection,
    username: &str,
    alias: Option<&str>,
    is_admin: bool,
) -> Result<User, PoolError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(PoolError::validation("username must not be empty"));
    }
    let alias = alias.map(str::trim).filter(|a| !a.is_empty());

    diesel::insert_into(users::table)
        .values(&NewUser {
            username,
            alias,
            is_admin,
        })
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                PoolError::validation(format!("username {} is already taken", username))
            }
            other => other.into(),
        })
}

/// All active users, by id.
#[cfg(feature = "ssr")]
pub fn active_users(conn: &mut SqliteConnection) -> Result<Vec<User>, PoolError> {
    let active = users::table
        .filter(users::is_active.eq(true))
        .order(users::id.asc())
        .select(User::as_select())
        .load(conn)?;
    Ok(active)
}

/// Issues a fresh session token for an active user, replacing any older one.
#[cfg(feature = "ssr")]
pub fn create_user_session(conn: &mut SqliteConnection, user_id: i32) -> Result<String, PoolError> {
    conn.transaction(|conn| {
        let active: i64 = users::table
            .filter(users::id.eq(user_id))
            .filter(users::is_active.eq(true))
            .count()
            .get_result(conn)?;
        if active == 0 {
            return Err(PoolError::not_found(format!("active user {}", user_id)));
        }

        diesel::delete(sessions::table.filter(sessions::user_id.eq(user_id))).execute(conn)?;

        let token = Uuid::new_v4().to_string();
        diesel::insert_into(sessions::table)
            .values(&NewSession {
                user_id,
                token: token.clone(),
            })
            .execute(conn)?;
        Ok(token)
    })
}

/// Retrieves an active user by their session token.
#[cfg(feature = "ssr")]
pub fn get_user_by_token(conn: &mut SqliteConnection, token: &str) -> Result<User, PoolError> {
    if Uuid::parse_str(token).is_err() {
        return Err(PoolError::not_found("session"));
    }

    let user: Option<User> = sessions::table
        .filter(sessions::token.eq(token))
        .inner_join(users::table)
        .filter(users::is_active.eq(true))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    user.ok_or_else(|| PoolError::not_found("session"))
}

/// Creates an admin session and returns the token.
#[cfg(feature = "ssr")]
pub fn create_admin_session(conn: &mut SqliteConnection) -> Result<String, PoolError> {
    let token = Uuid::new_v4().to_string();
    diesel::insert_into(admin_sessions::table)
        .values(&NewAdminSession {
            token: token.clone(),
        })
        .execute(conn)?;
    Ok(token)
}

/// Returns true if the token belongs to an admin session.
#[cfg(feature = "ssr")]
pub fn validate_admin_token(conn: &mut SqliteConnection, token: &str) -> Result<bool, PoolError> {
    if Uuid::parse_str(token).is_err() {
        return Ok(false);
    }
    let count: i64 = admin_sessions::table
        .filter(admin_sessions::token.eq(token))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

#[cfg(feature = "ssr")]
pub fn delete_admin_session(conn: &mut SqliteConnection, token: &str) -> Result<(), PoolError> {
    diesel::delete(admin_sessions::table.filter(admin_sessions::token.eq(token))).execute(conn)?;
    Ok(())
}

/// Clears the season's play: picks, weekly scores, sessions and recorded results. Users, the
/// schedule and the season clock stay.
#[cfg(feature = "ssr")]
pub fn reset_database(conn: &mut SqliteConnection) -> Result<(), PoolError> {
    conn.transaction(|conn| {
        diesel::delete(sessions::table).execute(conn)?;
        diesel::delete(admin_sessions::table).execute(conn)?;
        diesel::delete(weekly_scores::table).execute(conn)?;
        diesel::delete(picks_table::table).execute(conn)?;

        diesel::update(games_table::table)
            .set((
                games_table::home_score.eq(None::<i32>),
                games_table::away_score.eq(None::<i32>),
                games_table::status.eq("scheduled"),
            ))
            .execute(conn)?;

        Ok(())
    })
}
