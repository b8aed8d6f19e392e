use thiserror::Error;

/// Errors surfaced by pool operations.
///
/// Client errors carry a message meant for the caller. Store failures are reported generically
/// once they leave the server.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Game {game_id} has already kicked off")]
    Locked { game_id: i32 },

    #[error("Unauthorized")]
    Unauthorized,

    #[cfg(feature = "ssr")]
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

impl PoolError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PoolError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PoolError::NotFound(msg.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PoolError::Validation(_)
                | PoolError::NotFound(_)
                | PoolError::Locked { .. }
                | PoolError::Unauthorized
        )
    }

    /// The message shown to clients. Store failures are not echoed back.
    pub fn public_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            "Internal server error".to_string()
        }
    }
}

/// Checks that a week/season pair is usable before any work is done.
pub fn validate_week(week: i32, season: i32) -> Result<(), PoolError> {
    if week < 1 {
        return Err(PoolError::validation(format!(
            "week must be a positive integer, got {}",
            week
        )));
    }
    validate_season(season)
}

pub fn validate_season(season: i32) -> Result<(), PoolError> {
    if !(1000..=9999).contains(&season) {
        return Err(PoolError::validation(format!(
            "season must be a four digit year, got {}",
            season
        )));
    }
    Ok(())
}

#[cfg(feature = "ssr")]
impl From<diesel::r2d2::PoolError> for PoolError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        PoolError::Pool(e.to_string())
    }
}

#[cfg(feature = "ssr")]
impl axum::response::IntoResponse for PoolError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            PoolError::Validation(_) => StatusCode::BAD_REQUEST,
            PoolError::NotFound(_) => StatusCode::NOT_FOUND,
            PoolError::Locked { .. } => StatusCode::CONFLICT,
            PoolError::Unauthorized => StatusCode::UNAUTHORIZED,
            PoolError::Database(_) | PoolError::Pool(_) => {
                leptos::logging::error!("Request failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_week() {
        assert!(validate_week(1, 2024).is_ok());
        assert!(validate_week(18, 2025).is_ok());
        assert!(matches!(
            validate_week(0, 2024),
            Err(PoolError::Validation(_))
        ));
        assert!(matches!(
            validate_week(3, 24),
            Err(PoolError::Validation(_))
        ));
    }

    #[test]
    fn test_public_message_hides_internal_errors() {
        let err = PoolError::Pool("timed out waiting for connection".to_string());
        assert!(!err.is_client_error());
        assert_eq!(err.public_message(), "Internal server error");

        let err = PoolError::Locked { game_id: 7 };
        assert!(err.is_client_error());
        assert_eq!(err.public_message(), "Game 7 has already kicked off");
    }
}
