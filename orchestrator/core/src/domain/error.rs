// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

/// Failures reported back to whoever sent a request.
///
/// Every variant maps to a status line and a short HTML explanation; there is no
/// machine-readable error body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FleetError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A downstream participant could not be reached, timed out, or refused the call.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A downstream call gave no answer in time, so whether it took effect is unknown.
    #[error("Unconfirmed: {0}")]
    Unconfirmed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn missing(param: &str) -> Self {
        Self::BadRequest(format!("missing required parameter '{}'", param))
    }

    pub fn status_code(&self) -> u16 {
        match self {
            FleetError::BadRequest(_) => 400,
            FleetError::NotFound(_) => 404,
            FleetError::Unavailable(_) => 503,
            FleetError::Unconfirmed(_) => 504,
            FleetError::Internal(_) => 500,
        }
    }

    /// Explanation without the variant prefix, for the HTML body.
    pub fn detail(&self) -> &str {
        match self {
            FleetError::BadRequest(m)
            | FleetError::NotFound(m)
            | FleetError::Unavailable(m)
            | FleetError::Unconfirmed(m)
            | FleetError::Internal(m) => m,
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FleetError::missing("server").status_code(), 400);
        assert_eq!(FleetError::NotFound("x".into()).status_code(), 404);
        assert_eq!(FleetError::Unavailable("x".into()).status_code(), 503);
        assert_eq!(FleetError::Unconfirmed("x".into()).status_code(), 504);
        assert_eq!(FleetError::Internal("x".into()).status_code(), 500);
        assert_eq!(
            FleetError::missing("server").detail(),
            "missing required parameter 'server'"
        );
    }
}
