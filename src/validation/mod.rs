//! Input checks run before any database or network call.
//!
//! Shared by the HTTP handlers and the live session room, so both reject
//! the same input with the same message.

pub mod reward;
pub mod session;
pub mod task;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<garde::Report> for ValidationError {
    fn from(report: garde::Report) -> Self {
        Self(report.to_string().trim().to_string())
    }
}

/// Rejects values made only of whitespace.
pub(crate) fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}
