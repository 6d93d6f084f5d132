use chrono::NaiveDate;
use thiserror::Error;

/// Errors that abort a journey simulation before or during the run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid simulation input: {0}")]
    InvalidConfig(String),

    #[error("solar ephemeris failure: {0}")]
    Ephemeris(String),

    #[error("run deadline exceeded after {samples} samples")]
    DeadlineExceeded { samples: usize },
}

/// Failure signal of a cloud-cover provider. Never escapes the attenuation
/// cache: every variant degrades to "no attenuation".
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("parameter {parameter} missing for {date}")]
    MissingParameter { parameter: String, date: NaiveDate },

    #[error("no data for {0} (fill value)")]
    NoData(NaiveDate),
}
