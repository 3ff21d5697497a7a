//! Error types for TAP queries and result handling.
//!
//! [`TapError`] covers everything that can go wrong between building a query
//! and holding a decoded table: transport failures, service-side query errors,
//! malformed VOTable or UWS payloads, async job failures, bad numeric input,
//! table shape problems, and local I/O.
//!
//! Unknown collection, table, or column *names* are not errors. Those are
//! logged and dropped by [`crate::query::resolve`].
//!
//! | Variant | Raised by |
//! |---------|-----------|
//! | [`Http`](TapError::Http) | connection, TLS, timeout in the HTTP layer |
//! | [`Status`](TapError::Status) | non-2xx HTTP responses |
//! | [`Service`](TapError::Service) | `QUERY_STATUS=ERROR` in a VOTable |
//! | [`Format`](TapError::Format) | unparsable VOTable / UWS documents |
//! | [`Job`](TapError::Job) | async job ended in `ERROR` or `ABORTED` |
//! | [`Timeout`](TapError::Timeout) | async job still running after the deadline |
//! | [`InvalidInput`](TapError::InvalidInput) | coordinates, radius, angle strings |
//! | [`Table`](TapError::Table) | duplicate / missing columns, ragged lengths |
//! | [`Config`](TapError::Config) | unreadable or invalid config file |

use thiserror::Error;

/// Unified error type for the crate.
#[derive(Error, Debug)]
pub enum TapError {
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("HTTP request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("TAP service reported an error: {message}")]
    Service { message: String },

    #[error("Malformed {context}: {message}")]
    Format { context: String, message: String },

    #[error("Async job {job} ended in phase {phase}: {message}")]
    Job {
        job: String,
        phase: String,
        message: String,
    },

    #[error("Async job {job} did not finish within {seconds} s")]
    Timeout { job: String, seconds: u64 },

    #[error("Invalid {parameter}: {message}")]
    InvalidInput { parameter: String, message: String },

    #[error("Table error: {message}")]
    Table { message: String },

    #[error("Config error ({path}): {message}")]
    Config { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Convenience alias for `Result<T, TapError>`.
pub type TapResult<T> = Result<T, TapError>;

impl TapError {
    pub fn http(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    pub fn format(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Format {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn job(job: impl Into<String>, phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            job: job.into(),
            phase: phase.into(),
            message: message.into(),
        }
    }

    pub fn timeout(job: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            job: job.into(),
            seconds,
        }
    }

    pub fn invalid_input(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    pub fn table(message: impl Into<String>) -> Self {
        Self::Table {
            message: message.into(),
        }
    }

    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether a sync query that failed this way is worth one retry with a
    /// smaller row cap.
    pub fn is_retryable_query_failure(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::Service { .. } | Self::Format { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_display() {
        let err = TapError::http("https://example.org/tap/sync", "connection refused");
        assert_eq!(
            err.to_string(),
            "HTTP request to https://example.org/tap/sync failed: connection refused"
        );
    }

    #[test]
    fn test_status_display() {
        let err = TapError::status("https://example.org/tap/sync", 503);
        assert!(err.to_string().contains("status 503"));
    }

    #[test]
    fn test_job_display() {
        let err = TapError::job("https://example.org/tap/async/42", "ERROR", "syntax error");
        let msg = err.to_string();
        assert!(msg.contains("async/42"));
        assert!(msg.contains("ERROR"));
        assert!(msg.contains("syntax error"));
    }

    #[test]
    fn test_invalid_input_display() {
        let err = TapError::invalid_input("radius", "must be positive");
        assert_eq!(err.to_string(), "Invalid radius: must be positive");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TapError::service("boom").is_retryable_query_failure());
        assert!(TapError::format("VOTable", "eof").is_retryable_query_failure());
        assert!(TapError::http("u", "reset").is_retryable_query_failure());
        assert!(!TapError::status("u", 404).is_retryable_query_failure());
        assert!(!TapError::table("dup").is_retryable_query_failure());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TapError = io.into();
        assert!(matches!(err, TapError::Io(_)));
    }
}
