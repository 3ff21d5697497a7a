//! Query execution against a TAP service.
//!
//! Everything above this module talks to the service through the
//! [`QueryExecutor`] trait: hand it a [`QueryRequest`] and get a decoded
//! [`Table`] back. [`TapClient`] is the HTTP implementation (sync and UWS
//! async endpoints); tests substitute in-memory executors.

pub mod client;

pub use client::{ServiceDescription, TapClient};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TapResult;
use crate::table::Table;

/// Which TAP endpoint runs the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Sync,
    Async,
}

impl QueryType {
    pub const ALL: [QueryType; 2] = [QueryType::Sync, QueryType::Async];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Sync => "sync",
            QueryType::Async => "async",
        }
    }

    /// Lenient parse: anything other than `sync`/`async` falls back to sync
    /// with a warning.
    pub fn parse_or_sync(s: &str) -> Self {
        s.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid query type: {}. Options: {:?}; using sync",
                s,
                QueryType::ALL.map(|q| q.as_str())
            );
            QueryType::Sync
        })
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(QueryType::Sync),
            "async" => Ok(QueryType::Async),
            other => Err(format!("unknown query type '{}'", other)),
        }
    }
}

/// One ADQL query plus its execution parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub query_type: QueryType,
    /// Row cap; `None` leaves it to the service.
    pub maxrec: Option<u64>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            query_type: QueryType::Sync,
            maxrec: None,
        }
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.query_type = query_type;
        self
    }

    pub fn with_maxrec(mut self, maxrec: Option<u64>) -> Self {
        self.maxrec = maxrec;
        self
    }
}

/// Runs ADQL queries and returns decoded tables.
pub trait QueryExecutor {
    fn execute(&self, request: &QueryRequest) -> TapResult<Table>;
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for &E {
    fn execute(&self, request: &QueryRequest) -> TapResult<Table> {
        (**self).execute(request)
    }
}

impl<E: QueryExecutor + ?Sized> QueryExecutor for Box<E> {
    fn execute(&self, request: &QueryRequest) -> TapResult<Table> {
        (**self).execute(request)
    }
}
