use std::collections::HashMap;

use crate::error::TapResult;
use crate::service::{QueryExecutor, QueryRequest, QueryType};
use crate::table::{Column, Table, Value};

const LAST_VERSION: &str = "last_version";

/// One query and, once run, its result.
#[derive(Debug, Clone)]
pub struct QueryJob {
    request: QueryRequest,
    result: Option<Table>,
}

impl QueryJob {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            request: QueryRequest::new(query),
            result: None,
        }
    }

    pub fn with_query_type(mut self, query_type: QueryType) -> Self {
        self.request.query_type = query_type;
        self
    }

    /// Row cap sent as `MAXREC`. `None` omits it, leaving the service default.
    pub fn with_maxrec(mut self, maxrec: Option<u64>) -> Self {
        self.request.maxrec = maxrec;
        self
    }

    pub fn request(&self) -> &QueryRequest {
        &self.request
    }

    pub fn run<E: QueryExecutor + ?Sized>(&mut self, executor: &E) -> TapResult<&Table> {
        let table = executor.execute(&self.request)?;
        Ok(self.result.insert(table))
    }

    pub fn result(&self) -> Option<&Table> {
        self.result.as_ref()
    }

    pub fn result_mut(&mut self) -> Option<&mut Table> {
        self.result.as_mut()
    }

    pub fn into_result(self) -> Option<Table> {
        self.result
    }

    /// Flag the rows holding the highest `version` of each `title`.
    ///
    /// Adds (or with `update`, replaces) a boolean `last_version` column.
    /// Does nothing, with a warning, when there is no result or the result
    /// lacks `title` or `version`.
    pub fn set_last_version(&mut self, update: bool) {
        let Some(table) = self.result.as_mut() else {
            tracing::warn!("No results to update.");
            return;
        };
        for required in ["title", "version"] {
            if !table.has_column(required) {
                tracing::warn!("Column '{}' missing. Cannot create 'last_version'.", required);
                return;
            }
        }
        if table.has_column(LAST_VERSION) && !update {
            tracing::warn!("'last_version' already exists; skipping update.");
            return;
        }

        let mut latest: HashMap<Option<&str>, f64> = HashMap::new();
        for row in table.rows() {
            if let Some(version) = row.get("version").and_then(Value::as_f64) {
                latest
                    .entry(row.get_str("title"))
                    .and_modify(|max| *max = max.max(version))
                    .or_insert(version);
            }
        }

        let flags: Vec<Value> = table
            .rows()
            .map(|row| {
                let version = row.get("version").and_then(Value::as_f64);
                let max = latest.get(&row.get_str("title")).copied();
                Value::Bool(version.is_some() && version == max)
            })
            .collect();

        let column = Column::new(LAST_VERSION, flags)
            .with_datatype("boolean")
            .with_description("True if this is the latest version of the catalogue");
        if let Err(e) = table.replace_column(column) {
            tracing::warn!("Cannot create 'last_version': {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TapError;

    struct CannedExecutor(Table);

    impl QueryExecutor for CannedExecutor {
        fn execute(&self, _request: &QueryRequest) -> TapResult<Table> {
            Ok(self.0.clone())
        }
    }

    struct FailingExecutor;

    impl QueryExecutor for FailingExecutor {
        fn execute(&self, _request: &QueryRequest) -> TapResult<Table> {
            Err(TapError::service("boom"))
        }
    }

    fn versions_table() -> Table {
        Table::from_columns(vec![
            Column::from_text("title", ["A", "A", "B", "B", "C"].map(Some)),
            Column::new(
                "version",
                vec![
                    Value::Int(1),
                    Value::Int(3),
                    Value::Float(2.0),
                    Value::Null,
                    Value::Null,
                ],
            ),
        ])
        .unwrap()
    }

    fn flags(table: &Table) -> Vec<Option<bool>> {
        table
            .column(LAST_VERSION)
            .unwrap()
            .values
            .iter()
            .map(Value::as_bool)
            .collect()
    }

    #[test]
    fn test_run_stores_result() {
        let mut job = QueryJob::new("SELECT * FROM t")
            .with_query_type(QueryType::Async)
            .with_maxrec(Some(5));
        assert!(job.result().is_none());
        assert_eq!(job.request().maxrec, Some(5));
        assert_eq!(job.run(&CannedExecutor(versions_table())).unwrap().len(), 5);
        assert_eq!(job.into_result().unwrap().len(), 5);
    }

    #[test]
    fn test_without_maxrec_request_has_none() {
        let job = QueryJob::new("SELECT * FROM t");
        assert_eq!(job.request().maxrec, None);
        assert_eq!(job.with_maxrec(None).request().maxrec, None);
    }

    #[test]
    fn test_run_propagates_errors() {
        let mut job = QueryJob::new("SELECT * FROM t");
        assert!(job.run(&FailingExecutor).is_err());
        assert!(job.result().is_none());
    }

    #[test]
    fn test_set_last_version() {
        let mut job = QueryJob::new("q");
        job.run(&CannedExecutor(versions_table())).unwrap();
        job.set_last_version(true);
        let table = job.result().unwrap();
        assert_eq!(
            flags(table),
            vec![Some(false), Some(true), Some(true), Some(false), Some(false)]
        );
        assert_eq!(
            table.column(LAST_VERSION).unwrap().description.as_deref(),
            Some("True if this is the latest version of the catalogue")
        );
    }

    #[test]
    fn test_set_last_version_without_update_keeps_column() {
        let mut table = versions_table();
        table
            .add_column(Column::new(LAST_VERSION, vec![Value::Bool(true); 5]))
            .unwrap();
        let mut job = QueryJob::new("q");
        job.run(&CannedExecutor(table)).unwrap();

        job.set_last_version(false);
        assert_eq!(flags(job.result().unwrap()), vec![Some(true); 5]);

        job.set_last_version(true);
        assert_eq!(flags(job.result().unwrap())[0], Some(false));
    }

    #[test]
    fn test_set_last_version_noops() {
        let mut job = QueryJob::new("q");
        job.set_last_version(true);
        assert!(job.result().is_none());

        let table = Table::from_columns(vec![Column::from_text("title", [Some("A")])]).unwrap();
        job.run(&CannedExecutor(table)).unwrap();
        job.set_last_version(true);
        assert!(!job.result().unwrap().has_column(LAST_VERSION));
    }
}
