//! In-memory archive answering catalogue and column metadata queries from
//! canned tables. Every request is recorded for inspection.

use celestial_tap::{Column, QueryExecutor, QueryRequest, Table, TapResult, Value};
use std::cell::RefCell;

/// (collection, title, version, table_name, number_rows)
pub const CATALOGUES: &[(&str, &str, i64, &str, i64)] = &[
    ("KiDS", "KiDS DR4", 4, "KiDS_DR4_1_ugriZYJHKs_cat_fits", 1000),
    ("KiDS", "KiDS DR4", 3, "KiDS_DR4_0_cat", 900),
    ("VVV", "VVV DR2", 2, "vvv_dr2_cat", 500),
    ("PHANGS", "PHANGS", 1, "phangs_cat", 10),
];

/// (table_name, column_name, ucd)
pub const COLUMNS: &[(&str, &str, Option<&str>)] = &[
    ("KiDS_DR4_1_ugriZYJHKs_cat_fits", "ID", Some("meta.id;meta.main")),
    ("KiDS_DR4_1_ugriZYJHKs_cat_fits", "RAJ2000", Some("pos.eq.ra;meta.main")),
    ("KiDS_DR4_1_ugriZYJHKs_cat_fits", "DECJ2000", Some("pos.eq.dec;meta.main")),
    ("KiDS_DR4_1_ugriZYJHKs_cat_fits", "MAG_AUTO", Some("phot.mag")),
    ("KiDS_DR4_0_cat", "ID", Some("meta.id;meta.main")),
    ("KiDS_DR4_0_cat", "RA", Some("pos.eq.ra;meta.main")),
    ("KiDS_DR4_0_cat", "DEC", Some("pos.eq.dec;meta.main")),
    ("vvv_dr2_cat", "SOURCEID", Some("meta.id;meta.main")),
    ("vvv_dr2_cat", "RA1", Some("pos.eq.ra;meta.main")),
    ("vvv_dr2_cat", "RA2", Some("pos.eq.ra;meta.main")),
    ("vvv_dr2_cat", "DEC", Some("pos.eq.dec;meta.main")),
    ("phangs_cat", "NAME", None),
    ("phangs_cat", "RA", Some("pos.eq.ra;meta.main")),
    ("phangs_cat", "DEC", Some("pos.eq.dec;meta.main")),
];

#[derive(Default)]
pub struct InMemoryArchive {
    requests: RefCell<Vec<QueryRequest>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.borrow().clone()
    }

    /// Requests other than metadata lookups.
    pub fn data_requests(&self) -> Vec<QueryRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.query.contains("TAP_SCHEMA"))
            .collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.query.contains(needle))
            .count()
    }
}

fn like_matches(query: &str, column: &str, value: &str) -> bool {
    query.contains(&format!("{} LIKE '%'", column))
        || query.contains(&format!("{} LIKE '{}'", column, value))
}

/// Filters appended as `AND (col LIKE ..)` only apply when present.
fn optional_like(query: &str, column: &str, value: &str) -> bool {
    !query.contains(&format!("({} LIKE", column)) || like_matches(query, column, value)
}

fn is_latest(title: &str, version: i64) -> bool {
    CATALOGUES
        .iter()
        .filter(|c| c.1 == title)
        .all(|c| c.2 <= version)
}

fn collection_of(table: &str) -> &'static str {
    CATALOGUES
        .iter()
        .find(|c| c.3 == table)
        .map(|c| c.0)
        .unwrap_or("")
}

fn catalogues_table(query: &str) -> Table {
    let latest_only = query.contains("cat_id IN");
    let rows: Vec<_> = CATALOGUES
        .iter()
        .filter(|c| !latest_only || is_latest(c.1, c.2))
        .filter(|c| optional_like(query, "collection", c.0))
        .filter(|c| optional_like(query, "table_name", c.3))
        .collect();

    Table::from_columns(vec![
        Column::from_text("collection", rows.iter().map(|c| Some(c.0))),
        Column::from_text("title", rows.iter().map(|c| Some(c.1))),
        Column::new("version", rows.iter().map(|c| Value::Int(c.2)).collect()),
        Column::from_text("table_name", rows.iter().map(|c| Some(c.3))),
        Column::new("number_rows", rows.iter().map(|c| Value::Int(c.4)).collect()),
    ])
    .unwrap()
}

fn columns_table(query: &str) -> Table {
    let rows: Vec<_> = COLUMNS
        .iter()
        .filter(|c| like_matches(query, "collection", collection_of(c.0)))
        .filter(|c| like_matches(query, "table_name", c.0))
        .collect();

    Table::from_columns(vec![
        Column::from_text("table_name", rows.iter().map(|c| Some(c.0))),
        Column::from_text("column_name", rows.iter().map(|c| Some(c.1))),
        Column::from_text("ucd", rows.iter().map(|c| c.2)),
    ])
    .unwrap()
}

fn data_table() -> Table {
    Table::from_columns(vec![Column::new("x", vec![Value::Int(1), Value::Int(2)])]).unwrap()
}

impl QueryExecutor for InMemoryArchive {
    fn execute(&self, request: &QueryRequest) -> TapResult<Table> {
        self.requests.borrow_mut().push(request.clone());
        let query = request.query.as_str();
        if query.contains("FROM TAP_SCHEMA.tables AS ref") {
            Ok(catalogues_table(query))
        } else if query.contains("FROM TAP_SCHEMA.columns") {
            Ok(columns_table(query))
        } else {
            Ok(data_table())
        }
    }
}
