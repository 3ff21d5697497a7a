//! ADQL query templates.
//!
//! Table and column names are inserted verbatim; callers validate them first
//! (see [`crate::query::resolve`]). Collection and table names used inside
//! `LIKE` patterns have single quotes doubled.

use std::fmt;
use std::str::FromStr;

use crate::position::Cone;

/// Result ordering for `ORDER BY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascending" | "asc" => Ok(SortOrder::Ascending),
            "descending" | "desc" => Ok(SortOrder::Descending),
            other => Err(format!(
                "unknown sort order '{}' (expected ascending or descending)",
                other
            )),
        }
    }
}

/// Everything needed to build the query against one catalogue table.
#[derive(Debug, Clone, Default)]
pub struct CatalogueSelect<'a> {
    pub table: &'a str,
    /// Empty selects every column.
    pub columns: &'a [String],
    /// `(column, value)` pairs rendered as `column=value`.
    pub conditions: &'a [(String, String)],
    /// Extra condition ANDed with the others, usually from [`cone_condition`].
    pub extra_condition: Option<String>,
    pub top: Option<u64>,
    pub order_by: Option<&'a str>,
    pub order: SortOrder,
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn like_any(column: &str, patterns: &[String]) -> String {
    if patterns.is_empty() {
        return format!("{} LIKE '%'", column);
    }
    patterns
        .iter()
        .map(|p| format!("{} LIKE '{}'", column, escape_literal(p)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `a, b, c`, or `*` when no column is given.
pub fn comma_separated(columns: &[String]) -> String {
    if columns.is_empty() {
        "*".to_string()
    } else {
        columns.join(", ")
    }
}

pub fn collections_like(collections: &[String]) -> String {
    like_any("collection", collections)
}

pub fn tables_like(tables: &[String]) -> String {
    like_any("table_name", tables)
}

/// ` ORDER BY col ASC`, or empty when no column is given.
pub fn order_by_clause(order_by: Option<&str>, order: SortOrder) -> String {
    match order_by.map(str::trim).filter(|c| !c.is_empty()) {
        Some(column) => format!(" ORDER BY {} {}", column, order.as_sql()),
        None => String::new(),
    }
}

/// `WHERE a=1 AND b=2 [AND extra]`, or empty when there is nothing to filter.
pub fn where_clause(conditions: &[(String, String)], extra: Option<&str>) -> String {
    let mut parts: Vec<String> = conditions
        .iter()
        .map(|(column, value)| format!("{}={}", column, value))
        .collect();
    parts.extend(extra.map(str::to_string));
    if parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", parts.join(" AND "))
    }
}

/// Point-in-circle test; the radius is passed in arcseconds and converted in ADQL.
pub fn cone_condition(ra_column: &str, dec_column: &str, cone: &Cone) -> String {
    format!(
        "CONTAINS(POINT('', {}, {}), CIRCLE('', {}, {}, {}/3600.)) = 1",
        ra_column, dec_column, cone.center.ra_deg, cone.center.dec_deg, cone.radius_arcsec
    )
}

/// `SELECT [TOP n ]cols FROM table`.
pub fn table_base(table: &str, columns: &[String], top: Option<u64>) -> String {
    let top = top.map(|n| format!("TOP {} ", n)).unwrap_or_default();
    format!("SELECT {}{} FROM {}", top, comma_separated(columns), table)
}

/// Catalogue metadata from `TAP_SCHEMA.tables`, joined with the key tables.
///
/// Unless `all_versions` is set only catalogues without a newer version of
/// the same title are returned. Non-empty `collections` / `tables` add
/// `LIKE` filters combined with `AND`.
pub fn all_catalogues_query(
    schema: &str,
    all_versions: bool,
    collections: &[String],
    tables: &[String],
) -> String {
    let mut query = format!(
        "SELECT collection, title, version, table_name, filter, instrument, telescope, \
         publication_date, ref.description AS description, number_rows, number_columns, \
         rel_descr_url, acknowledgment, cat_id, mjd_obs, mjd_end, skysqdeg, bibliography, \
         document_id, kc.from_column AS from_column, k.target_table AS target_table, \
         kc.target_column AS target_column, schema_name \
         FROM TAP_SCHEMA.tables AS ref \
         LEFT OUTER JOIN TAP_SCHEMA.keys AS k ON ref.table_name = k.from_table \
         LEFT OUTER JOIN TAP_SCHEMA.key_columns AS kc ON k.key_id = kc.key_id \
         WHERE schema_name = '{}'",
        escape_literal(schema)
    );

    if !all_versions {
        query.push_str(
            " AND cat_id IN (SELECT t1.cat_id FROM TAP_SCHEMA.tables t1 \
             LEFT JOIN TAP_SCHEMA.tables t2 ON (t1.title = t2.title AND t1.version < t2.version) \
             WHERE t2.title IS NULL)",
        );
    }
    if !collections.is_empty() {
        query.push_str(&format!(" AND ({})", collections_like(collections)));
    }
    if !tables.is_empty() {
        query.push_str(&format!(" AND ({})", tables_like(tables)));
    }
    query
}

/// Column metadata from `TAP_SCHEMA.columns` for the given collections and tables.
pub fn all_columns_query(collections: &[String], tables: &[String]) -> String {
    format!(
        "SELECT table_name, column_name, ucd, datatype, description, unit \
         FROM TAP_SCHEMA.columns \
         WHERE table_name IN (SELECT table_name FROM TAP_SCHEMA.tables WHERE {}) \
         AND ({})",
        collections_like(collections),
        tables_like(tables)
    )
}

pub fn catalogue_query(select: &CatalogueSelect<'_>) -> String {
    let mut query = table_base(select.table, select.columns, select.top);
    let filter = where_clause(select.conditions, select.extra_condition.as_deref());
    if !filter.is_empty() {
        query.push(' ');
        query.push_str(&filter);
    }
    query.push_str(&order_by_clause(select.order_by, select.order));
    query
}
