//! Reconciling user-supplied names with the archive's metadata.
//!
//! [`CatalogueIndex`] wraps the all-versions catalogue listing and answers
//! "does this collection / table exist" questions; [`ColumnIndex`] does the
//! same for columns and finds the identifier and coordinate columns of a
//! table from their UCDs.
//!
//! Unknown names are never errors. They are logged with `tracing::warn!`
//! together with the accepted values and dropped.

use std::collections::BTreeSet;

use crate::error::{TapError, TapResult};
use crate::table::Table;

/// Column roles recognised through their UCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UcdRole {
    SourceId,
    Ra,
    Dec,
}

impl UcdRole {
    pub const ALL: [UcdRole; 3] = [UcdRole::SourceId, UcdRole::Ra, UcdRole::Dec];

    pub fn token(&self) -> &'static str {
        match self {
            UcdRole::SourceId => "meta.id;meta.main",
            UcdRole::Ra => "pos.eq.ra;meta.main",
            UcdRole::Dec => "pos.eq.dec;meta.main",
        }
    }

    pub fn from_ucd(ucd: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.token() == ucd)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CatalogueEntry {
    collection: String,
    table_name: String,
    number_rows: Option<u64>,
    last_version: bool,
}

/// Catalogue listing over every version of every table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogueIndex {
    entries: Vec<CatalogueEntry>,
}

fn require_column(table: &Table, name: &str, what: &str) -> TapResult<()> {
    if table.has_column(name) {
        Ok(())
    } else {
        Err(TapError::table(format!("{} lacks column '{}'", what, name)))
    }
}

impl CatalogueIndex {
    /// Build from a catalogue metadata table carrying `collection`,
    /// `table_name`, `number_rows` and `last_version`.
    pub fn from_table(table: &Table) -> TapResult<Self> {
        for name in ["collection", "table_name", "number_rows", "last_version"] {
            require_column(table, name, "Catalogue metadata")?;
        }
        let entries = table
            .rows()
            .filter_map(|row| {
                let table_name = row.get_str("table_name")?.to_string();
                Some(CatalogueEntry {
                    collection: row.get_str("collection").unwrap_or_default().to_string(),
                    table_name,
                    number_rows: row
                        .get("number_rows")
                        .and_then(|v| v.as_i64())
                        .and_then(|n| u64::try_from(n).ok()),
                    last_version: row
                        .get("last_version")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                })
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted, de-duplicated collection names.
    pub fn collections(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.collection.is_empty())
            .map(|e| e.collection.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn table_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.table_name.as_str()).collect()
    }

    fn entry(&self, table: &str) -> Option<&CatalogueEntry> {
        self.entries.iter().find(|e| e.table_name == table)
    }

    pub fn is_collection_known(&self, collection: &str) -> bool {
        if self.entries.iter().any(|e| e.collection == collection) {
            return true;
        }
        tracing::warn!(
            "Collection '{}' not recognized. Possible values:\n{:?}",
            collection,
            self.collections()
        );
        false
    }

    /// Known tables that are not the latest version are accepted with a warning.
    pub fn is_table_known(&self, table: &str) -> bool {
        match self.entry(table) {
            None => {
                tracing::warn!(
                    "Table '{}' not recognized. Possible values:\n{:?}",
                    table,
                    self.table_names()
                );
                false
            }
            Some(entry) => {
                if !entry.last_version {
                    tracing::warn!(
                        "'{}' is not the most recent version of the queried catalogue.",
                        table
                    );
                }
                true
            }
        }
    }

    /// Known subset of `collections`, in input order. `None` stays `None`.
    pub fn filter_collections(&self, collections: Option<&[String]>) -> Option<Vec<String>> {
        collections.map(|names| {
            names
                .iter()
                .filter(|c| self.is_collection_known(c))
                .cloned()
                .collect()
        })
    }

    /// Known subset of `tables`, in input order. `None` stays `None`.
    pub fn filter_tables(&self, tables: Option<&[String]>) -> Option<Vec<String>> {
        tables.map(|names| {
            names
                .iter()
                .filter(|t| self.is_table_known(t))
                .cloned()
                .collect()
        })
    }

    /// Tables of a collection; only the latest versions unless `all_versions`.
    pub fn tables_in_collection(&self, collection: &str, all_versions: bool) -> Vec<String> {
        if !self.is_collection_known(collection) {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| e.collection == collection && (all_versions || e.last_version))
            .map(|e| e.table_name.clone())
            .collect()
    }

    /// Union of the valid `tables` and the tables of the valid `collections`,
    /// de-duplicated and sorted.
    pub fn merge_collections_and_tables(
        &self,
        collections: Option<&[String]>,
        tables: Option<&[String]>,
        all_versions: bool,
    ) -> Vec<String> {
        let mut merged: BTreeSet<String> = self
            .filter_tables(tables)
            .unwrap_or_default()
            .into_iter()
            .collect();
        for collection in self.filter_collections(collections).unwrap_or_default() {
            merged.extend(self.tables_in_collection(&collection, all_versions));
        }
        merged.into_iter().filter(|t| !t.is_empty()).collect()
    }

    /// Row count of a known table.
    pub fn catalogue_length(&self, table: &str) -> Option<u64> {
        self.entry(table).and_then(|e| e.number_rows)
    }

    /// Per-table row counts, or `maxrec` repeated when it is given.
    pub fn catalogue_lengths(&self, tables: &[String], maxrec: Option<u64>) -> Vec<Option<u64>> {
        match maxrec {
            Some(maxrec) => vec![Some(maxrec); tables.len()],
            None => tables.iter().map(|t| self.catalogue_length(t)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ColumnEntry {
    table_name: String,
    column_name: String,
    ucd: Option<String>,
}

/// Columns identified by UCD for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnRoles {
    pub id: Option<String>,
    pub ra: Option<String>,
    pub dec: Option<String>,
}

impl ColumnRoles {
    pub fn get(&self, role: UcdRole) -> Option<&str> {
        match role {
            UcdRole::SourceId => self.id.as_deref(),
            UcdRole::Ra => self.ra.as_deref(),
            UcdRole::Dec => self.dec.as_deref(),
        }
    }
}

/// Column metadata (`table_name`, `column_name`, `ucd`) for a set of tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnIndex {
    entries: Vec<ColumnEntry>,
}

impl ColumnIndex {
    pub fn from_table(table: &Table) -> TapResult<Self> {
        for name in ["table_name", "column_name"] {
            require_column(table, name, "Column metadata")?;
        }
        let entries = table
            .rows()
            .filter_map(|row| {
                Some(ColumnEntry {
                    table_name: row.get_str("table_name")?.to_string(),
                    column_name: row.get_str("column_name")?.to_string(),
                    ucd: row.get_str("ucd").map(str::to_string),
                })
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restrict to the columns of one table.
    pub fn for_table(&self, table: &str) -> ColumnIndex {
        ColumnIndex {
            entries: self
                .entries
                .iter()
                .filter(|e| e.table_name == table)
                .cloned()
                .collect(),
        }
    }

    fn column_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.column_name.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_column_known(&self, column: &str) -> bool {
        self.entries.iter().any(|e| e.column_name == column)
    }

    /// Known subset of `columns`, in input order. `None` stays `None`.
    pub fn filter_columns(&self, columns: Option<&[String]>) -> Option<Vec<String>> {
        columns.map(|names| {
            names
                .iter()
                .filter(|c| {
                    let known = self.is_column_known(c);
                    if !known {
                        tracing::warn!(
                            "Column '{}' not recognized. Possible values:\n{:?}",
                            c,
                            self.column_names()
                        );
                    }
                    known
                })
                .cloned()
                .collect()
        })
    }

    /// The one column of `table` carrying the role's UCD, if there is exactly one.
    pub fn single_match(&self, table: &str, role: UcdRole) -> Option<String> {
        let matches: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.table_name == table && e.ucd.as_deref() == Some(role.token()))
            .map(|e| e.column_name.as_str())
            .collect();
        match matches.as_slice() {
            [single] => Some(single.to_string()),
            [] => None,
            several => {
                tracing::warn!(
                    "Table '{}' has {} columns with UCD '{}' ({:?}); none selected",
                    table,
                    several.len(),
                    role.token(),
                    several
                );
                None
            }
        }
    }

    pub fn identify(&self, table: &str) -> ColumnRoles {
        ColumnRoles {
            id: self.single_match(table, UcdRole::SourceId),
            ra: self.single_match(table, UcdRole::Ra),
            dec: self.single_match(table, UcdRole::Dec),
        }
    }

    /// Only the rows whose UCD marks a source ID, RA or Dec column.
    pub fn id_ra_dec_rows(&self) -> ColumnIndex {
        ColumnIndex {
            entries: self
                .entries
                .iter()
                .filter(|e| e.ucd.as_deref().and_then(UcdRole::from_ucd).is_some())
                .cloned()
                .collect(),
        }
    }
}
