//! High-level catalogue operations against an archive.
//!
//! Each public operation fetches the metadata it needs once, validates the
//! requested names against it, and then runs its queries through the
//! [`QueryExecutor`].

use std::fmt;

use super::adql::{self, CatalogueSelect, SortOrder};
use super::job::QueryJob;
use super::resolve::{CatalogueIndex, ColumnIndex};
use crate::config::TapConfig;
use crate::error::TapResult;
use crate::position::{Cone, SkyPosition};
use crate::service::{QueryExecutor, QueryType};
use crate::table::{Column, Table};

/// Options for [`EsoArchive::list_catalogues`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub all_versions: bool,
    pub collections: Option<Vec<String>>,
    pub tables: Option<Vec<String>>,
    pub verbose: bool,
}

/// Selection for [`EsoArchive::query_catalogues`].
#[derive(Debug, Clone, Default)]
pub struct CatalogueQuery {
    pub collections: Option<Vec<String>>,
    pub tables: Option<Vec<String>>,
    pub columns: Option<Vec<String>>,
    /// Endpoint for the data queries; the configured default when `None`.
    pub query_type: Option<QueryType>,
    pub all_versions: bool,
    /// Row cap per table; the configured default when `None`.
    pub maxrec: Option<u64>,
    /// `(column, value)` pairs, combined with `AND`.
    pub conditions: Vec<(String, String)>,
    pub top: Option<u64>,
    pub order_by: Option<String>,
    pub order: SortOrder,
    pub cone: Option<Cone>,
    pub verbose: bool,
}

impl CatalogueQuery {
    pub fn for_collections<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collections: Some(collections.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn for_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: Some(tables.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }
}

/// Result of querying one catalogue table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueResult {
    pub table_name: String,
    /// Cone the query was restricted to, if any.
    pub cone: Option<Cone>,
    /// Row count of the whole catalogue, when known.
    pub total_rows: Option<u64>,
    pub maxrec: u64,
    pub table: Table,
}

impl fmt::Display for CatalogueResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self
            .total_rows
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        write!(
            f,
            "The query to {} returned {} entries out of {} (with a limit set to maxrec={})",
            self.table_name,
            self.table.len(),
            total,
            self.maxrec
        )
    }
}

/// Tables resolved from a [`CatalogueQuery`] plus the metadata needed to query them.
struct Selection {
    tables: Vec<String>,
    totals: Vec<Option<u64>>,
    columns: ColumnIndex,
}

/// Catalogue operations over any [`QueryExecutor`].
pub struct EsoArchive<E> {
    executor: E,
    config: TapConfig,
}

fn echo_query(query: &str) {
    if query.trim().is_empty() {
        tracing::info!("The query is empty.");
    } else {
        tracing::info!("Query:\n{}", query);
    }
}

fn warn_if_both(collections: Option<&[String]>, tables: Option<&[String]>) {
    if collections.is_some() && tables.is_some() {
        tracing::warn!("Both collections and tables are set; conditions are combined with AND");
    }
}

fn dropped_everything(filtered: &Option<Vec<String>>) -> bool {
    filtered.as_ref().is_some_and(|names| names.is_empty())
}

impl<E: QueryExecutor> EsoArchive<E> {
    pub fn new(executor: E, config: TapConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &TapConfig {
        &self.config
    }

    fn run(&self, query: String, query_type: QueryType, maxrec: Option<u64>, verbose: bool) -> TapResult<QueryJob> {
        if verbose {
            echo_query(&query);
        }
        let mut job = QueryJob::new(query)
            .with_query_type(query_type)
            .with_maxrec(maxrec);
        job.run(&self.executor)?;
        Ok(job)
    }

    /// Catalogue metadata sorted by collection, table and version, with `last_version` set.
    fn catalogue_metadata(
        &self,
        all_versions: bool,
        collections: &[String],
        tables: &[String],
        verbose: bool,
    ) -> TapResult<Table> {
        let query = adql::all_catalogues_query(&self.config.schema, all_versions, collections, tables);
        let mut job = self.run(query, QueryType::Sync, None, verbose)?;
        if let Some(table) = job.result_mut() {
            if ["collection", "table_name", "version"]
                .iter()
                .all(|c| table.has_column(c))
            {
                table.sort_by(&["collection", "table_name", "version"])?;
            }
        }
        job.set_last_version(true);
        Ok(job.into_result().unwrap_or_default())
    }

    /// Index over every version of every catalogue in the schema.
    pub fn catalogue_index(&self) -> TapResult<CatalogueIndex> {
        CatalogueIndex::from_table(&self.catalogue_metadata(true, &[], &[], false)?)
    }

    fn columns_metadata(&self, collections: &[String], tables: &[String], verbose: bool) -> TapResult<Table> {
        let query = adql::all_columns_query(collections, tables);
        let job = self.run(query, QueryType::Sync, None, verbose)?;
        Ok(job.into_result().unwrap_or_default())
    }

    pub fn column_index(&self, collections: &[String], tables: &[String]) -> TapResult<ColumnIndex> {
        ColumnIndex::from_table(&self.columns_metadata(collections, tables, false)?)
    }

    /// Catalogue metadata with `last_version` and the RA, Dec and source ID
    /// column names (`table_RA`, `table_Dec`, `table_ID`) of each table.
    pub fn list_catalogues(&self, options: &ListOptions) -> TapResult<Table> {
        warn_if_both(options.collections.as_deref(), options.tables.as_deref());
        let index = self.catalogue_index()?;
        let collections = index.filter_collections(options.collections.as_deref());
        let tables = index.filter_tables(options.tables.as_deref());
        if dropped_everything(&collections) || dropped_everything(&tables) {
            return Ok(Table::new());
        }
        let collections = collections.unwrap_or_default();
        let tables = tables.unwrap_or_default();

        let mut catalogues =
            self.catalogue_metadata(options.all_versions, &collections, &tables, options.verbose)?;
        if catalogues.is_empty() || !catalogues.has_column("table_name") {
            return Ok(catalogues);
        }

        let id_ra_dec = self.column_index(&collections, &tables)?.id_ra_dec_rows();
        let roles: Vec<_> = catalogues
            .text_values("table_name")
            .into_iter()
            .map(|name| name.map(|n| id_ra_dec.identify(n)).unwrap_or_default())
            .collect();

        catalogues.replace_column(
            Column::from_text("table_RA", roles.iter().map(|r| r.ra.clone()))
                .with_description("Identifier for RA in the catalog"),
        )?;
        catalogues.replace_column(
            Column::from_text("table_Dec", roles.iter().map(|r| r.dec.clone()))
                .with_description("Identifier for Dec in the catalog"),
        )?;
        catalogues.replace_column(
            Column::from_text("table_ID", roles.iter().map(|r| r.id.clone()))
                .with_description("Identifier for Source ID in the catalog"),
        )?;
        Ok(catalogues)
    }

    pub fn all_list_catalogues(&self, all_versions: bool, verbose: bool) -> TapResult<Table> {
        self.list_catalogues(&ListOptions {
            all_versions,
            verbose,
            ..ListOptions::default()
        })
    }

    /// Column metadata (name, UCD, datatype, description, unit) of the
    /// selected collections and tables.
    pub fn list_catalogues_info(
        &self,
        collections: Option<&[String]>,
        tables: Option<&[String]>,
        verbose: bool,
    ) -> TapResult<Table> {
        warn_if_both(collections, tables);
        let index = self.catalogue_index()?;
        let collections = index.filter_collections(collections);
        let tables = index.filter_tables(tables);
        if dropped_everything(&collections) || dropped_everything(&tables) {
            return Ok(Table::new());
        }
        self.columns_metadata(
            &collections.unwrap_or_default(),
            &tables.unwrap_or_default(),
            verbose,
        )
    }

    fn select(&self, query: &CatalogueQuery) -> TapResult<Selection> {
        let index = self.catalogue_index()?;
        let tables = index.merge_collections_and_tables(
            query.collections.as_deref(),
            query.tables.as_deref(),
            query.all_versions,
        );
        let totals = index.catalogue_lengths(&tables, None);
        let columns = if tables.is_empty() || (query.columns.is_none() && query.cone.is_none()) {
            ColumnIndex::default()
        } else {
            self.column_index(&[], &tables)?
        };
        Ok(Selection {
            tables,
            totals,
            columns,
        })
    }

    fn query_selection(
        &self,
        query: &CatalogueQuery,
        selection: &Selection,
        cone: Option<&Cone>,
    ) -> TapResult<Vec<CatalogueResult>> {
        let maxrec = query.maxrec.unwrap_or(self.config.maxrec);
        let query_type = query.query_type.unwrap_or(self.config.query_type);
        let mut results = Vec::new();

        for (table_name, total_rows) in selection.tables.iter().zip(&selection.totals) {
            let columns = selection.columns.for_table(table_name);
            let valid_columns = columns
                .filter_columns(query.columns.as_deref())
                .unwrap_or_default();

            let extra_condition = match cone {
                None => None,
                Some(cone) => {
                    let roles = columns.identify(table_name);
                    match (roles.ra, roles.dec) {
                        (Some(ra), Some(dec)) => Some(adql::cone_condition(&ra, &dec, cone)),
                        _ => {
                            tracing::warn!(
                                "Cannot identify RA/Dec columns of '{}'; skipping it for the cone search",
                                table_name
                            );
                            continue;
                        }
                    }
                }
            };

            let adql = adql::catalogue_query(&CatalogueSelect {
                table: table_name,
                columns: &valid_columns,
                conditions: &query.conditions,
                extra_condition,
                top: query.top,
                order_by: query.order_by.as_deref(),
                order: query.order,
            });
            let job = self.run(adql, query_type, Some(maxrec), query.verbose)?;

            let result = CatalogueResult {
                table_name: table_name.clone(),
                cone: cone.copied(),
                total_rows: *total_rows,
                maxrec,
                table: job.into_result().unwrap_or_default(),
            };
            tracing::info!("{}", result);
            results.push(result);
        }

        Ok(results)
    }

    /// Query every table selected by `query`, one result per table.
    pub fn query_catalogues(&self, query: &CatalogueQuery) -> TapResult<Vec<CatalogueResult>> {
        warn_if_both(query.collections.as_deref(), query.tables.as_deref());
        let selection = self.select(query)?;
        if selection.tables.is_empty() {
            tracing::warn!("No catalogue matched the requested collections and tables");
            return Ok(Vec::new());
        }
        self.query_selection(query, &selection, query.cone.as_ref())
    }

    /// Cone search of radius `radius_arcsec` around each position, over every
    /// selected table. Results come position by position; each carries its cone.
    pub fn query_catalogues_at_positions(
        &self,
        query: &CatalogueQuery,
        positions: &[SkyPosition],
        radius_arcsec: f64,
    ) -> TapResult<Vec<CatalogueResult>> {
        let cones = positions
            .iter()
            .map(|p| Cone::new(*p, radius_arcsec))
            .collect::<TapResult<Vec<_>>>()?;
        if cones.is_empty() {
            return Ok(Vec::new());
        }

        let query = CatalogueQuery {
            cone: cones.first().copied(),
            ..query.clone()
        };
        warn_if_both(query.collections.as_deref(), query.tables.as_deref());
        let selection = self.select(&query)?;
        if selection.tables.is_empty() {
            tracing::warn!("No catalogue matched the requested collections and tables");
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for cone in &cones {
            tracing::debug!("Cone search around {} (r={}\")", cone.center, cone.radius_arcsec);
            results.extend(self.query_selection(&query, &selection, Some(cone))?);
        }
        Ok(results)
    }

    /// Run a raw ADQL query. `None` arguments take the configured defaults.
    pub fn query_tap(
        &self,
        query: &str,
        query_type: Option<QueryType>,
        maxrec: Option<u64>,
        verbose: bool,
    ) -> TapResult<Table> {
        let query_type = query_type.unwrap_or(self.config.query_type);
        let maxrec = maxrec.unwrap_or(self.config.maxrec);
        let job = self.run(query.to_string(), query_type, Some(maxrec), verbose)?;
        Ok(job.into_result().unwrap_or_default())
    }
}
