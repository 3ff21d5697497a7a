//! Query construction and result normalization for TAP catalogue services.
//!
//! Translates catalogue selections (collections, tables, columns, value
//! conditions, cone searches, ordering, row caps) into ADQL, runs them
//! against an IVOA TAP service, and post-processes the returned tables:
//! sorting, version bookkeeping, and identification of the source ID, RA
//! and Dec columns from their UCDs. The default service is the ESO
//! catalogue facility (`https://archive.eso.org/tap_cat`, schema `safcat`).
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`query::archive`] | [`EsoArchive`]: `list_catalogues`, `list_catalogues_info`, `query_catalogues`, cone searches, raw ADQL |
//! | [`query::resolve`] | [`CatalogueIndex`](query::CatalogueIndex) / [`ColumnIndex`](query::ColumnIndex): name validation and UCD column roles |
//! | [`query::adql`] | ADQL string templates |
//! | [`query::job`] | [`QueryJob`](query::QueryJob) and `last_version` flags |
//! | [`service`] | [`QueryExecutor`] trait, [`TapClient`] over HTTP (sync and async/UWS) |
//! | [`votable`] | VOTable decoding (TABLEDATA, BINARY, BINARY2) and UWS phases |
//! | [`table`] | [`Table`], [`Column`], [`Value`], CSV output |
//! | [`position`] | [`SkyPosition`] parsing (degrees, HMS/DMS) and [`Cone`] |
//! | [`config`] | [`TapConfig`] loaded from TOML |
//!
//! # Quick Start
//!
//! ```no_run
//! use celestial_tap::{CatalogueQuery, EsoArchive, TapClient, TapConfig};
//!
//! # fn main() -> Result<(), celestial_tap::TapError> {
//! let config = TapConfig::default();
//! let archive = EsoArchive::new(TapClient::new(config.clone())?, config);
//!
//! let query = CatalogueQuery {
//!     top: Some(10),
//!     ..CatalogueQuery::for_collections(["KiDS"])
//! };
//! for result in archive.query_catalogues(&query)? {
//!     println!("{}\n{}", result, result.table);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Unknown collection, table and column names are logged through `tracing`
//! and skipped rather than returned as errors.
//!
//! # Features
//!
//! - **`cli`**: Enables the `tap-query` binary.
//! - **`integration-tests`**: Tests against the live ESO service.

pub mod config;
pub mod error;
pub mod position;
pub mod query;
pub mod service;
pub mod table;
pub mod votable;

pub use config::{TapConfig, ESO_TAP_CAT_URL};
pub use error::{TapError, TapResult};
pub use position::{Cone, SkyPosition};
pub use query::{CatalogueQuery, CatalogueResult, EsoArchive, ListOptions, SortOrder};
pub use service::{QueryExecutor, QueryRequest, QueryType, TapClient};
pub use table::{Column, Table, Value};
pub use votable::parse_votable;
