//! Catalogue queries: ADQL templates, metadata reconciliation, and the
//! archive-level operations built on them.
//!
//! - [`adql`]: pure query-string builders
//! - [`resolve`]: [`CatalogueIndex`] and [`ColumnIndex`] for name validation, collection expansion, UCD column roles
//! - [`job`]: [`QueryJob`], one query plus its result and `last_version` bookkeeping
//! - [`archive`]: [`EsoArchive`], list catalogues, column info, catalogue and cone queries

pub mod adql;
pub mod archive;
pub mod job;
pub mod resolve;

pub use adql::{CatalogueSelect, SortOrder};
pub use archive::{CatalogueQuery, CatalogueResult, EsoArchive, ListOptions};
pub use job::QueryJob;
pub use resolve::{CatalogueIndex, ColumnIndex, ColumnRoles, UcdRole};
