use anyhow::Context;
use celestial_tap::query::{CatalogueQuery, CatalogueResult, EsoArchive, ListOptions, SortOrder};
use celestial_tap::{Cone, QueryType, SkyPosition, Table, TapClient, TapConfig, Value};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Parser)]
#[command(name = "tap-query")]
#[command(about = "Query astronomical catalogues through a TAP service")]
struct Cli {
    /// TOML config file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TAP service URL, overriding the config
    #[arg(long, global = true)]
    url: Option<String>,

    /// Echo queries and log HTTP traffic
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    format: OutputFormat,

    /// Write each result table to this CSV file instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Selection {
    /// Collection name (repeatable)
    #[arg(long = "collection")]
    collections: Vec<String>,
    /// Table name (repeatable)
    #[arg(long = "table")]
    tables: Vec<String>,
}

/// Endpoint choice; the config's `query_type` applies when neither is given.
#[derive(Args)]
struct Endpoint {
    /// Run through the async (UWS) endpoint
    #[arg(long = "async", conflicts_with = "query_type")]
    use_async: bool,
    /// Endpoint by name: sync or async (anything else falls back to sync)
    #[arg(long)]
    query_type: Option<String>,
}

impl Endpoint {
    fn query_type(&self) -> Option<QueryType> {
        if self.use_async {
            Some(QueryType::Async)
        } else {
            self.query_type.as_deref().map(QueryType::parse_or_sync)
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List catalogues with their RA/Dec/ID columns
    Catalogues {
        #[command(flatten)]
        selection: Selection,
        /// Include obsolete catalogue versions
        #[arg(long)]
        all_versions: bool,
    },
    /// List the columns of catalogues
    Columns {
        #[command(flatten)]
        selection: Selection,
    },
    /// Query catalogue tables
    Query {
        #[command(flatten)]
        selection: Selection,
        /// Column to retrieve (repeatable; all columns when omitted)
        #[arg(long = "column")]
        columns: Vec<String>,
        /// Value condition COL=VALUE (repeatable, combined with AND)
        #[arg(long = "where", value_parser = parse_condition)]
        conditions: Vec<(String, String)>,
        /// Return only the first N rows
        #[arg(long)]
        top: Option<u64>,
        /// Column to order the result by
        #[arg(long)]
        order_by: Option<String>,
        /// Descending order
        #[arg(long)]
        descending: bool,
        /// Row cap per table
        #[arg(long)]
        maxrec: Option<u64>,
        #[command(flatten)]
        endpoint: Endpoint,
        /// Include obsolete catalogue versions
        #[arg(long)]
        all_versions: bool,
        /// Cone center RA (degrees, or HMS e.g. 18h36m56s, 18:36:56)
        #[arg(long, requires_all = ["dec", "radius"], allow_hyphen_values = true)]
        ra: Option<String>,
        /// Cone center Dec (degrees, or DMS e.g. +38d47m01s, -5:22:30)
        #[arg(long, requires_all = ["ra", "radius"], allow_hyphen_values = true)]
        dec: Option<String>,
        /// Cone radius in arcseconds
        #[arg(long, requires_all = ["ra", "dec"])]
        radius: Option<f64>,
    },
    /// Run a raw ADQL query
    Adql {
        query: String,
        /// Row cap
        #[arg(long)]
        maxrec: Option<u64>,
        #[command(flatten)]
        endpoint: Endpoint,
    },
    /// Show the service settings and whether it is available
    Describe,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => TapConfig::load(path)?,
        None => TapConfig::default(),
    };
    if let Some(url) = &cli.url {
        config = config.with_service_url(url.clone());
    }

    let client = TapClient::new(config.clone()).context("Failed to set up the TAP client")?;
    let archive = EsoArchive::new(client, config);

    match cli.command {
        Commands::Catalogues {
            selection,
            all_versions,
        } => {
            let table = archive.list_catalogues(&ListOptions {
                all_versions,
                collections: non_empty(selection.collections),
                tables: non_empty(selection.tables),
                verbose: cli.verbose,
            })?;
            emit(&table, "catalogues", &cli.format, cli.output.as_deref(), false)?;
        }
        Commands::Columns { selection } => {
            let table = archive.list_catalogues_info(
                non_empty(selection.collections).as_deref(),
                non_empty(selection.tables).as_deref(),
                cli.verbose,
            )?;
            emit(&table, "columns", &cli.format, cli.output.as_deref(), false)?;
        }
        Commands::Query {
            selection,
            columns,
            conditions,
            top,
            order_by,
            descending,
            maxrec,
            endpoint,
            all_versions,
            ra,
            dec,
            radius,
        } => {
            let cone = match (ra, dec, radius) {
                (Some(ra), Some(dec), Some(radius)) => {
                    Some(Cone::new(SkyPosition::parse(&ra, &dec)?, radius)?)
                }
                _ => None,
            };
            let query = CatalogueQuery {
                collections: non_empty(selection.collections),
                tables: non_empty(selection.tables),
                columns: non_empty(columns),
                query_type: endpoint.query_type(),
                all_versions,
                maxrec,
                conditions,
                top,
                order_by,
                order: if descending {
                    SortOrder::Descending
                } else {
                    SortOrder::Ascending
                },
                cone,
                verbose: cli.verbose,
            };
            let results = archive.query_catalogues(&query)?;
            emit_results(&results, &cli.format, cli.output.as_deref())?;
        }
        Commands::Adql {
            query,
            maxrec,
            endpoint,
        } => {
            let table = archive.query_tap(&query, endpoint.query_type(), maxrec, cli.verbose)?;
            emit(&table, "result", &cli.format, cli.output.as_deref(), false)?;
        }
        Commands::Describe => {
            let client = archive.executor();
            println!("{}", client.describe());
            match client.availability() {
                Ok(true) => println!("  Available:       yes"),
                Ok(false) => println!("  Available:       no"),
                Err(e) => println!("  Available:       unknown ({})", e),
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("{},reqwest=warn,hyper=warn", default_level))
            .map_err(|e| anyhow::anyhow!("Invalid tracing filter: {}", e))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

fn parse_condition(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() && !value.trim().is_empty() => {
            Ok((column.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected COL=VALUE, got '{}'", s)),
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn emit_results(
    results: &[CatalogueResult],
    format: &OutputFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    if results.is_empty() {
        eprintln!("No catalogue matched the selection.");
        return Ok(());
    }
    let several = results.len() > 1;
    for result in results {
        if output.is_none() && matches!(format, OutputFormat::Table) {
            println!("# {}", result);
        }
        emit(&result.table, &result.table_name, format, output, several)?;
    }
    Ok(())
}

fn emit(
    table: &Table,
    name: &str,
    format: &OutputFormat,
    output: Option<&Path>,
    several: bool,
) -> anyhow::Result<()> {
    if let Some(path) = output {
        let path = if several {
            per_table_path(path, name)
        } else {
            path.to_path_buf()
        };
        table
            .write_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(());
    }

    match format {
        OutputFormat::Table => {
            if table.is_empty() {
                println!("No rows returned.");
            } else {
                println!("{}", table);
                println!("\nTotal rows: {}", table.len());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&to_json(table))?),
        OutputFormat::Csv => table.to_csv_writer(std::io::stdout())?,
    }
    Ok(())
}

/// `out.csv` + `KiDS_DR4` -> `out_KiDS_DR4.csv`
fn per_table_path(base: &Path, table_name: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "result".to_string());
    let extension = base
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    base.with_file_name(format!("{}_{}.{}", stem, table_name, extension))
}

fn to_json(table: &Table) -> serde_json::Value {
    let rows = table
        .rows()
        .map(|row| {
            let object = table
                .column_names()
                .into_iter()
                .zip(row.values())
                .map(|(name, value)| (name.to_string(), json_value(value)))
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(rows)
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
    }
}
