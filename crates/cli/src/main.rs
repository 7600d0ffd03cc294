//! geocache command-line entry point.
//!
//! Operator tool for a geocache deployment: provisions the collections and
//! inspects, loads or removes datasets and service registrations. Results are
//! printed as JSON on stdout; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use geocache_client::ElasticClient;
use geocache_core::query::GeometryPolicy;
use geocache_core::{AppConfig, GeoCache, QueryOptions};

mod commands;

#[derive(Parser)]
#[command(name = "geocache")]
#[command(about = "Geospatial feature cache over Elasticsearch", long_about = None)]
struct Cli {
    /// Elasticsearch base URL (overrides GEOCACHE_ES_URL)
    #[arg(long, global = true)]
    es_url: Option<String>,

    /// Index name prefix (overrides GEOCACHE_INDEX_NAME)
    #[arg(long, global = true)]
    index: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the collections and their mappings
    Bootstrap,
    /// Load a GeoJSON feature collection as one layer of a dataset
    Insert {
        /// Dataset key
        #[arg(long)]
        key: String,
        /// Layer index
        #[arg(long, default_value = "0")]
        layer: u32,
        /// Path of the GeoJSON file
        #[arg(long)]
        file: std::path::PathBuf,
    },
    /// Print the features of a dataset (or `all`)
    Select {
        #[arg(long)]
        key: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the number of matching features
    Count {
        #[arg(long)]
        key: String,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Print the info record of a table
    Info {
        /// Table name, `<key>_<layer>`
        #[arg(long)]
        table: String,
    },
    /// Delete a table's info record and features
    Remove {
        #[arg(long)]
        table: String,
    },
    /// Print per-geohash feature counts
    Agg {
        #[arg(long)]
        key: String,
        /// Maximum number of cells (default: configured limit)
        #[arg(long)]
        max_cells: Option<usize>,
        /// Precision to start the search from (3-9)
        #[arg(long)]
        precision: Option<u8>,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Manage service registrations
    #[command(subcommand)]
    Services(ServiceCommand),
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Register a service instance
    Register {
        #[arg(long = "type")]
        service_type: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        host: String,
    },
    /// Count instances of a service type
    Count {
        #[arg(long = "type")]
        service_type: String,
    },
    /// Remove a service instance
    Remove {
        #[arg(long = "type")]
        service_type: String,
        #[arg(long)]
        id: String,
    },
    /// List instances of a service type, or fetch one by id
    Get {
        #[arg(long = "type")]
        service_type: String,
        #[arg(long)]
        id: Option<String>,
    },
}

/// Query options shared by select, count and agg.
#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Layer index
    #[arg(long)]
    layer: Option<u32>,
    /// Envelope JSON or `xmin,ymin,xmax,ymax`; polygon rings with --geometry-type polygon
    #[arg(long, allow_hyphen_values = true)]
    geometry: Option<String>,
    #[arg(long)]
    geometry_type: Option<String>,
    /// Type facet narrowing the `all` key
    #[arg(long = "type")]
    type_facet: Option<String>,
    /// Maximum number of features
    #[arg(long)]
    limit: Option<usize>,
    /// Report `exceeds_limit` instead of features when over the configured limit
    #[arg(long)]
    enforce_limit: bool,
    /// Read datasets even while they are processing
    #[arg(long)]
    bypass_processing: bool,
    /// Run unfiltered when the geometry is unusable instead of failing
    #[arg(long)]
    ignore_bad_geometry: bool,
}

impl From<QueryArgs> for QueryOptions {
    fn from(args: QueryArgs) -> Self {
        QueryOptions {
            layer: args.layer,
            geometry: args.geometry.map(|g| g.as_str().into()),
            geometry_type: args.geometry_type,
            type_facet: args.type_facet,
            limit: args.limit,
            enforce_limit: args.enforce_limit,
            bypass_processing: args.bypass_processing,
            geometry_policy: if args.ignore_bad_geometry { GeometryPolicy::Ignore } else { GeometryPolicy::Reject },
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load().context("failed to load configuration")?;
    if let Some(url) = &cli.es_url {
        config.es_url = url.clone();
    }
    if let Some(index) = &cli.index {
        config.index_name = index.clone();
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::debug!(es_url = %config.es_url, index = %config.index_name, "starting geocache");

    let client = ElasticClient::from_config(&config).context("failed to create Elasticsearch client")?;
    let cache = GeoCache::new(client, config.cache_config());

    let output = match cli.command {
        Command::Bootstrap => commands::datasets::bootstrap_impl(&cache).await,
        Command::Insert { key, layer, file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
            commands::datasets::insert_impl(&cache, &key, layer, &text).await?
        }
        Command::Select { key, query } => commands::datasets::select_impl(&cache, &key, &query.into()).await?,
        Command::Count { key, query } => commands::datasets::count_impl(&cache, &key, &query.into()).await?,
        Command::Info { table } => commands::datasets::info_impl(&cache, &table).await?,
        Command::Remove { table } => commands::datasets::remove_impl(&cache, &table).await?,
        Command::Agg { key, max_cells, precision, query } => {
            let max_cells = max_cells.unwrap_or(config.limit);
            commands::agg::agg_impl(&cache, &key, max_cells, precision, &query.into()).await?
        }
        Command::Services(command) => match command {
            ServiceCommand::Register { service_type, id, host } => {
                commands::services::register_impl(&cache, &service_type, &id, &host).await?
            }
            ServiceCommand::Count { service_type } => commands::services::count_impl(&cache, &service_type).await?,
            ServiceCommand::Remove { service_type, id } => {
                commands::services::remove_impl(&cache, &service_type, &id).await?
            }
            ServiceCommand::Get { service_type, id } => {
                commands::services::get_impl(&cache, &service_type, id.as_deref()).await?
            }
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
