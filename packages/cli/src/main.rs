#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for the run club map.
//!
//! Runs the sheet pipeline offline, inspects a published collection the
//! way the map would render it, and hosts the API locally.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use runclub_map_cache::{Cache, CacheOptions, FileStore};
use runclub_map_client::{DataLoader, FilterState, HttpFetcher, filter::filter};
use runclub_map_club_models::{FeatureCollection, Language, SchemaVersion, Weekday};
use runclub_map_server::{AppState, ServerConfig, run_server};
use runclub_map_sheet::{
    RawRow, config::SheetConfig, collection::build_with_report, csv_source::CsvRowSource,
    default_ranges, fetch_rows, google::GoogleSheetsClient,
};
use runclub_map_spatial::{
    ClusterEngine, ClusterNode, GeoBounds, LatLng, Viewport, fit_bounds, icon::ImageFailures,
    initial_view,
};

use settings::Settings;

#[derive(Parser)]
#[command(name = "runclub_map_cli", about = "Run club map pipeline and engine tools")]
struct Cli {
    /// TOML file with `[cluster]`, `[fit]` and `[loader]` tunables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch club rows from the configured spreadsheet and write `GeoJSON`
    Fetch {
        /// Column layout (`legacy` or `current`), overriding `SHEET_SCHEMA`
        #[arg(long)]
        schema: Option<SchemaVersion>,

        /// Output file (prints to stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Convert a CSV export of the sheet to `GeoJSON`
    Convert {
        /// CSV file with a header row
        csv: PathBuf,

        /// Column layout (`legacy` or `current`)
        #[arg(long, default_value_t = SchemaVersion::Current)]
        schema: SchemaVersion,

        /// Output file (prints to stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the initial map view for a collection
    Bounds {
        /// `GeoJSON` feature collection
        geojson: PathBuf,

        /// Map width in pixels, for the fitted view
        #[arg(long, default_value_t = 1024.0)]
        width: f64,

        /// Map height in pixels, for the fitted view
        #[arg(long, default_value_t = 768.0)]
        height: f64,
    },

    /// Print the markers a viewport would show
    Clusters {
        /// `GeoJSON` feature collection
        geojson: PathBuf,

        /// Zoom level
        #[arg(long)]
        zoom: u8,

        /// Viewport center latitude
        #[arg(long)]
        lat: f64,

        /// Viewport center longitude
        #[arg(long)]
        lon: f64,

        /// Map width in pixels
        #[arg(long, default_value_t = 1024.0)]
        width: f64,

        /// Map height in pixels
        #[arg(long, default_value_t = 768.0)]
        height: f64,

        /// Only clubs whose city contains this
        #[arg(long)]
        city: Option<String>,

        /// Only clubs running on this day
        #[arg(long)]
        day: Option<String>,

        /// Only clubs whose name, city or description contains this
        #[arg(long)]
        search: Option<String>,

        /// Language used for text matching
        #[arg(long, default_value_t = Language::Primary)]
        language: Language,
    },

    /// Load the published collection through the client cache
    Load {
        /// Directory holding cache entries
        #[arg(long, default_value = ".runclub-cache")]
        cache_dir: PathBuf,

        /// Skip the cache and fetch from the network
        #[arg(long)]
        refresh: bool,

        /// Drop expired entries first
        #[arg(long)]
        clear_expired: bool,
    },

    /// Run the HTTP API
    Serve {
        /// Serve rows from a CSV export instead of the spreadsheet
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Column layout of the CSV export
        #[arg(long, default_value_t = SchemaVersion::Current)]
        schema: SchemaVersion,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch { schema, output } => {
            let mut config = SheetConfig::from_env()?;
            if let Some(schema) = schema {
                config.schema = schema;
            }
            let schema = config.schema;
            let ranges = config.ranges.clone();
            let client = GoogleSheetsClient::new(config)?;
            let fetched = fetch_rows(&client, &ranges).await?;
            log::info!("Read {} rows from {}", fetched.rows.len(), fetched.range);
            write_collection(&fetched.rows, schema, output.as_deref())?;
        }
        Commands::Convert {
            csv,
            schema,
            output,
        } => {
            let source = CsvRowSource::new(csv);
            let fetched = fetch_rows(&source, &default_ranges()).await?;
            write_collection(&fetched.rows, schema, output.as_deref())?;
        }
        Commands::Bounds {
            geojson,
            width,
            height,
        } => {
            let collection = read_collection(&geojson)?;
            let view = initial_view(&collection.features);
            println!(
                "Initial view: center {:.6}, {:.6} zoom {}",
                view.center.lat, view.center.lng, view.zoom
            );
            if let Some(bounds) = GeoBounds::of_features(&collection.features) {
                let fitted = fit_bounds(&bounds, width, height, settings.fit);
                println!(
                    "Fitted to {width}x{height}: center {:.6}, {:.6} zoom {}",
                    fitted.center.lat, fitted.center.lng, fitted.zoom
                );
            }
        }
        Commands::Clusters {
            geojson,
            zoom,
            lat,
            lon,
            width,
            height,
            city,
            day,
            search,
            language,
        } => {
            let collection = read_collection(&geojson)?;
            let state = filter_state(city, day.as_deref(), search)?;
            let features = filter(&collection.features, &state, language);
            log::info!(
                "{} of {} clubs match the filters",
                features.len(),
                collection.len()
            );

            let engine = ClusterEngine::new(settings.cluster);
            let viewport = Viewport::new(LatLng::new(lat, lon), zoom, width, height);
            let plan = engine.render(&features, &viewport, &ImageFailures::new());

            println!("{} markers at zoom {zoom}", plan.len());
            for rendered in plan.nodes.values() {
                println!("{}", describe_node(&rendered.node));
            }
        }
        Commands::Load {
            cache_dir,
            refresh,
            clear_expired,
        } => {
            let store = FileStore::open(cache_dir)?;
            let cache = Cache::new(Arc::new(store));
            if clear_expired {
                let removed = cache.clear_expired(CacheOptions::default().ttl_ms);
                println!("Removed {removed} expired entries");
            }

            let fetcher = HttpFetcher::new(&settings.loader)?;
            log::info!("Loading from {}", fetcher.url());
            let loader = DataLoader::new(Arc::new(fetcher), cache, settings.loader.cache.clone());
            let loaded = if refresh {
                loader.refresh().await?
            } else {
                loader.load().await?
            };

            let status = loader.cache_status();
            println!(
                "{} clubs ({})",
                loaded.collection.len(),
                if loaded.from_cache { "cache" } else { "network" }
            );
            println!(
                "Cache: {} items, {} bytes, age {}",
                status.total_items,
                status.total_bytes,
                status
                    .age_ms
                    .map_or_else(|| "n/a".to_string(), |age| format!("{}s", age / 1000)),
            );
        }
        Commands::Serve { csv, schema } => {
            let config = ServerConfig::from_env()?;
            let state = match csv {
                Some(path) => {
                    log::info!("Serving rows from {}", path.display());
                    AppState {
                        source: Arc::new(CsvRowSource::new(path)),
                        ranges: default_ranges(),
                        schema,
                    }
                }
                None => AppState::from_env()?,
            };
            tokio::task::spawn_blocking(move || {
                actix_web::rt::System::new().block_on(run_server(config, state))
            })
            .await??;
        }
    }

    Ok(())
}

fn read_collection(path: &Path) -> Result<FeatureCollection, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(runclub_map_client::loader::parse_collection(&text)?)
}

fn write_collection(
    rows: &[RawRow],
    schema: SchemaVersion,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = build_with_report(rows, schema);
    log::info!(
        "Built {} features from {} rows ({} rejected)",
        report.collection.len(),
        rows.len(),
        report.rejected.len()
    );

    let json = serde_json::to_string_pretty(&report.collection)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Wrote {} clubs to {}", report.collection.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn filter_state(
    city: Option<String>,
    day: Option<&str>,
    search: Option<String>,
) -> Result<FilterState, Box<dyn std::error::Error>> {
    let day = match day {
        Some(token) => {
            Some(Weekday::from_token(token).ok_or_else(|| format!("Unknown day: {token}"))?)
        }
        None => None,
    };
    Ok(FilterState {
        city: city.unwrap_or_default(),
        day,
        search_text: search.unwrap_or_default(),
    })
}

fn describe_node(node: &ClusterNode) -> String {
    let position = node.position();
    match node {
        ClusterNode::Leaf { id, .. } => {
            format!("  club     {:.6}, {:.6}  {id}", position.lat, position.lng)
        }
        ClusterNode::Cluster { members, .. } => format!(
            "  cluster  {:.6}, {:.6}  {} clubs",
            position.lat,
            position.lng,
            members.len()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_flag_accepts_localized_tokens() {
        let state = filter_state(Some("Paris".to_string()), Some("mardi"), None).unwrap();
        assert_eq!(state.city, "Paris");
        assert_eq!(state.day, Some(Weekday::Tuesday));
        assert!(state.search_text.is_empty());

        assert!(filter_state(None, Some("someday"), None).is_err());
        assert!(filter_state(None, None, None).unwrap().is_empty());
    }

    #[test]
    fn cli_parses_schema_flags() {
        let cli = Cli::parse_from(["runclub_map_cli", "convert", "clubs.csv", "--schema", "legacy"]);
        let Commands::Convert { schema, output, .. } = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(schema, SchemaVersion::Legacy);
        assert!(output.is_none());

        let cli = Cli::parse_from(["runclub_map_cli", "fetch"]);
        assert!(matches!(cli.command, Commands::Fetch { schema: None, .. }));
        assert!(Cli::try_parse_from(["runclub_map_cli", "fetch", "--schema", "v3"]).is_err());
    }

    #[test]
    fn cli_parses_cluster_flags() {
        let cli = Cli::parse_from([
            "runclub_map_cli",
            "clusters",
            "clubs.geojson",
            "--zoom",
            "12",
            "--lat",
            "45.76",
            "--lon",
            "4.83",
            "--language",
            "secondary",
        ]);
        let Commands::Clusters {
            zoom,
            width,
            language,
            ..
        } = cli.command
        else {
            panic!("expected clusters");
        };
        assert_eq!(zoom, 12);
        assert!((width - 1024.0).abs() < f64::EPSILON);
        assert_eq!(language, Language::Secondary);
    }
}
