use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use locmap::api::AppState;
use locmap::geocoding::{CachedGeocoder, Geocoder, NominatimClient, PersistentCache};
use locmap::{
    LocationQuery, LocationResolver, LocmapConfig, Pipeline, RenderContext, Resolution, Scenario,
    Table, distance, map, table, telemetry, templates, web,
};

#[derive(Debug, Parser)]
#[command(name = "locmap", version)]
#[command(about = "Geocode location spreadsheets, plot them on a map and compute distances")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "LOCMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve a single location
    Resolve {
        #[arg(long)]
        country: String,
        #[arg(long)]
        postal: Option<String>,
        #[arg(long)]
        city: Option<String>,
    },
    /// Process a CSV file: export coordinates and render a map
    Run {
        /// standard, supply-chain, distance or volume
        #[arg(long)]
        scenario: Scenario,
        #[arg(long)]
        input: PathBuf,
        /// Where to write the export and the map (defaults to the input's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        dot_size: Option<u32>,
    },
    /// Great-circle distance between two coordinates
    Distance {
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        from_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,
    },
    /// Write the blank input templates as a zip archive
    Templates {
        #[arg(long, default_value = templates::BUNDLE_FILENAME)]
        output: PathBuf,
    },
    /// Start the web interface
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn build_geocoder(config: &LocmapConfig) -> Result<Arc<dyn Geocoder>> {
    let client = NominatimClient::new(&config.geocoder)?;
    if !config.cache.enabled {
        return Ok(Arc::new(client));
    }

    let cache = PersistentCache::open(&config.cache.location)
        .with_context(|| format!("Failed to open cache at {}", config.cache.location))?;
    let ttl = Duration::from_secs(u64::from(config.cache.ttl_hours) * 3600);
    Ok(Arc::new(CachedGeocoder::new(client, cache, ttl)))
}

fn build_resolver(config: &LocmapConfig) -> Result<LocationResolver> {
    Ok(LocationResolver::new(build_geocoder(config)?)
        .with_country_check(config.geocoder.country_check))
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:32.cyan/blue}] {pos}/{len} ({percent}%) eta {eta}",
    ) {
        progress.set_style(style.progress_chars("=> "));
    }
    progress
}

async fn resolve(
    config: &LocmapConfig,
    country: &str,
    postal: Option<&str>,
    city: Option<&str>,
) -> Result<()> {
    let query = LocationQuery::new(country, postal, city)?;
    let resolver = build_resolver(config)?;

    match resolver.resolve(&query).await {
        Resolution::Found(location) => {
            println!("{}: {}", query.describe(), location.format_coordinates());
            if let Some(postal) = &location.matched_postal_code {
                println!("  matched postal code: {postal}");
            }
            if let Some(city) = &location.matched_city {
                println!("  matched city: {city}");
            }
        }
        Resolution::NotFound => println!("{}: no match", query.describe()),
        Resolution::ServiceError { message } => {
            println!("{}: geocoding service error: {message}", query.describe());
        }
    }
    Ok(())
}

async fn run_batch(
    config: &LocmapConfig,
    scenario: Scenario,
    input: &Path,
    output_dir: Option<PathBuf>,
    dot_size: Option<u32>,
) -> Result<()> {
    let table = Table::from_path(input)?;
    let pipeline = Pipeline::new(build_resolver(config)?, config.distance.rounding);

    let progress = progress_bar(table.len());
    let output = pipeline.run(&table, scenario, &progress).await?;

    let output_dir = output_dir
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let input_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("export.csv");
    let export_path = output_dir.join(table::export_filename(
        input_name,
        chrono::Local::now().date_naive(),
    ));
    let csv = table::export_csv(&output.headers, &output.records, scenario)?;
    std::fs::write(&export_path, csv)
        .with_context(|| format!("Failed to write {}", export_path.display()))?;

    let ctx = RenderContext::default().with_dot_size(dot_size.unwrap_or(config.map.dot_size));
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("export");
    let map_path = output_dir.join(format!("{stem}_map.html"));
    let html = map::render_map(scenario, &output.records, &ctx)?;
    std::fs::write(&map_path, html)
        .with_context(|| format!("Failed to write {}", map_path.display()))?;

    let summary = &output.summary;
    println!("{scenario}: {} rows", summary.rows);
    println!("  resolved:        {}", summary.resolved);
    println!("  unresolved:      {}", summary.not_found + summary.service_errors);
    if summary.service_errors > 0 {
        println!("  service errors:  {}", summary.service_errors);
    }
    println!("  export: {}", export_path.display());
    println!("  map:    {}", map_path.display());
    Ok(())
}

fn check_coordinate(name: &str, value: f64, limit: f64) -> Result<()> {
    if !(-limit..=limit).contains(&value) {
        bail!("{name} must be between -{limit} and {limit}, got {value}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = LocmapConfig::load_from_path(cli.config.clone())?;
    telemetry::init_tracing(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Resolve {
            country,
            postal,
            city,
        } => resolve(&config, &country, postal.as_deref(), city.as_deref()).await,
        Commands::Run {
            scenario,
            input,
            output_dir,
            dot_size,
        } => run_batch(&config, scenario, &input, output_dir, dot_size).await,
        Commands::Distance {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
        } => {
            check_coordinate("--from-lat", from_lat, 90.0)?;
            check_coordinate("--to-lat", to_lat, 90.0)?;
            check_coordinate("--from-lon", from_lon, 180.0)?;
            check_coordinate("--to-lon", to_lon, 180.0)?;
            let km = distance::haversine_km([from_lat, from_lon], [to_lat, to_lon]);
            println!("{} km", config.distance.rounding.apply(km));
            Ok(())
        }
        Commands::Templates { output } => {
            std::fs::write(&output, templates::template_bundle()?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Templates written to {}", output.display());
            Ok(())
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.web.port = port;
            }
            let state = AppState {
                pipeline: Pipeline::new(build_resolver(&config)?, config.distance.rounding),
                render: RenderContext::default().with_dot_size(config.map.dot_size),
            };
            web::run(state, &config.web).await
        }
    }
}
