//! Hotel-Harvest main entry point
//!
//! This is the command-line interface for the Hotel-Harvest scraper. Each
//! invocation runs one stage; stages are meant to run as separate processes
//! against the same database.

use clap::{Parser, ValueEnum};
use hotel_harvest::config::{load_config_with_hash, Config};
use hotel_harvest::crawler::{run_stage, WorkSelector};
use hotel_harvest::logging;
use hotel_harvest::output::{load_statistics, print_run_report, print_statistics};
use hotel_harvest::storage::open_storage;
use hotel_harvest::ResourceClass;
use std::path::{Path, PathBuf};

/// Hotel-Harvest: a resumable hotel listing, detail, and review scraper
///
/// Each stage selects its work from flags persisted by earlier stages, so an
/// interrupted run simply resumes where the database says it left off.
#[derive(Parser, Debug)]
#[command(name = "hotel-harvest")]
#[command(version)]
#[command(about = "A resumable hotel listing, detail, and review scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Resource class to process
    #[arg(long, value_enum, required_unless_present = "stats")]
    stage: Option<Stage>,

    /// Log to the console and use the scratch database
    #[arg(long)]
    test: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would run without loading any page
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Stage {
    Listing,
    Hotels,
    Reviews,
}

impl From<Stage> for ResourceClass {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Listing => ResourceClass::Listing,
            Stage::Hotels => ResourceClass::Hotel,
            Stage::Reviews => ResourceClass::Review,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let class = cli.stage.map(ResourceClass::from);

    let (config, config_hash) = load_config_with_hash(&cli.config).map_err(|e| {
        eprintln!("Failed to load configuration from {}: {}", cli.config.display(), e);
        e
    })?;

    let one_shot = cli.stats || cli.dry_run;
    let _guard = if cli.test || one_shot {
        logging::init_console(cli.verbose, cli.quiet);
        None
    } else {
        Some(logging::init_file(
            Path::new(&config.output.log_directory),
            class,
            cli.verbose,
            cli.quiet,
        )?)
    };

    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    match class {
        _ if cli.stats => handle_stats(&config, cli.test)?,
        Some(class) if cli.dry_run => handle_dry_run(&config, class, cli.test)?,
        Some(class) => handle_run(config, &config_hash, class, cli.test).await?,
        None => return Err("--stage is required unless --stats is given".into()),
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config, test_mode: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.database_path(test_mode);
    println!("Database: {}\n", path);

    let storage = open_storage(Path::new(path), config.lock_timeout())?;
    let stats = load_statistics(&storage, &config.crawler)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows what would run
fn handle_dry_run(
    config: &Config,
    class: ResourceClass,
    test_mode: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Hotel-Harvest Dry Run ===\n");

    println!("Stage: {}", class);
    println!("Database: {}", config.database_path(test_mode));
    if test_mode {
        println!("Logging: console");
    } else {
        println!("Logging: {}", config.output.log_directory);
    }

    println!("\nCrawler:");
    println!("  Load attempts: {}", config.crawler.max_load_attempts);
    println!("  Next-page attempts: {}", config.crawler.next_page_attempts);
    println!(
        "  Delay: {}-{}ms",
        config.crawler.min_delay_ms, config.crawler.max_delay_ms
    );

    let schema = match class {
        ResourceClass::Listing => {
            println!("  Listing retry budget: {}", config.crawler.listing_retry_budget);
            println!(
                "  First page: {}",
                config.site.listing_url(config.crawler.start_page)
            );
            if let Some(max) = config.crawler.max_pages {
                println!("  Max pages: {}", max);
            }
            &config.schema.listing
        }
        ResourceClass::Hotel => &config.schema.hotel,
        ResourceClass::Review => {
            println!(
                "  Reconciliation tolerance: {}",
                config.crawler.reconciliation_tolerance
            );
            &config.schema.review
        }
    };

    println!("\nSchema:");
    println!("  Marker: {}", schema.marker);
    if let Some(item) = &schema.item {
        println!("  Item: {}", item);
    }
    let fields: Vec<&str> = schema
        .fields
        .keys()
        .chain(schema.item_fields.keys())
        .map(String::as_str)
        .collect();
    println!("  Fields: {}", fields.join(", "));

    let path = Path::new(config.database_path(test_mode));
    if class != ResourceClass::Listing && path.exists() {
        let storage = open_storage(path, config.lock_timeout())?;
        let pending = WorkSelector::from_config(&config.crawler).pending(&storage, class)?;
        println!("\n✓ {} hotels eligible for this stage", pending);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the main run
async fn handle_run(
    config: Config,
    config_hash: &str,
    class: ResourceClass,
    test_mode: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match run_stage(config, config_hash, class, test_mode).await {
        Ok(report) => {
            print_run_report(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{} stage failed: {}", class, e);
            Err(e.into())
        }
    }
}
