//! Virtual Try-On CLI
//!
//! Drives a scripted try-on session against a running backend.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tryon_core::{
    find_by_id, CatalogFilter, CatalogItem, Composer, Config, HttpBackend, ImagePayload,
    OutfitEvent, OutfitSession, RecommendationItem, TryOnBackend, CATEGORY_LABELS,
    GENDER_LABELS,
};

/// Virtual Try-On - Outfit Composer
///
/// Applies catalog garments one at a time onto a photo through a try-on
/// backend and writes the composited result.
#[derive(Parser, Debug)]
#[command(name = "tryon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: tryon.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Backend base URL, overriding the configuration
    #[arg(long, value_name = "URL", global = true)]
    backend_url: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog items
    Catalog {
        /// Only this category (upper_body, lower_body, shoes)
        #[arg(long)]
        category: Option<String>,

        /// Only this gender (women, men)
        #[arg(long, value_parser = parse_gender)]
        gender: Option<String>,
    },

    /// Compose an outfit from catalog items, in order
    Compose {
        /// Person photo
        #[arg(short, long, value_name = "FILE")]
        photo: PathBuf,

        /// Catalog item ids to try on, in order
        #[arg(short, long = "item", value_name = "ID", required = true)]
        items: Vec<String>,

        /// Where to write the composited image
        #[arg(short, long, value_name = "FILE", default_value = "outfit.png")]
        out: PathBuf,

        /// Skip the recommendation request after each garment
        #[arg(long)]
        no_recommend: bool,

        /// Print outfit events as JSON lines
        #[arg(long)]
        events: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref url) = args.backend_url {
        config.backend_url.clone_from(url);
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let backend = HttpBackend::from_config(&config)?;
    let composer = Composer::new(backend, &config);

    match args.command {
        Command::Catalog { category, gender } => {
            let filter = CatalogFilter { category, gender };
            list_catalog(&composer, &filter).await
        }
        Command::Compose {
            photo,
            items,
            out,
            no_recommend,
            events,
        } => {
            let composer = if no_recommend {
                composer.with_auto_recommend(false)
            } else {
                composer
            };
            let printer = events.then(|| spawn_event_printer(composer.subscribe()));
            let result = compose_outfit(&composer, &photo, &items, &out).await;
            if let Some(handle) = printer {
                handle.abort();
            }
            result
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

async fn list_catalog(
    composer: &Composer<HttpBackend>,
    filter: &CatalogFilter,
) -> anyhow::Result<()> {
    let items = composer.catalog(filter).await?;
    println!();
    if items.is_empty() {
        println!("No catalog items match");
        return Ok(());
    }

    for (category, label) in CATEGORY_LABELS {
        let in_category: Vec<&CatalogItem> =
            items.iter().filter(|item| item.category == category).collect();
        if in_category.is_empty() {
            continue;
        }
        println!("{label}:");
        for item in in_category {
            print_item(item);
        }
    }

    let other: Vec<&CatalogItem> = items
        .iter()
        .filter(|item| !CATEGORY_LABELS.iter().any(|(c, _)| item.category == *c))
        .collect();
    if !other.is_empty() {
        println!("Other:");
        for item in other {
            print_item(item);
        }
    }
    Ok(())
}

/// Applies each item in order, then writes the last composed result.
///
/// A failed garment stops the run, but whatever was composed before it is
/// still written to `out`.
async fn compose_outfit<B: TryOnBackend>(
    composer: &Composer<B>,
    photo: &Path,
    item_ids: &[String],
    out: &Path,
) -> anyhow::Result<()> {
    let image = ImagePayload::load(photo)?;
    println!();
    println!("Photo loaded: {} ({} bytes)", photo.display(), image.len());
    composer.set_base_image(image).await;

    let catalog = composer.catalog(&CatalogFilter::default()).await?;
    tracing::info!(count = catalog.len(), "Catalog loaded");

    let mut items = Vec::with_capacity(item_ids.len());
    for id in item_ids {
        let Some(item) = find_by_id(&catalog, id) else {
            anyhow::bail!(
                "Unknown catalog item '{id}'\n\nSuggestion: Run `tryon catalog` to list available ids"
            );
        };
        items.push(item);
    }

    let mut failure = None;
    for item in items {
        if composer.snapshot().await.is_category_worn(&item.category) {
            println!("Skipping {} ({}): category already worn", item.name, item.category);
            continue;
        }

        composer.select(item.clone()).await?;
        println!("Trying on {} ({})...", item.name, item.category);
        match composer.try_on().await {
            Ok(session) => {
                println!("  Now wearing {} item(s)", session.worn_items().len());
                print_recommendations(&composer.recommendations().await, &catalog);
            }
            Err(e) => {
                println!("  Failed: {e}");
                failure = Some(e);
                break;
            }
        }
    }

    let session = composer.snapshot().await;
    match session.current_image() {
        Some(result) => {
            std::fs::write(out, result.as_bytes())?;
            println!();
            print_summary(&session, out);
        }
        None if failure.is_none() => anyhow::bail!(
            "Nothing was composed\n\nSuggestion: Pass at least one --item that is not already worn"
        ),
        None => {}
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Accepts only the gender filters the catalog offers.
fn parse_gender(value: &str) -> Result<String, String> {
    if GENDER_LABELS.iter().any(|(gender, _)| *gender == value) {
        return Ok(value.to_string());
    }
    let known: Vec<String> = GENDER_LABELS
        .iter()
        .map(|(gender, label)| format!("{gender} ({label})"))
        .collect();
    Err(format!("unknown gender '{value}', expected one of: {}", known.join(", ")))
}

fn spawn_event_printer(mut receiver: broadcast::Receiver<OutfitEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => println!("{json}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Backend: {}", config.backend_url);
    println!("  Static path: {}", config.static_path);
    println!("  Composition timeout: {}s", config.request_timeout_secs);
    println!("  Recommendation timeout: {}s", config.recommendation_timeout_secs);
}

fn print_item(item: &CatalogItem) {
    let brand = if item.brand.is_empty() {
        String::new()
    } else {
        format!(" by {}", item.brand)
    };
    println!("  {:<12} {}{brand} - {}", item.id, item.name, item.color);
}

/// Prints a summary of the composed outfit.
fn print_summary(session: &OutfitSession, out: &Path) {
    println!("=== Outfit Summary ===");
    println!("Status: {}", session.status());
    for (i, item) in session.worn_items().iter().enumerate() {
        println!("  {}. {} ({})", i + 1, item.name, item.category);
    }
    println!("Result written to {}", out.display());
}

fn print_recommendations(items: &[RecommendationItem], catalog: &[CatalogItem]) {
    if items.is_empty() {
        return;
    }
    println!("  Recommended next:");
    for rec in items {
        let known = if find_by_id(catalog, &rec.id).is_some() {
            ""
        } else {
            " (not in catalog)"
        };
        println!("    {} {} [{}]{known}: {}", rec.id, rec.name, rec.category, rec.reason);
    }
}
