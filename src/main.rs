use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use feedwarden::session::{render_invalid_table, Session};
use feedwarden::{Config, FeedManager, LoadReport};

#[derive(Parser, Debug)]
#[command(
    name = "feedwarden",
    version,
    about = "Validate, deduplicate, classify and prune an OPML feed list"
)]
struct Args {
    /// OPML document to manage
    #[arg(value_name = "FILE", default_value = "feeds.opml")]
    document: PathBuf,

    /// Config file (default: ~/.config/feedwarden/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Load, deduplicate, classify and save without starting a session
    #[arg(long)]
    check: bool,

    /// Never write the managed document (archives are still written)
    #[arg(long)]
    dry_run: bool,

    /// Print the load report as JSON (with --check)
    #[arg(long)]
    json: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => match Config::default_path() {
            Some(path) => path,
            None => {
                tracing::debug!("HOME not set, using default configuration");
                return Ok(Config::default());
            }
        },
    };
    Config::load(&path).with_context(|| format!("Failed to load config '{}'", path.display()))
}

fn print_report(report: &LoadReport, args: &Args, manager: &FeedManager) -> Result<()> {
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("Failed to serialize load report")?
        );
        return Ok(());
    }

    println!(
        "Loaded {} valid feeds from {}",
        report.valid,
        args.document.display()
    );
    if !report.invalid.is_empty() {
        println!("\nInvalid feeds found:");
        print!("{}", render_invalid_table(&report.invalid));
        println!(
            "\nInvalid feeds have been saved to '{}'",
            manager.config().invalid_archive.display()
        );
    }
    if report.duplicates_removed > 0 {
        println!("Removed {} duplicate feeds", report.duplicates_removed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let mut manager =
        FeedManager::new(config.manager()).context("Failed to create feed manager")?;

    // Dropping the load future cancels every in-flight validation
    let report = tokio::select! {
        result = manager.load_document(&args.document) => result?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, nothing was saved.");
            std::process::exit(130);
        }
    };
    print_report(&report, &args, &manager)?;

    if config.classify_on_load {
        let classified = manager.classify_unknown().await;
        if !args.json && classified > 0 {
            println!("Classified {} feeds", classified);
        }
    }

    if args.check {
        if args.dry_run {
            tracing::info!(path = %args.document.display(), "Dry run, not saving");
        } else {
            manager
                .save(&args.document)
                .with_context(|| format!("Failed to save '{}'", args.document.display()))?;
            if !args.json {
                println!("Saved {} feeds to {}", manager.len(), args.document.display());
            }
        }
        return Ok(());
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    Session::new(&mut manager, args.document.clone(), args.dry_run)
        .run(stdin, &mut stdout)
        .await?;

    println!("Goodbye!");
    Ok(())
}
