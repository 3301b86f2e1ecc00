use std::fs;
use std::io::Write as IoWrite;
use std::io::{self, BufRead};
use std::sync::Mutex;
use std::time::Instant;

use clap::Parser;
use colored::*;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use lineup_catalog::config::load_config;
use lineup_catalog::model::MergeStrategy;
use lineup_catalog::{CatalogStore, PgCatalog};
use lineup_merge::{find_duplicate_groups, merge_duplicate_groups, select_survivor};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "lineup-merge", about = "Merge duplicate artists in the lineup catalog")]
struct Args {
    /// Survivor selection strategy: smart, first, newest or oldest
    #[arg(long, default_value = "smart")]
    strategy: MergeStrategy,

    /// Only groups whose name starts with this prefix (case insensitive)
    #[arg(long)]
    only: Option<String>,

    /// Limit to first N groups (0 = no limit)
    #[arg(long, default_value = "0")]
    limit: usize,

    /// Show planned survivors without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok();
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    println!("{}", "Lineup Duplicate Merge".bright_cyan().bold());
    println!("{}", "======================".bright_black());
    println!("Strategy : {}", args.strategy.to_string().bright_white());
    if args.dry_run {
        println!("Mode     : {} (no changes will be made)", "DRY RUN".yellow().bold());
    }
    println!();

    let error_log = Mutex::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("errors.log")
            .expect("Cannot open errors.log"),
    );

    let config = load_config();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database. Is PostgreSQL running?");
    let store = PgCatalog::new(pool);

    println!("Scanning catalog for duplicate names...");
    let catalog = match store.read_artists().await {
        Ok(artists) => artists,
        Err(e) => {
            eprintln!("{} Failed to read artists: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    let mut groups = find_duplicate_groups(&catalog);
    if let Some(ref prefix) = args.only {
        let prefix = prefix.to_lowercase();
        groups.retain(|g| g.name.to_lowercase().starts_with(&prefix));
    }
    if args.limit > 0 {
        groups.truncate(args.limit);
    }

    if groups.is_empty() {
        println!("{} No duplicate artists found", "✓".green());
        return;
    }

    println!(
        "  {} Found {} duplicate group(s)",
        "→".bright_black(),
        groups.len().to_string().bright_white()
    );
    println!();

    for group in &groups {
        println!(
            "  {} {} ({} rows)",
            "→".bright_black(),
            group.name.bright_white(),
            group.count
        );
        let survivor = select_survivor(&group.artists, args.strategy, &Default::default());
        for artist in &group.artists {
            let marker = if artist.id == survivor.id {
                "keep ".green()
            } else {
                "merge".yellow()
            };
            println!(
                "      {} {} (created {})",
                marker,
                artist.id.bright_black(),
                artist.created_at.format("%Y-%m-%d")
            );
        }
    }
    println!();

    if args.dry_run {
        println!(
            "{} {} group(s) would be merged",
            "Dry run:".cyan().bold(),
            groups.len()
        );
        if args.strategy == MergeStrategy::Smart {
            println!(
                "{} smart tie-breaks on vote counts are resolved at merge time",
                "Note:".yellow()
            );
        }
        return;
    }

    if !args.yes
        && !confirm(&format!(
            "Merge {} group(s) with strategy '{}'?",
            groups.len(),
            args.strategy
        ))
    {
        println!("Aborted.");
        return;
    }

    let start = Instant::now();
    let outcome = merge_duplicate_groups(&store, &groups, args.strategy, |p| {
        println!(
            "{} {}",
            format!("[{}/{}]", p.completed, p.total).bright_blue().bold(),
            p.current.bright_cyan()
        );
    })
    .await;

    for err in &outcome.errors {
        if let Ok(mut f) = error_log.lock() {
            writeln!(f, "[MERGE] Group '{}': {}", err.group, err.message).ok();
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!();
    println!("{} {:.1}s", "Completed in:".white().bold(), elapsed.as_secs_f64());
    println!(
        "  {} {} group(s), {} duplicate row(s) removed",
        "Merged:".green(),
        outcome.completed - outcome.errors.len(),
        outcome.deleted
    );
    if !outcome.errors.is_empty() {
        println!("  {} {}", "Failed:".red(), outcome.errors.len());
        println!();
        println!("{}", "Failed Groups:".red().bold());
        for err in &outcome.errors {
            println!(
                "  {} {} - {}",
                "✗".red(),
                err.group.bright_white(),
                err.message.bright_black()
            );
        }
        println!();
        println!("{}: Check errors.log for details", "Note".yellow());
    }
}
