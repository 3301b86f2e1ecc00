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
use lineup_catalog::similarity::name_similarity;
use lineup_catalog::PgCatalog;
use lineup_import::{
    ConflictResolution, ImportPhase, ImportSession, ResolutionEngine, RowProgress,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "lineup-import",
    about = "Import a festival lineup (stages and sets CSV) into the catalog"
)]
struct Args {
    /// Sets CSV file (columns: artist_names, stage_name, name, time_start, time_end, description)
    #[arg()]
    sets: Option<String>,

    /// Stages CSV file (column: name)
    #[arg(long)]
    stages: Option<String>,

    /// Edition id the rows belong to
    #[arg(long)]
    edition: String,

    /// IANA timezone the CSV times are written in
    #[arg(long, default_value = "Europe/Amsterdam")]
    timezone: String,

    /// Attribute created sets to this user id
    #[arg(long)]
    user: Option<String>,

    /// Resolve all remaining conflicts at once: skip, new or merge
    #[arg(long)]
    resolve: Option<String>,

    /// Parse and detect only, show what would happen
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long)]
    yes: bool,
}

fn read_line() -> String {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok();
    line.trim().to_string()
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    io::stdout().flush().ok();
    matches!(read_line().to_lowercase().as_str(), "y" | "yes")
}

// ---------------------------------------------------------------------------
// Interactive conflict resolution
// ---------------------------------------------------------------------------

fn describe(resolution: &ConflictResolution) -> String {
    match resolution {
        ConflictResolution::Skip => "skip".yellow().to_string(),
        ConflictResolution::ImportNew { rename: None } => "import as new".green().to_string(),
        ConflictResolution::ImportNew { rename: Some(name) } => {
            format!("{} '{}'", "import as new".green(), name.bright_white())
        }
        ConflictResolution::Merge {
            target_artist_id, ..
        } => format!("{} {}", "merge into".cyan(), target_artist_id.bright_black()),
    }
}

/// Walk the operator through every conflict. Returns false when the
/// operator quit the session.
fn resolve_interactively(engine: &mut ResolutionEngine) -> bool {
    let total = engine.total();

    for index in 0..total {
        let (candidate_name, matches): (String, Vec<(String, String)>) = {
            let conflict = &engine.conflicts()[index];
            (
                conflict.candidate.name.clone(),
                conflict
                    .matches
                    .iter()
                    .map(|m| (m.id.clone(), m.name.clone()))
                    .collect(),
            )
        };

        println!();
        println!(
            "{} {}",
            format!("[{}/{}]", index + 1, total).bright_blue().bold(),
            candidate_name.bright_cyan().bold()
        );
        for (i, (id, name)) in matches.iter().enumerate() {
            println!(
                "    {} {} ({}, {:.0}% similar)",
                format!("{})", i + 1).bright_white(),
                name.bright_white(),
                id.bright_black(),
                name_similarity(&candidate_name, name) * 100.0
            );
        }
        if let Some(current) = engine.resolution(index) {
            println!("    default: {}", describe(current));
        }

        loop {
            print!(
                "  {} ",
                "[1-9 merge / n new / r rename / s skip / M merge all / q quit]".bright_black()
            );
            io::stdout().flush().ok();
            let input = read_line();

            let result = match input.as_str() {
                "" => {
                    if engine.resolution(index).is_some() {
                        break; // keep the default
                    }
                    println!("  {} No default for this conflict, pick an option", "✗".yellow());
                    continue;
                }
                "n" => engine.update_resolution(index, ConflictResolution::ImportNew { rename: None }),
                "r" => {
                    print!("  New name: ");
                    io::stdout().flush().ok();
                    let name = read_line();
                    if name.is_empty() {
                        println!("  {} Name cannot be empty", "✗".yellow());
                        continue;
                    }
                    engine.update_resolution(
                        index,
                        ConflictResolution::ImportNew { rename: Some(name) },
                    )
                }
                "s" => engine.update_resolution(index, ConflictResolution::Skip),
                "M" => {
                    let applied = engine.apply_bulk_merge_first_match(MergeStrategy::First);
                    println!(
                        "  {} Merged {} remaining conflict(s) with their first match",
                        "✓".green(),
                        applied
                    );
                    return true;
                }
                "q" => return false,
                number => match number.parse::<usize>() {
                    Ok(i) if i >= 1 && i <= matches.len() => engine.update_resolution(
                        index,
                        ConflictResolution::Merge {
                            target_artist_id: matches[i - 1].0.clone(),
                            strategy: None,
                        },
                    ),
                    _ => {
                        println!("  {} Not an option", "✗".yellow());
                        continue;
                    }
                },
            };

            match result {
                Ok(()) => break,
                Err(e) => println!("  {} {}", "✗".red(), e),
            }
        }
    }

    true
}

fn apply_bulk_flag(engine: &mut ResolutionEngine, mode: &str) -> Result<(), String> {
    let applied = match mode {
        "skip" => engine.apply_bulk(ConflictResolution::Skip),
        "new" => engine.apply_bulk(ConflictResolution::ImportNew { rename: None }),
        "merge" => engine.apply_bulk_merge_first_match(MergeStrategy::First),
        other => {
            return Err(format!(
                "unknown --resolve mode '{}' (expected skip, new or merge)",
                other
            ))
        }
    };
    println!(
        "  {} Applied '{}' to {} unresolved conflict(s)",
        "✓".green(),
        mode,
        applied
    );
    Ok(())
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

    println!("{}", "Lineup Import".bright_cyan().bold());
    println!("{}", "=============".bright_black());
    println!("Edition  : {}", args.edition.bright_white());
    println!("Timezone : {}", args.timezone.bright_white());
    if args.dry_run {
        println!("Mode     : {} (no changes will be made)", "DRY RUN".yellow().bold());
    }
    println!();

    if args.sets.is_none() && args.stages.is_none() {
        eprintln!("{}: nothing to import, pass a sets file and/or --stages", "Error".red().bold());
        std::process::exit(1);
    }

    let stages_text = args.stages.as_ref().map(|path| {
        fs::read_to_string(path).unwrap_or_else(|e| panic!("Cannot read {}: {}", path, e))
    });
    let sets_text = args.sets.as_ref().map(|path| {
        fs::read_to_string(path).unwrap_or_else(|e| panic!("Cannot read {}: {}", path, e))
    });

    let error_log = Mutex::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("errors.log")
            .expect("Cannot open errors.log"),
    );

    let config = load_config();
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database. Is PostgreSQL running?");
    let mut store = PgCatalog::new(pool);
    if let Some(ref user) = args.user {
        store = store.with_creator(user.clone());
    }

    let mut session = ImportSession::new(args.edition.clone(), args.timezone.clone());
    session.load(stages_text.as_deref(), sets_text.as_deref());
    println!(
        "Parsed   : {} stage row(s), {} set row(s)",
        session.stage_rows().len().to_string().bright_white(),
        session.set_rows().len().to_string().bright_white()
    );

    println!("Checking candidates against the catalog...");
    if let Err(e) = session.detect(&store).await {
        eprintln!("{} Conflict detection failed: {}", "✗".red(), e);
        std::process::exit(1);
    }

    let conflict_count = session.engine().map(|e| e.total()).unwrap_or(0);
    println!(
        "  {} {} conflict(s), {} new artist(s)",
        "→".bright_black(),
        conflict_count.to_string().bright_white(),
        session.clean_candidates().len().to_string().bright_white()
    );

    if args.dry_run {
        if let Some(engine) = session.engine() {
            for (_, conflict, resolution) in engine.iter() {
                let matches: Vec<&str> =
                    conflict.matches.iter().map(|m| m.name.as_str()).collect();
                println!(
                    "  {} {} ~ [{}]{}",
                    "?".yellow(),
                    conflict.candidate.name.bright_white(),
                    matches.join(", "),
                    resolution
                        .map(|r| format!(" → {}", describe(r)))
                        .unwrap_or_default()
                );
            }
        }
        for candidate in session.clean_candidates() {
            println!("  {} {}", "+".green(), candidate.name.bright_white());
        }
        println!();
        println!("{} nothing was written", "Dry run:".cyan().bold());
        return;
    }

    if session.phase() == ImportPhase::AwaitingResolution {
        let engine = session.engine_mut().expect("conflicts imply an engine");
        let proceed = match &args.resolve {
            Some(mode) => match apply_bulk_flag(engine, mode) {
                Ok(()) => true,
                Err(e) => {
                    eprintln!("{}: {}", "Error".red().bold(), e);
                    std::process::exit(1);
                }
            },
            None => resolve_interactively(engine),
        };

        if !proceed {
            session.cancel().expect("still awaiting resolution");
            println!("Cancelled, nothing was written.");
            return;
        }
    }

    if !args.yes && !confirm("Start the import?") {
        if session.cancel().is_ok() {
            println!("Cancelled, nothing was written.");
        } else {
            println!("Aborted.");
        }
        return;
    }

    println!();
    let start = Instant::now();
    let report = match session
        .commit(&store, |p: &RowProgress| {
            let marker = if p.ok { "✓".green() } else { "✗".red() };
            println!(
                "{} {} {}",
                format!("[{}/{}]", p.completed, p.total).bright_blue().bold(),
                marker,
                p.current.bright_white()
            );
        })
        .await
    {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Import aborted: {}", "✗".red().bold(), e);
            std::process::exit(1);
        }
    };

    for err in &report.errors {
        if let Ok(mut f) = error_log.lock() {
            writeln!(f, "[IMPORT] Row {}: {}", err.row, err.message).ok();
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!();
    println!("{} {:.1}s", "Completed in:".white().bold(), elapsed.as_secs_f64());
    println!("  {} {}", "Imported:".green(), report.inserted);
    if !report.errors.is_empty() {
        println!("  {} {}", "Errors:".red(), report.errors.len());
    }
    println!("  {}", report.message.bright_black());

    if !report.errors.is_empty() {
        println!();
        println!("{}", "Row Errors:".red().bold());
        for err in &report.errors {
            println!(
                "  {} row {} - {}",
                "✗".red(),
                err.row.to_string().bright_white(),
                err.message.bright_black()
            );
        }
        println!();
        println!("{}: Check errors.log for details", "Note".yellow());
    }

    if !report.success {
        std::process::exit(1);
    }
}
