mod commands;
mod logging;
mod progress;

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use pkgsweep_core::{
    AppConfig, CleanupReason, Database, EngineConfig, OptimizationEngine, QuarantineEntry,
    QuarantineManager, RollbackReport, ScanResult, SymlinkReport,
};
use progress::CliReporter;
use tracing::{error, info};

struct Paths {
    db: PathBuf,
    store: PathBuf,
    quarantine: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match pkgsweep_core::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    let engine_config = merge_engine_config(&config, &args);
    let paths = resolve_paths(&config, &args);

    let outcome = match &args.command {
        Some(Commands::Plan { scan }) => run_plan(&engine_config, &paths, scan),
        Some(Commands::Optimize { scan, fast }) => {
            run_optimize(&engine_config, &paths, scan, *fast)
        }
        Some(Commands::Symlink { scan }) => run_symlink(&engine_config, &paths, scan),
        Some(Commands::Quarantine { targets, fast }) => run_quarantine(&paths, targets, *fast),
        Some(Commands::Rollback { id, latest }) => run_rollback(&paths, id.as_deref(), *latest),
        Some(Commands::Sweep) => run_sweep(&paths),
        Some(Commands::Stats) => run_stats(&paths),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", engine_config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = outcome {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn merge_engine_config(config: &AppConfig, args: &Cli) -> EngineConfig {
    let mut cfg = config.engine_config();
    if let Some(v) = args.preserve_days {
        cfg.preserve_days = v;
    }
    if let Some(v) = args.enable_ml {
        cfg.enable_ml = v;
    }
    if let Some(v) = args.enable_symlinking {
        cfg.enable_symlinking = v;
    }
    if let Some(v) = args.lru_max_packages {
        cfg.lru_max_packages = v;
    }
    if let Some(v) = args.lru_max_size_bytes {
        cfg.lru_max_size_bytes = v;
    }
    cfg
}

fn resolve_paths(config: &AppConfig, args: &Cli) -> Paths {
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| config.data_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".pkgsweep")
        });
    Paths {
        db: data_dir.join("index.db"),
        store: config
            .store_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("store")),
        quarantine: config
            .quarantine_root
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("quarantine")),
    }
}

fn open_database(paths: &Paths) -> Result<Arc<Database>> {
    let db = Database::open(&paths.db)
        .with_context(|| format!("could not open index at {}", paths.db.display()))?;
    Ok(Arc::new(db))
}

fn load_scan(path: &PathBuf) -> Result<ScanResult> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read scan snapshot {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("malformed scan snapshot {}", path.display()))
}

fn run_plan(config: &EngineConfig, paths: &Paths, scan_path: &PathBuf) -> Result<()> {
    let scan = load_scan(scan_path)?;
    let db = open_database(paths)?;
    let mut engine = OptimizationEngine::new(config.clone(), db, &paths.store)?;

    let plan = engine.plan_cleanup(&scan, &CliReporter::new())?;
    info!(
        "{} targets, {} bytes reclaimable, {} malformed records skipped",
        format!("{}", plan.items.len()).red(),
        format!("{}", plan.total_estimated_bytes).red(),
        format!("{}", plan.skipped).yellow(),
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn run_optimize(
    config: &EngineConfig,
    paths: &Paths,
    scan_path: &PathBuf,
    fast: bool,
) -> Result<()> {
    let scan = load_scan(scan_path)?;
    let db = open_database(paths)?;
    let mut engine = OptimizationEngine::new(config.clone(), Arc::clone(&db), &paths.store)?;

    let plan = engine.plan_cleanup(&scan, &CliReporter::new())?;
    let targets: Vec<PathBuf> = plan
        .items
        .iter()
        .filter(|i| i.reason != CleanupReason::DuplicateSymlinkCandidate)
        .map(|i| PathBuf::from(&i.target_path))
        .collect();

    let manager = QuarantineManager::new(&paths.quarantine, db)?;
    let results = manager.quarantine(&targets, fast);
    let quarantined = results.iter().filter(|r| r.is_ok()).count();
    let failed = results.len() - quarantined;

    info!(
        "{} quarantined, {} failed, {} bytes reclaimed",
        format!("{}", quarantined).green(),
        format!("{}", failed).red(),
        format!("{}", plan.total_estimated_bytes).green(),
    );
    println!("{}", serde_json::to_string_pretty(&plan)?);
    if failed > 0 {
        bail!("{} targets could not be quarantined", failed);
    }
    Ok(())
}

fn run_symlink(config: &EngineConfig, paths: &Paths, scan_path: &PathBuf) -> Result<()> {
    let scan = load_scan(scan_path)?;
    let db = open_database(paths)?;
    let mut config = config.clone();
    // the subcommand is the explicit opt-in
    config.enable_symlinking = true;
    let engine = OptimizationEngine::new(config, db, &paths.store)?;

    let linked = engine.execute_symlinking(&scan, &CliReporter::new())?;
    let report = SymlinkReport {
        status: "ok".into(),
        symlinked_count: linked,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_quarantine(paths: &Paths, targets: &[PathBuf], fast: bool) -> Result<()> {
    let db = open_database(paths)?;
    let manager = QuarantineManager::new(&paths.quarantine, db)?;

    let results = manager.quarantine(targets, fast);
    let mut entries: Vec<QuarantineEntry> = Vec::new();
    let mut failed = 0usize;
    for (target, result) in targets.iter().zip(&results) {
        match result {
            Ok(record) => {
                info!(
                    "{} {} -> {}",
                    "quarantined".green(),
                    target.display(),
                    record.id
                );
                entries.push(QuarantineEntry {
                    id: record.id.clone(),
                    original_path: record.original_path.clone(),
                    size_bytes: record.size_bytes,
                });
            }
            Err(err) => {
                error!("{} {}: {}", "failed".red(), target.display(), err);
                failed += 1;
            }
        }
    }
    println!("{}", serde_json::to_string_pretty(&entries)?);
    if failed > 0 {
        bail!("{} of {} targets failed", failed, targets.len());
    }
    Ok(())
}

fn run_rollback(paths: &Paths, id: Option<&str>, latest: bool) -> Result<()> {
    let db = open_database(paths)?;
    let manager = QuarantineManager::new(&paths.quarantine, db)?;

    let record = match (id, latest) {
        (Some(id), false) => manager.rollback(id)?,
        (None, true) => manager.rollback_latest()?,
        _ => bail!("pass exactly one of --id or --latest"),
    };

    info!(
        "{} {} -> {}",
        "restored".green(),
        record.id,
        record.original_path
    );
    let report = RollbackReport {
        status: "ok".into(),
        id: record.id,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_sweep(paths: &Paths) -> Result<()> {
    let db = open_database(paths)?;
    let manager = QuarantineManager::new(&paths.quarantine, db)?;

    let (removed, freed) = manager.sweep()?;
    info!(
        "{} entries removed, {} bytes freed",
        format!("{}", removed).green(),
        format!("{}", freed).green(),
    );
    Ok(())
}

fn run_stats(paths: &Paths) -> Result<()> {
    let db = open_database(paths)?;
    let manager = QuarantineManager::new(&paths.quarantine, db)?;

    let stats = manager.stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
