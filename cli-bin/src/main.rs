//! mediacat CLI entry-point
//!
//! All heavy lifting lives in the `libmediacat` crate; this file handles
//! argument parsing, logging, Ctrl-C wiring and output formatting.

mod cli; // sub-command definitions and argument structs

use libmediacat::{config, logging, Catalog, CancelToken, FfmpegProber, LogProgress, SyncControl};

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

use cli::{Cli, Commands};

fn main() -> Result<()> {
    /* ── CLI parsing & logging ────────────────────────────────── */
    let args = Cli::parse();
    let level = if args.verbose {
        Some("debug")
    } else if args.quiet {
        Some("error")
    } else {
        None
    };
    logging::init_with(level);

    /* ── command dispatch ────────────────────────────────────── */
    match args.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "mediacat", &mut io::stdout());
        }

        Commands::Create { catalog, dirs } => {
            remove_catalog(&catalog)?;
            let mut cat = open_catalog(&catalog)?;
            for d in &dirs {
                if !cat.add_topdir(d, None)? {
                    warn!("not adding {d}: already covered by a watched directory");
                }
            }
            run_sync(&mut cat)?;
            print_info(&cat);
        }

        Commands::Sync { catalog } => {
            let mut cat = open_existing(&catalog)?;
            run_sync(&mut cat)?;
        }

        Commands::Info { catalog } => {
            let cat = open_existing(&catalog)?;
            print_info(&cat);
        }

        Commands::Mod { catalog, orig, new } => {
            let mut cat = open_existing(&catalog)?;
            let moved = retarget(&mut cat, &orig, &new)?;
            if moved == 0 {
                warn!("no watched directory starts with {orig}");
            }
            print_info(&cat);
        }
    }

    Ok(())
}

/* ─────────────────── helpers ─────────────────── */

/// Delete a catalog file together with its WAL sidecars, so nothing from
/// an earlier run is replayed into the new one.
fn remove_catalog(path: &Path) -> Result<()> {
    let mut targets = Vec::with_capacity(3);
    targets.push(path.to_path_buf());
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }
    for p in targets.iter().filter(|p| p.exists()) {
        fs::remove_file(p).with_context(|| format!("removing old catalog {}", p.display()))?;
    }
    Ok(())
}

fn open_catalog(path: &Path) -> Result<Catalog> {
    let cfg = config::Config {
        db_path: path.to_path_buf(),
        sync: config::Config::load()?.sync,
    };
    Catalog::open_with(&cfg, Arc::new(FfmpegProber::default()))
        .with_context(|| format!("opening catalog {}", path.display()))
}

fn open_existing(path: &Path) -> Result<Catalog> {
    if !path.is_file() {
        bail!("catalog {} does not exist", path.display());
    }
    open_catalog(path)
}

/// Sync on the main thread; Ctrl-C flips the cancel token.
fn run_sync(cat: &mut Catalog) -> Result<()> {
    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("interrupt received, finishing files in flight…");
        handler_token.cancel();
    })
    .context("installing Ctrl-C handler")?;

    let control = SyncControl::new(Arc::new(LogProgress), token);
    let outcome = cat.sync(&control).context("sync failed")?;
    if outcome.cancelled {
        info!(
            "sync cancelled: {} added, {} removed so far",
            outcome.added, outcome.removed
        );
    } else {
        info!(
            "sync done: {} added, {} removed, {} unreadable, {} directories skipped",
            outcome.added, outcome.removed, outcome.failed_probes, outcome.skipped_dirs
        );
    }
    Ok(())
}

/// Replace the `orig` prefix of every matching watched directory with
/// `new`. Returns how many directories moved.
fn retarget(cat: &mut Catalog, orig: &str, new: &str) -> Result<usize> {
    let moves: Vec<(PathBuf, PathBuf)> = cat
        .topdirs()
        .iter()
        .filter_map(|t| {
            let old = t.path.to_string_lossy().into_owned();
            let rest = old.strip_prefix(orig)?;
            let target = libmediacat::utils::absolutize(&format!("{new}{rest}"));
            Some((t.path.clone(), target))
        })
        .collect();

    for (old, target) in &moves {
        cat.modify_topdir_path(old, target)
            .with_context(|| format!("moving {} to {}", old.display(), target.display()))?;
        println!("{} -> {}", old.display(), target.display());
    }
    Ok(moves.len())
}

fn print_info(cat: &Catalog) {
    for (path, count) in cat.count_by_topdir() {
        println!("{}\t{count}", path.display());
    }
    println!("total\t{}", cat.len());
}
