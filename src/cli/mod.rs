//! CLI command definitions and handlers

mod inspect;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use heapnav::config::{self, HeapnavConfig};
use heapnav::snapshot::HeapSnapshot;
use heapnav::{AuxFileNavigator, AuxFilePaths};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// heapnav - random-access navigation over heap snapshots
#[derive(Parser, Debug)]
#[command(name = "heapnav")]
#[command(
    version,
    about = "Navigate heap snapshots by object id, field and GC root",
    after_help = "\
Examples:
  heapnav roots heap.json                     List GC roots with their reasons
  heapnav show heap.json 42                   Class, root status and references of object 42
  heapnav show heap.json 42 --soft-weak       Include soft/weak referents
  heapnav field heap.json 42 table.next       Follow instance fields from object 42
  heapnav static heap.json com.example.App INSTANCE"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Config file (default: ./heapnav.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for auxiliary files (overrides config)
    #[arg(long, global = true, env = "HEAPNAV_AUX_DIR")]
    pub aux_dir: Option<PathBuf>,

    /// Keep auxiliary files after the command finishes
    #[arg(long, global = true)]
    pub keep_aux: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List GC roots in discovery order
    Roots {
        /// Heap snapshot (JSON)
        snapshot: PathBuf,

        /// Maximum roots to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one object: class, root reason and outgoing references
    Show {
        snapshot: PathBuf,

        /// Object id
        id: u64,

        /// Include soft/weak reference edges
        #[arg(long)]
        soft_weak: bool,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Follow a dotted path of instance fields starting at an object
    Field {
        snapshot: PathBuf,

        /// Starting object id
        id: u64,

        /// Field path, e.g. `table.next.value`
        path: String,
    },

    /// Resolve a static field and show the object it holds
    Static {
        snapshot: PathBuf,

        /// Fully qualified class name
        class: String,

        /// Static field name
        field: String,
    },
}

/// Resolved settings for one invocation
pub(crate) struct Settings {
    pub config: HeapnavConfig,
    pub aux_dir: Option<PathBuf>,
    pub keep_aux: bool,
}

impl Settings {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => config::load_config_file(path)?,
            None => {
                let cwd = std::env::current_dir().context("Failed to read current directory")?;
                config::load_config(&cwd)
            }
        };
        Ok(Self {
            keep_aux: cli.keep_aux || config.aux.keep_files,
            aux_dir: cli.aux_dir.clone(),
            config,
        })
    }
}

/// Build a navigator for `snapshot_path`, hand it to `f`, then clean up the
/// auxiliary files unless asked to keep them
pub(crate) fn with_navigator<T>(
    settings: &Settings,
    snapshot_path: &Path,
    f: impl FnOnce(&mut AuxFileNavigator) -> Result<T>,
) -> Result<T> {
    let mut snapshot = HeapSnapshot::load(snapshot_path)
        .with_context(|| format!("Failed to load snapshot: {}", snapshot_path.display()))?;
    let class_store = Arc::new(snapshot.class_store().context("Invalid class table")?);

    let dir = settings
        .aux_dir
        .clone()
        .unwrap_or_else(|| settings.config.aux_dir_for(snapshot_path));
    config::paths::ensure_dir(&dir)
        .with_context(|| format!("Failed to create aux directory: {}", dir.display()))?;
    let paths = AuxFilePaths::in_dir(&dir);
    debug!("Auxiliary files in {}", dir.display());

    let mut navigator = AuxFileNavigator::create_on_auxiliary_files(&mut snapshot, &paths, class_store)
        .context("Failed to build auxiliary files")?;
    let result = f(&mut navigator);

    // Unmap before deleting
    drop(navigator);
    if !settings.keep_aux {
        if let Err(e) = paths.remove() {
            warn!("Failed to remove auxiliary files in {}: {}", dir.display(), e);
        }
    }
    result
}

pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_cli(&cli)?;

    match cli.command {
        Commands::Roots { snapshot, limit } => inspect::roots(&settings, &snapshot, limit),
        Commands::Show {
            snapshot,
            id,
            soft_weak,
            format,
        } => {
            let soft_weak = soft_weak || settings.config.navigation.include_soft_weak;
            inspect::show(&settings, &snapshot, id, soft_weak, &format)
        }
        Commands::Field { snapshot, id, path } => inspect::field(&settings, &snapshot, id, &path),
        Commands::Static {
            snapshot,
            class,
            field,
        } => inspect::static_field(&settings, &snapshot, &class, &field),
    }
}
