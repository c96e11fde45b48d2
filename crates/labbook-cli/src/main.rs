//! Irradiation labbook CLI.
//!
//! Provides the `labbook` binary with subcommands for recording
//! irradiations, levels, projects and samples, inspecting and saving the
//! positions of a level, proposing the next identifier and printing a PDF
//! labbook.
//!
//! Configuration comes from an optional YAML file (`--config`) and the
//! `LABBOOK_DB_PATH`, `LABBOOK_META_ROOT` and `LABBOOK_BACKUP_DIR`
//! environment variables.
//!
//! Exit codes: 0 = success, 1 = invalid input or validation failure,
//! 2 = identifier collision, 3 = I/O or storage error.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::warn;

use labbook_core::{allocate_next, IrradiatedPosition};
use labbook_entry::{
    add_irradiation_with_defaults, auto_increment_irradiation, collect_labbook, status_report,
    write_pdf, ConfigError, EntryConfig, EntryError, EntrySession, SyncFailure,
};
use labbook_hardware::{DeviceKind, DeviceRegistry};
use labbook_storage::{
    FsMetaRepository, IrradiationFilter, NameOrder, RecordStore, SqliteStore, StorageError,
};

/// Irradiation labbook.
#[derive(Parser)]
#[command(name = "labbook", about = "Irradiation labbook")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the identifier following NAME.
    NextId { name: String },

    /// Add an irradiation with its flux-monitor project and sample.
    AddIrradiation {
        /// Name (default: the next one after the newest with the configured prefix).
        name: Option<String>,

        /// Skip the default monitor project and sample.
        #[arg(long)]
        no_defaults: bool,
    },

    /// Add a level to an irradiation.
    AddLevel {
        irradiation: String,
        level: String,

        /// Holder tray name.
        #[arg(long)]
        holder: Option<String>,

        #[arg(long)]
        z: Option<f64>,

        #[arg(long, default_value = "")]
        note: String,
    },

    /// Add a project.
    AddProject {
        name: String,

        /// Principal investigator.
        #[arg(long)]
        pi: Option<String>,
    },

    /// Add a sample to an existing project.
    AddSample {
        name: String,

        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        material: Option<String>,
    },

    /// List projects.
    Projects {
        #[arg(long)]
        desc: bool,
    },

    /// List irradiations.
    Irradiations {
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long)]
        desc: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the positions of a level as JSON.
    ShowLevel { irradiation: String, level: String },

    /// Save the positions of a level from a YAML positions file.
    SaveLevel {
        irradiation: String,
        level: String,
        file: PathBuf,
    },

    /// Back up the positions of a level.
    Backup { irradiation: String, level: String },

    /// List labelled positions of an irradiation that have not been analysed.
    Status { irradiation: String },

    /// Write a PDF labbook of the given irradiations.
    Labbook {
        #[arg(long, num_args = 1.., required = true)]
        irradiations: Vec<String>,

        /// Output PDF file.
        #[arg(long)]
        out: PathBuf,
    },

    /// List device kinds and whether a driver is available.
    Devices,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::NextId { name } => {
            println!("{}", allocate_next(&name));
            0
        }
        Commands::Devices => run_devices(),
        command => match load_config(cli.config, cli.db) {
            Ok(config) => match run(command, &config) {
                Ok(()) => 0,
                Err(e) => report(&e),
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                match e {
                    ConfigError::Io(_) => 3,
                    ConfigError::BadFilePath(_) | ConfigError::Parse(_) => 1,
                }
            }
        },
    };
    process::exit(exit_code);
}

fn load_config(path: Option<PathBuf>, db: Option<PathBuf>) -> Result<EntryConfig, ConfigError> {
    let mut config = EntryConfig::load(path.as_deref())?;
    if let Some(db) = db {
        config.db_path = db;
    }
    Ok(config)
}

/// Print an error and map it to an exit code.
fn report(err: &EntryError) -> i32 {
    match err {
        EntryError::IdentifierCollision { .. } => {
            eprintln!("Warning: {}", err);
            2
        }
        EntryError::Validation(_) => {
            eprintln!("{}", err);
            1
        }
        EntryError::ServiceUnavailable(_) => {
            eprintln!("Warning: {}", err);
            1
        }
        EntryError::Sync(SyncFailure::LevelNotFound { .. }) => {
            warn!(error = %err, "level synchronization failed");
            eprintln!("Warning: {}", err);
            1
        }
        EntryError::Storage(StorageError::IrradiationNotFound(_))
        | EntryError::Storage(StorageError::LevelNotFound { .. })
        | EntryError::Storage(StorageError::ProjectNotFound(_)) => {
            eprintln!("Error: {}", err);
            1
        }
        EntryError::Storage(_)
        | EntryError::Io(_)
        | EntryError::Yaml(_)
        | EntryError::Sync(_)
        | EntryError::Report(_) => {
            eprintln!("Error: {}", err);
            3
        }
        _ => {
            eprintln!("Error: {}", err);
            1
        }
    }
}

fn open_store(config: &EntryConfig) -> Result<SqliteStore, EntryError> {
    Ok(SqliteStore::new(&config.db_path.to_string_lossy())?)
}

fn order(desc: bool) -> NameOrder {
    if desc {
        NameOrder::Desc
    } else {
        NameOrder::Asc
    }
}

/// A position as printed by `show-level`.
#[derive(Serialize)]
struct PositionRow<'a> {
    hole: u32,
    identifier: &'a str,
    sample: &'a str,
    material: &'a str,
    project: &'a str,
    j: f64,
    j_err: f64,
    weight: f64,
    note: &'a str,
    analyzed: bool,
    color: Option<String>,
    monitor: bool,
}

impl<'a> From<&'a IrradiatedPosition> for PositionRow<'a> {
    fn from(p: &'a IrradiatedPosition) -> Self {
        PositionRow {
            hole: p.hole,
            identifier: &p.identifier,
            sample: &p.sample,
            material: &p.material,
            project: &p.project,
            j: p.j,
            j_err: p.j_err,
            weight: p.weight,
            note: &p.note,
            analyzed: p.analyzed,
            color: p.fill.color.map(|c| c.to_hex()),
            monitor: p.fill.monitor,
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", json);
}

fn load_session(
    store: &SqliteStore,
    meta: &FsMetaRepository,
    config: &EntryConfig,
    irradiation: &str,
    level: &str,
) -> Result<EntrySession, EntryError> {
    let session = EntrySession::load_level(store, meta, irradiation, level, &config.monitor_name)?;
    for hole in session.extra_positions() {
        warn!(irradiation, level, hole, "position has no hole in the tray");
    }
    Ok(session)
}

/// Execute a subcommand that needs the configured stores.
fn run(command: Commands, config: &EntryConfig) -> Result<(), EntryError> {
    let meta = FsMetaRepository::new(config.meta_root.clone());

    match command {
        Commands::AddIrradiation { name, no_defaults } => {
            let mut store = open_store(config)?;
            let name = match name {
                Some(name) => name,
                None => auto_increment_irradiation(&store, &config.irradiation_prefix)?,
            };
            let irradiation =
                add_irradiation_with_defaults(&mut store, config, &name, !no_defaults)?;
            println!("{}", irradiation.name);
        }
        Commands::AddLevel {
            irradiation,
            level,
            holder,
            z,
            note,
        } => {
            let mut store = open_store(config)?;
            let level = store.session::<_, EntryError, _>(|s| {
                Ok(s.add_irradiation_level(&irradiation, &level, holder.as_deref(), z, &note)?)
            })?;
            println!("{}{}", irradiation, level.name);
        }
        Commands::AddProject { name, pi } => {
            let mut store = open_store(config)?;
            let project = store.session::<_, EntryError, _>(|s| {
                Ok(s.add_project(
                    &name,
                    pi.as_deref()
                        .or(Some(config.default_principal_investigator.as_str()))
                        .filter(|pi| !pi.is_empty()),
                )?)
            })?;
            println!("{}", project.name);
        }
        Commands::AddSample {
            name,
            project,
            material,
        } => {
            let mut store = open_store(config)?;
            let sample = store.session::<_, EntryError, _>(|s| {
                Ok(s.add_sample(&name, &project, material.as_deref())?)
            })?;
            println!("{}", sample.name);
        }
        Commands::Projects { desc } => {
            let store = open_store(config)?;
            for project in store.get_projects(Some(order(desc)))? {
                match project.principal_investigator {
                    Some(pi) => println!("{}\t{}", project.name, pi),
                    None => println!("{}", project.name),
                }
            }
        }
        Commands::Irradiations {
            prefix,
            desc,
            limit,
        } => {
            let store = open_store(config)?;
            let filter = IrradiationFilter {
                prefix,
                order: Some(order(desc)),
                limit,
                ..Default::default()
            };
            for irradiation in store.get_irradiations(&filter)? {
                println!("{}", irradiation.name);
            }
        }
        Commands::ShowLevel { irradiation, level } => {
            let store = open_store(config)?;
            let session = load_session(&store, &meta, config, &irradiation, &level)?;
            let rows: Vec<PositionRow> = session.positions().iter().map(PositionRow::from).collect();
            print_json(&rows);
        }
        Commands::SaveLevel {
            irradiation,
            level,
            file,
        } => {
            let mut store = open_store(config)?;
            let mut meta = meta;
            let mut session = load_session(&store, &meta, config, &irradiation, &level)?;
            session.backup(&config.backup_dir)?;
            session.load_positions_file(&file)?;
            let mut progress = BarProgress::new();
            let report = session.save(&mut store, &mut meta, &mut progress);
            progress.finish();
            let report = report?;
            println!(
                "Changes saved to Database: {} saved, {} removed",
                report.saved, report.removed
            );
        }
        Commands::Backup { irradiation, level } => {
            let store = open_store(config)?;
            let session = load_session(&store, &meta, config, &irradiation, &level)?;
            let path = session.backup(&config.backup_dir)?;
            println!("{}", path.display());
        }
        Commands::Status { irradiation } => {
            let store = open_store(config)?;
            for entry in status_report(&store, &meta, &irradiation)? {
                let p = &entry.position;
                println!(
                    "{}{}\t{}\t{}\t{}\t{}",
                    irradiation, entry.level, p.hole, p.identifier, p.sample, p.project
                );
            }
        }
        Commands::Labbook { irradiations, out } => {
            let store = open_store(config)?;
            let mut progress = BarProgress::new();
            let labbook = collect_labbook(&store, &meta, &irradiations, &mut progress);
            progress.finish();
            write_pdf(&labbook?, &out)?;
            println!("{}", out.display());
        }
        Commands::NextId { .. } | Commands::Devices => {}
    }
    Ok(())
}

/// Drives a terminal progress bar from save and labbook passes.
struct BarProgress(ProgressBar);

impl BarProgress {
    fn new() -> Self {
        BarProgress(ProgressBar::new(0))
    }

    fn finish(self) {
        self.0.finish_and_clear();
    }
}

impl labbook_entry::Progress for BarProgress {
    fn step(&mut self, done: usize, total: usize, message: &str) {
        self.0.set_length(total as u64);
        self.0.set_position(done as u64);
        self.0.set_message(message.to_string());
    }
}

fn run_devices() -> i32 {
    let registry = DeviceRegistry::with_builtin_drivers();
    for kind in DeviceKind::ALL {
        let status = match (registry.is_supported(*kind), kind.is_deprecated()) {
            (true, true) => "supported (deprecated)",
            (true, false) => "supported",
            (false, _) => "-",
        };
        println!("{}\t{}", kind, status);
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use labbook_entry::Progress;

    #[test]
    fn progress_steps_move_the_bar() {
        let mut progress = BarProgress(ProgressBar::hidden());
        progress.step(1, 4, "saving 1");
        assert_eq!(progress.0.position(), 1);
        progress.step(3, 4, "saving 4");
        assert_eq!(progress.0.position(), 3);
        assert_eq!(progress.0.message(), "saving 4");
    }

    #[test]
    fn labbook_takes_several_irradiations() {
        let cli = Cli::try_parse_from([
            "labbook",
            "labbook",
            "--irradiations",
            "NM-1",
            "NM-2",
            "--out",
            "book.pdf",
        ])
        .unwrap();
        match cli.command {
            Commands::Labbook { irradiations, out } => {
                assert_eq!(irradiations, vec!["NM-1", "NM-2"]);
                assert_eq!(out, PathBuf::from("book.pdf"));
            }
            _ => panic!("expected the labbook subcommand"),
        }
        assert!(Cli::try_parse_from(["labbook", "labbook", "--out", "x.pdf"]).is_err());
    }

    #[test]
    fn render_failures_are_io_class() {
        assert_eq!(report(&EntryError::Report("font".into())), 3);
    }

    #[test]
    fn collisions_exit_with_two() {
        let err = EntryError::IdentifierCollision {
            identifier: "1000".into(),
            irradiation: "NM-1".into(),
        };
        assert_eq!(report(&err), 2);
    }
}
