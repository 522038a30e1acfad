use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use morphoseg_collection::{Landmark, ManagerConfig, ProfileType, Profileable};
use morphoseg_dataset::{Dataset, DatasetValidator, HandlerConfig, SegmentationHandler, ValidationReport};
use morphoseg_io::{ExperimentName, ProfileReader, SnapshotReader, SnapshotWriter, write_snapshot};

#[derive(Parser)]
#[command(name = "morphoseg")]
#[command(about = "Segment and realign border profiles across collections of nuclei")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed, reserved for synthetic data generation
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Options shared by every edit command.
#[derive(Args, Debug, Clone)]
struct EditArgs {
    /// Dataset snapshot to edit in place
    #[arg(long)]
    snapshot: PathBuf,

    /// Dataset to edit (defaults to the root)
    #[arg(long)]
    dataset: Option<String>,

    /// Profile type used for realignment: "angle", "diameter" or "radius"
    #[arg(long, default_value = "angle")]
    realign_type: String,

    /// Search only this many indices either side of each member's current landmark
    #[arg(long)]
    best_fit_window: Option<usize>,

    /// Realign members on the calling thread only
    #[arg(long, default_value_t = false)]
    sequential: bool,

    /// Keep an edit that leaves the dataset inconsistent instead of undoing it
    #[arg(long, default_value_t = false)]
    no_rollback: bool,

    /// Skip the consistency check before the edit
    #[arg(long, default_value_t = false)]
    skip_pre_validation: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Profile a CSV of angle profiles into a dataset snapshot
    Build {
        /// Path to the input CSV file (`object_id,0,1,...`)
        #[arg(long)]
        data: PathBuf,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for the snapshot
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Child dataset as `name=id,id,...`, ids being CSV object ids; repeatable
        #[arg(long = "child")]
        children: Vec<String>,
    },

    /// Merge two adjacent segments
    Merge {
        #[command(flatten)]
        edit: EditArgs,

        /// Leading segment id
        #[arg(long)]
        first: Uuid,

        /// Following segment id
        #[arg(long)]
        second: Uuid,
    },

    /// Split a segment at its midpoint
    Split {
        #[command(flatten)]
        edit: EditArgs,

        /// Segment id
        #[arg(long)]
        segment: Uuid,
    },

    /// Restore the segments a merged segment was made from
    Unmerge {
        #[command(flatten)]
        edit: EditArgs,

        /// Segment id
        #[arg(long)]
        segment: Uuid,
    },

    /// Move the start of a segment to an aggregate index
    MoveStart {
        #[command(flatten)]
        edit: EditArgs,

        /// Segment id
        #[arg(long)]
        segment: Uuid,

        /// New start index in the root aggregate
        #[arg(long)]
        index: usize,
    },

    /// Place a landmark at an aggregate index and realign the members
    SetLandmark {
        #[command(flatten)]
        edit: EditArgs,

        /// Landmark name, e.g. "Reference point" or "Top vertical"
        #[arg(long)]
        landmark: String,

        /// Index in the root aggregate
        #[arg(long)]
        index: usize,
    },

    /// Lock or unlock every segment, optionally sparing one
    Lock {
        #[command(flatten)]
        edit: EditArgs,

        /// Unlock instead of lock
        #[arg(long, default_value_t = false)]
        unlock: bool,

        /// Segment to leave untouched
        #[arg(long)]
        except: Option<Uuid>,
    },

    /// Check a snapshot for consistency
    Validate {
        /// Dataset snapshot to check
        #[arg(long)]
        snapshot: PathBuf,

        /// Also write `{experiment}_validation.json` to the output directory
        #[arg(long)]
        experiment: Option<String>,

        /// Output directory for the report
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

#[derive(Serialize)]
struct BuildOutput {
    experiment: String,
    snapshot: PathBuf,
    members: usize,
    length: usize,
    children: Vec<ChildOutput>,
    valid: bool,
}

#[derive(Serialize)]
struct ChildOutput {
    name: String,
    members: usize,
    length: usize,
}

#[derive(Serialize)]
struct EditOutput {
    action: &'static str,
    dataset: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    created: Vec<Uuid>,
    segments: Vec<SegmentOutput>,
    landmarks: BTreeMap<String, usize>,
    valid: bool,
}

#[derive(Serialize)]
struct SegmentOutput {
    id: Uuid,
    start: usize,
    end: usize,
    locked: bool,
}

#[derive(Serialize)]
struct ValidateOutput<'a> {
    snapshot: &'a Path,
    valid: bool,
    #[serde(flatten)]
    report: &'a ValidationReport,
}

fn handler_config(edit: &EditArgs) -> Result<HandlerConfig> {
    let realign_type: ProfileType = edit
        .realign_type
        .parse()
        .with_context(|| format!("invalid realign type '{}'", edit.realign_type))?;
    let mut manager = ManagerConfig::new()
        .with_realign_type(realign_type)
        .with_parallel(!edit.sequential);
    if let Some(window) = edit.best_fit_window {
        manager = manager.with_best_fit_window(window);
    }
    Ok(HandlerConfig::new()
        .with_manager(manager)
        .with_rollback_on_invalid(!edit.no_rollback)
        .with_validate_before_edit(!edit.skip_pre_validation))
}

/// Load the snapshot, run `apply` through a handler, write the result back and
/// print a summary.
fn run_edit(
    action: &'static str,
    edit: &EditArgs,
    apply: impl FnOnce(&SegmentationHandler, &str) -> Result<Vec<Uuid>>,
) -> Result<()> {
    let dataset = SnapshotReader::new(&edit.snapshot)
        .read()
        .with_context(|| format!("failed to read snapshot {}", edit.snapshot.display()))?;
    let target = edit.dataset.clone().unwrap_or_else(|| dataset.name().to_owned());
    let handler = SegmentationHandler::new(dataset).with_config(handler_config(edit)?);

    let created = apply(&handler, &target).with_context(|| format!("{action} failed on '{target}'"))?;
    let dataset = handler.into_inner()?;
    let report = DatasetValidator::new().validate(&dataset);
    write_snapshot(&edit.snapshot, &dataset).context("failed to write snapshot")?;

    let output = EditOutput {
        action,
        dataset: target,
        created,
        segments: dataset
            .collection()
            .segments()
            .iter()
            .map(|s| SegmentOutput {
                id: s.id(),
                start: s.start(),
                end: s.end(),
                locked: s.is_locked(),
            })
            .collect(),
        landmarks: std::iter::once((morphoseg_collection::REFERENCE_POINT.name().to_owned(), 0))
            .chain(
                dataset
                    .collection()
                    .landmarks()
                    .iter()
                    .map(|(l, &i)| (l.name().to_owned(), i)),
            )
            .collect(),
        valid: report.is_valid(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Resolve `name=id,id,...` against the members' CSV object ids or UUIDs.
fn parse_child(arg: &str, dataset: &Dataset) -> Result<(String, Vec<Uuid>)> {
    let (name, ids) = arg
        .split_once('=')
        .with_context(|| format!("child '{arg}' must look like name=id,id,..."))?;
    let ids = ids
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            dataset
                .members()
                .iter()
                .find(|m| m.name() == token || m.id().to_string() == token)
                .map(Profileable::id)
                .with_context(|| format!("child '{name}' lists unknown object '{token}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((name.trim().to_owned(), ids))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }
    debug!(seed = cli.seed, "seed set");

    match cli.command {
        Command::Build {
            data,
            experiment,
            output_dir,
            children,
        } => {
            let experiment_name = ExperimentName::new(experiment.clone())?;
            let members = ProfileReader::new(&data)
                .read()
                .context("failed to read input CSV")?;
            let mut dataset = Dataset::new(experiment.clone(), members).context("failed to profile dataset")?;

            for arg in &children {
                let (name, ids) = parse_child(arg, &dataset)?;
                dataset
                    .add_child(&name, ids)
                    .with_context(|| format!("failed to derive child dataset '{name}'"))?;
            }

            let report = DatasetValidator::new().validate(&dataset);
            let writer = SnapshotWriter::new(&output_dir, experiment_name)?;
            let snapshot = writer.write_dataset(&dataset)?;

            let output = BuildOutput {
                experiment,
                snapshot,
                members: dataset.members().len(),
                length: dataset.collection().length(),
                children: dataset
                    .children()
                    .iter()
                    .map(|c| ChildOutput {
                        name: c.name().to_owned(),
                        members: c.member_ids().len(),
                        length: c.collection().length(),
                    })
                    .collect(),
                valid: report.is_valid(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Merge { edit, first, second } => {
            run_edit("merge", &edit, |handler, target| {
                Ok(vec![handler.merge_segments(target, first, second)?])
            })?;
        }

        Command::Split { edit, segment } => {
            run_edit("split", &edit, |handler, target| {
                let (a, b) = handler.split_segment(target, segment)?;
                Ok(vec![a, b])
            })?;
        }

        Command::Unmerge { edit, segment } => {
            run_edit("unmerge", &edit, |handler, target| {
                handler.unmerge_segment(target, segment)?;
                Ok(Vec::new())
            })?;
        }

        Command::MoveStart { edit, segment, index } => {
            run_edit("move-start", &edit, |handler, target| {
                handler.update_segment_start(target, segment, index)?;
                Ok(Vec::new())
            })?;
        }

        Command::SetLandmark { edit, landmark, index } => {
            let landmark = Landmark::from_name(&landmark);
            run_edit("set-landmark", &edit, |handler, target| {
                handler.set_landmark(target, &landmark, index)?;
                Ok(Vec::new())
            })?;
        }

        Command::Lock { edit, unlock, except } => {
            run_edit("lock", &edit, |handler, target| {
                match except {
                    Some(id) => handler.set_lock_on_all_segments_except(target, id, !unlock)?,
                    None => handler.set_lock_on_all_segments(target, !unlock)?,
                }
                Ok(Vec::new())
            })?;
        }

        Command::Validate {
            snapshot,
            experiment,
            output_dir,
        } => {
            let dataset = SnapshotReader::new(&snapshot)
                .read()
                .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;
            let report = DatasetValidator::new().validate(&dataset);
            if let Some(experiment) = experiment {
                let writer = SnapshotWriter::new(&output_dir, ExperimentName::new(experiment)?)?;
                writer.write_validation(&report)?;
            }
            let output = ValidateOutput {
                snapshot: &snapshot,
                valid: report.is_valid(),
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
