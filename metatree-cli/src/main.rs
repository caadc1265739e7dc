//! `metatree` — the command-line entry point wiring `diff`, `merge`, and
//! `package` around the pure `metatree-core` library. Interactive prompts
//! (work team, developer name) use `dialoguer`; defaults are remembered in
//! a JSON settings file next to the CSV outputs.

mod csvio;
mod diffcmd;
mod logging;
mod mergecmd;
mod packagecmd;
mod settings;
mod walk;
mod workorder;

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dialoguer::Input;
use metatree_core::Config;

use settings::Settings;

#[derive(Parser)]
#[command(name = "metatree", version, about = "Parse, diff, and merge hierarchical metadata repositories")]
struct Cli {
    /// Path to the section-oriented configuration file.
    #[arg(long, global = true, default_value = "metatree.conf")]
    config: PathBuf,

    /// Directory holding logs, the remembered settings file, and (unless
    /// overridden per-subcommand) default output locations.
    #[arg(long, global = true, default_value = ".")]
    work_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a source repository against one or more target repositories
    /// and write a diff log.
    Diff {
        #[arg(long)]
        source: PathBuf,
        #[arg(long = "target", required = true)]
        targets: Vec<PathBuf>,
        #[arg(long, default_value = "diff.csv")]
        out: PathBuf,
        /// Story/ticket reference recorded on every row of the diff log.
        #[arg(long, default_value = "")]
        user_story: String,
    },
    /// Apply a diff log to a target repository.
    Merge {
        #[arg(long)]
        diff: PathBuf,
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        source: PathBuf,
        /// Log-only annotation; the rows being applied already carry their
        /// own work-team/story from when the diff log was produced.
        #[arg(long)]
        work_team: Option<String>,
        #[arg(long)]
        story: Option<String>,
    },
    /// Assemble a deployment package from a diff log.
    Package {
        #[arg(long)]
        diff: PathBuf,
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value = "package")]
        out: PathBuf,
    },
    /// Diff, then merge the result straight into the target, in one step.
    Run {
        #[arg(long)]
        source: PathBuf,
        #[arg(long = "target", required = true)]
        targets: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings_path = cli.work_dir.join(".metatree-settings.json");
    let mut settings = Settings::load_or_default(&settings_path);

    let _guard = logging::init_logging(&cli.work_dir.join("logs")).context("initializing logging")?;

    let config = load_config(&cli.config)?;

    let result = match &cli.command {
        Commands::Diff { source, targets, out, user_story } => {
            if settings.work_team.is_empty() {
                settings.work_team = prompt_if_interactive("Work team")?;
            }
            if settings.developer_name.is_empty() {
                settings.developer_name = prompt_if_interactive("Developer name")?;
            }
            run_diff(&config, source, targets, out, &settings, user_story)
        }
        Commands::Merge { diff, target, source, work_team, story } => {
            if let Some(team) = work_team {
                tracing::info!(work_team = %team, story = story.as_deref().unwrap_or(""), "merge run annotation");
            }
            run_merge(&config, diff, target, source)
        }
        Commands::Package { diff, source, out } => run_package(diff, source, out),
        Commands::Run { source, targets } => run_combined(&config, &cli.work_dir, source, targets, &mut settings),
    };

    let source_for_settings = match &cli.command {
        Commands::Diff { source, .. } | Commands::Run { source, .. } => source,
        Commands::Merge { source, .. } | Commands::Package { source, .. } => source,
    };
    settings.last_source_dir = Some(source_for_settings.to_string_lossy().into_owned());
    if let Err(err) = settings.save(&settings_path) {
        tracing::warn!(%err, "failed to persist settings");
    }

    result
}

fn prompt_if_interactive(label: &str) -> anyhow::Result<String> {
    Input::<String>::new()
        .with_prompt(label)
        .allow_empty(true)
        .interact_text()
        .with_context(|| format!("reading {label}"))
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    Config::parse(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn run_diff(
    config: &Config,
    source: &Path,
    targets: &[PathBuf],
    out: &Path,
    settings: &Settings,
    user_story: &str,
) -> anyhow::Result<()> {
    let mut outcome = diffcmd::run(source, targets, config)?;
    let order = workorder::WorkOrder::new(&settings.work_team, &settings.developer_name, user_story);
    order.stamp(&mut outcome.rows);
    diffcmd::write_outputs(&outcome, out)?;
    tracing::info!(rows = outcome.rows.len(), path = %out.display(), "wrote diff log");
    println!("wrote {} diff row(s) to {}", outcome.rows.len(), out.display());
    Ok(())
}

fn run_merge(config: &Config, diff: &Path, target: &Path, source: &Path) -> anyhow::Result<()> {
    let outcome = mergecmd::run(diff, target, source, config)?;
    println!(
        "updated {} file(s), {} already up to date, {} file(s) with errors",
        outcome.updated_files.len(),
        outcome.already_updated.len(),
        outcome.change_log.len()
    );
    for (path, errors) in &outcome.change_log {
        for err in errors {
            tracing::warn!(path = %path.display(), row = err.row_index, message = %err.message, "merge row could not be applied");
        }
    }
    if !outcome.change_log.is_empty() {
        anyhow::bail!("{} file(s) had unresolved merge errors; see log for detail", outcome.change_log.len());
    }
    Ok(())
}

fn run_package(diff: &Path, source: &Path, out: &Path) -> anyhow::Result<()> {
    let rows = csvio::read_diff_log(diff)?;
    let outcome = packagecmd::run(&rows, source, out)?;
    println!(
        "assembled package at {} with {} file(s), {} destructive member(s)",
        out.display(),
        outcome.copied_files.len(),
        outcome.destructive_members.values().map(|s| s.len()).sum::<usize>()
    );
    Ok(())
}

/// `diff` immediately followed by `merge` against `targets[0]`, prompting
/// once for the developer-facing metadata the diff log records if it isn't
/// already remembered in settings. Declines to continue past the diff step
/// without an explicit confirmation, since merging is a destructive,
/// hard-to-reverse step against the caller's target repository.
fn run_combined(
    config: &Config,
    work_dir: &Path,
    source: &Path,
    targets: &[PathBuf],
    settings: &mut Settings,
) -> anyhow::Result<()> {
    if settings.work_team.is_empty() {
        settings.work_team = Input::<String>::new()
            .with_prompt("Work team")
            .interact_text()
            .context("reading work team")?;
    }
    if settings.developer_name.is_empty() {
        settings.developer_name = Input::<String>::new()
            .with_prompt("Developer name")
            .interact_text()
            .context("reading developer name")?;
    }

    let diff_csv = work_dir.join("diff.csv");
    let mut outcome = diffcmd::run(source, targets, config)?;
    let order = workorder::WorkOrder::new(&settings.work_team, &settings.developer_name, "");
    order.stamp(&mut outcome.rows);
    diffcmd::write_outputs(&outcome, &diff_csv)?;
    println!("wrote {} diff row(s) to {}", outcome.rows.len(), diff_csv.display());

    if outcome.rows.is_empty() {
        println!("no differences found; nothing to merge");
        return Ok(());
    }

    let proceed = dialoguer::Confirm::new()
        .with_prompt(format!("Merge {} change(s) into {}?", outcome.rows.len(), targets[0].display()))
        .default(false)
        .interact()
        .context("reading merge confirmation")?;
    if !proceed {
        println!("merge skipped");
        return Ok(());
    }

    run_merge(config, &diff_csv, &targets[0], source)
}
