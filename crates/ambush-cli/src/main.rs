mod page;
mod web;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ambush_contracts::credentials::{resolve_credential, Credential, SecretStore};
use ambush_contracts::endpoints::{EndpointConfig, EndpointKind};
use ambush_contracts::events::EventWriter;
use ambush_contracts::pantry::{CompartmentSlot, EquipmentProtocol, PlanPreferences};
use ambush_contracts::runs::summary::write_summary;
use ambush_engine::codec::{decode_image, encode_png};
use ambush_engine::{Backends, CaptureSet, Pipeline, ProgressSink, RunOutcome, RunReport, RunStage};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::web::AppState;

const DRYRUN_CREDENTIAL: &str = "dryrun";

#[derive(Debug, Parser)]
#[command(
    name = "ambush",
    version,
    about = "Kitchen Ambush: photograph cabinets, get an organization plan"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the browser UI.
    Serve(ServeArgs),
    /// Run one mission over image files and write the results to disk.
    Run(RunArgs),
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Use local placeholder backends instead of the hosted endpoints.
    #[arg(long)]
    dryrun: bool,
    #[arg(long, env = "AMBUSH_SECRETS", default_value = "secrets.toml")]
    secrets: PathBuf,
    #[arg(long)]
    vision_url: Option<String>,
    #[arg(long)]
    text_url: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
}

impl BackendArgs {
    fn endpoints(&self) -> EndpointConfig {
        EndpointConfig::from_env()
            .with_override(EndpointKind::Vision, self.vision_url.as_deref())
            .with_override(EndpointKind::TextGeneration, self.text_url.as_deref())
            .with_override(EndpointKind::ImageGeneration, self.image_url.as_deref())
    }

    fn backends(&self) -> Backends {
        if self.dryrun {
            Backends::dryrun()
        } else {
            Backends::huggingface(&self.endpoints())
        }
    }

    /// Secret store credential; dryrun runs get a placeholder so no token is needed.
    fn provisioned_credential(&self) -> Result<Option<Credential>> {
        let store = SecretStore::load(&self.secrets)?;
        let provisioned = store.provisioned_credential();
        if provisioned.is_none() && self.dryrun {
            return Ok(Credential::new(DRYRUN_CREDENTIAL));
        }
        Ok(provisioned)
    }
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, env = "AMBUSH_BIND", default_value = "127.0.0.1:8501")]
    bind: String,
    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum EquipmentArg {
    #[default]
    WorkWithWhatIHave,
    SuggestBins,
}

impl From<EquipmentArg> for EquipmentProtocol {
    fn from(value: EquipmentArg) -> Self {
        match value {
            EquipmentArg::WorkWithWhatIHave => EquipmentProtocol::WorkWithWhatIHave,
            EquipmentArg::SuggestBins => EquipmentProtocol::SuggestBins,
        }
    }
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    cab1: Option<PathBuf>,
    #[arg(long)]
    cab2: Option<PathBuf>,
    #[arg(long)]
    cab3: Option<PathBuf>,
    /// Keep items in their original cabinets.
    #[arg(long)]
    no_rearrange: bool,
    #[arg(long, value_enum, default_value_t = EquipmentArg::default())]
    equipment: EquipmentArg,
    /// Used only when no HF_TOKEN secret is provisioned.
    #[arg(long)]
    token: Option<String>,
    #[arg(long, default_value = "ambush-run")]
    out: PathBuf,
    #[command(flatten)]
    backend: BackendArgs,
}

impl RunArgs {
    fn preferences(&self) -> PlanPreferences {
        PlanPreferences {
            allow_rearrange: !self.no_rearrange,
            equipment: self.equipment.into(),
        }
    }

    fn photo_paths(&self) -> Vec<(CompartmentSlot, &Path)> {
        [
            (CompartmentSlot::First, self.cab1.as_deref()),
            (CompartmentSlot::Second, self.cab2.as_deref()),
            (CompartmentSlot::Third, self.cab3.as_deref()),
        ]
        .into_iter()
        .filter_map(|(slot, path)| path.map(|path| (slot, path)))
        .collect()
    }
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ambush error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Run(args) => run_headless(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<i32> {
    let provisioned = args.backend.provisioned_credential()?;
    let dryrun = args.backend.dryrun;
    let endpoints = args.backend.endpoints();
    for spec in endpoints.list() {
        tracing::info!(endpoint = %spec.kind, url = %spec.url, dryrun, "endpoint configured");
    }
    let factory: web::BackendFactory = Arc::new(move || {
        if dryrun {
            Backends::dryrun()
        } else {
            Backends::huggingface(&endpoints)
        }
    });
    let state = AppState::new(provisioned, factory);
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(web::serve(&args.bind, state))?;
    Ok(0)
}

struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn stage(&mut self, stage: RunStage) {
        if stage != RunStage::Idle {
            println!("{}", stage.headline());
        }
    }

    fn scanned(&mut self, done: usize, total: usize) {
        let pct = if total == 0 { 100 } else { done * 100 / total };
        println!("  scanned {done}/{total} ({pct}%)");
    }
}

fn run_headless(args: RunArgs) -> Result<i32> {
    let provisioned = args.backend.provisioned_credential()?;
    let credential =
        resolve_credential(provisioned.as_ref(), args.token.as_deref()).map(|resolved| {
            tracing::debug!(source = resolved.source.key(), "credential resolved");
            resolved.credential
        });

    let mut captures = CaptureSet::new();
    for (slot, path) in args.photo_paths() {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let image = decode_image(&bytes)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        captures.insert(slot, image);
    }

    let run_id = format!("run-{}", Uuid::new_v4().simple());
    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events = EventWriter::to_file(args.out.join("events.jsonl"), run_id.clone());
    let pipeline = Pipeline::new(args.backend.backends()).with_events(events.clone());

    let outcome = pipeline.run(
        credential.as_ref(),
        &captures,
        args.preferences(),
        &mut ConsoleProgress,
    );
    if let Some(path) = events.path() {
        tracing::info!(run_id = %run_id, events = %path.display(), "run events recorded");
    }
    match outcome {
        RunOutcome::Blocked(notice) => {
            eprintln!("{notice}");
            Ok(2)
        }
        RunOutcome::Completed(report) => {
            let mut extra = Map::new();
            extra.insert("dryrun".to_string(), Value::Bool(args.backend.dryrun));
            write_run_outputs(&args.out, &run_id, &report, &extra)?;
            print_report(&report);
            println!("Results written to {}", args.out.display());
            Ok(0)
        }
    }
}

fn write_run_outputs(
    out_dir: &Path,
    run_id: &str,
    report: &RunReport,
    extra: &Map<String, Value>,
) -> Result<()> {
    fs::write(out_dir.join("inventory.txt"), report.inventory.aggregate_text() + "\n")?;
    fs::write(out_dir.join("plan.md"), report.plan.display_text().to_string() + "\n")?;

    let mut visuals = Vec::new();
    for visual in &report.visualizations {
        let file = format!("target-{}.png", visual.slot.key());
        let written = match &visual.image {
            Some(image) => {
                let bytes = encode_png(image)?;
                fs::write(out_dir.join(&file), bytes)
                    .with_context(|| format!("failed to write {file}"))?;
                true
            }
            None => false,
        };
        visuals.push(json!({
            "compartment": visual.slot.name(),
            "file": if written { Value::String(file) } else { Value::Null },
            "failure": visual.failure.as_ref().map(|failure| failure.to_string()),
        }));
    }

    let mut extra = extra.clone();
    extra.insert("visuals".to_string(), Value::Array(visuals));
    write_summary(&out_dir.join("summary.json"), &report.summary(run_id), Some(&extra))
}

fn print_report(report: &RunReport) {
    println!();
    for line in report.inventory.aggregate_text().lines() {
        println!("{line}");
    }
    println!();
    println!("{}", report.plan.display_text());
    println!();
    for visual in &report.visualizations {
        match visual.warning() {
            Some(warning) => println!("Target State: {} - {warning}", visual.slot.name()),
            None => println!("Target State: {} - rendered", visual.slot.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use ambush_engine::NoProgress;
    use image::{DynamicImage, Rgb, RgbImage};

    use super::*;

    #[test]
    fn run_args_parse_preferences_and_photos() {
        let cli = Cli::try_parse_from([
            "ambush",
            "run",
            "--cab1",
            "a.jpg",
            "--cab3",
            "c.jpg",
            "--no-rearrange",
            "--equipment",
            "suggest-bins",
            "--dryrun",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        let prefs = args.preferences();
        assert!(!prefs.allow_rearrange);
        assert!(prefs.allows_purchases());
        let slots: Vec<CompartmentSlot> = args
            .photo_paths()
            .into_iter()
            .map(|(slot, _)| slot)
            .collect();
        assert_eq!(slots, vec![CompartmentSlot::First, CompartmentSlot::Third]);
        assert!(args.backend.dryrun);
    }

    #[test]
    fn serve_args_default_bind() {
        let cli = Cli::try_parse_from(["ambush", "serve"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert!(!args.bind.is_empty());
        assert!(!args.backend.dryrun);
    }

    #[test]
    fn dryrun_provisions_a_placeholder_credential() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let cli = Cli::try_parse_from([
            "ambush",
            "serve",
            "--dryrun",
            "--secrets",
            temp.path().join("missing.toml").to_str().unwrap_or_default(),
        ])?;
        let Command::Serve(args) = cli.command else {
            anyhow::bail!("expected serve command");
        };
        assert!(args.backend.provisioned_credential()?.is_some());
        Ok(())
    }

    #[test]
    fn run_outputs_are_written_to_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut captures = CaptureSet::new();
        captures.insert(
            CompartmentSlot::Second,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 20, Rgb([9, 9, 9]))),
        );
        let credential = Credential::new(DRYRUN_CREDENTIAL).unwrap();
        let RunOutcome::Completed(report) = Pipeline::new(Backends::dryrun()).run(
            Some(&credential),
            &captures,
            PlanPreferences::default(),
            &mut NoProgress,
        ) else {
            anyhow::bail!("dryrun run was blocked");
        };

        write_run_outputs(temp.path(), "run-x", &report, &Map::new())?;

        let inventory = fs::read_to_string(temp.path().join("inventory.txt"))?;
        assert!(inventory.starts_with("Cab 2 contains: "));
        assert!(fs::read_to_string(temp.path().join("plan.md"))?.contains("The Zoning"));
        assert!(temp.path().join("target-cab2.png").exists());
        let summary: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("summary.json"))?)?;
        assert_eq!(summary["run_id"], "run-x");
        assert_eq!(summary["visuals_rendered"], 1);
        assert_eq!(summary["visuals"][0]["file"], "target-cab2.png");
        Ok(())
    }
}
