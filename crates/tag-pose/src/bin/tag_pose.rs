use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use serde_json::json;

use tag_pose::camera::CameraSession;
use tag_pose::estimate::EstimateOutcome;
use tag_pose::io::{EstimateConfig, EstimateReport, TagPoseIoError};
use tag_pose::replay::Recording;
use tag_pose::{CameraIdentity, IntrinsicsTable, ModuleError, PoseEstimationLoop, TagPoseModule};

#[derive(Parser, Debug)]
#[command(
    name = "tag-pose",
    version,
    about = "Fiducial tag pose estimation over recorded camera sessions"
)]
struct Cli {
    /// Log level for the stderr logger (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,
    /// Level for records from dependencies; defaults to `warn` or `--log-level`, if lower.
    #[arg(long, global = true, value_parser = parse_level)]
    dependency_log_level: Option<LevelFilter>,
    /// Emit tracing output as JSON lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the intrinsics and camera matrix used for a camera/resolution pair.
    Intrinsics {
        /// Camera index: 0 = top, 1 = bottom.
        #[arg(long, default_value_t = 1)]
        camera: i32,
        /// Resolution index: 0 = 320x240, 1 = 640x480.
        #[arg(long, default_value_t = 0)]
        resolution: i32,
    },
    /// Replay a recording described by a JSON config and write a report.
    Estimate {
        config: PathBuf,
        /// Report path; overrides `output_path` from the config.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Marker id to look for; overrides `target` from the config.
        #[arg(long)]
        tag: Option<u32>,
    },
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse().map_err(|_| format!("unknown log level '{s}'"))
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Io(#[from] TagPoseIoError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Command::Intrinsics { camera, resolution } => print_intrinsics(camera, resolution),
        Command::Estimate {
            config,
            output,
            tag,
        } => run_estimate(&config, output, tag),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    let _ = match cli.dependency_log_level {
        Some(dependency_level) => {
            tag_pose::core::init_with_levels(cli.log_level, dependency_level)
        }
        None => tag_pose::core::init_with_level(cli.log_level),
    };
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    // RUST_LOG drives filtering once tracing is installed.
    let _ = (cli.log_level, cli.dependency_log_level);
    tag_pose::core::init_tracing(cli.json_logs);
}

fn print_intrinsics(camera: i32, resolution: i32) -> Result<ExitCode, CliError> {
    let identity = CameraIdentity::from_index(camera).map_err(ModuleError::from)?;
    let intrinsics = IntrinsicsTable::default()
        .lookup_index(identity, resolution)
        .map_err(ModuleError::from)?;
    let k = intrinsics.camera_matrix();
    let rows: Vec<[f32; 3]> = (0..3).map(|r| [k[(r, 0)], k[(r, 1)], k[(r, 2)]]).collect();
    let out = json!({
        "camera": identity,
        "resolution": intrinsics.frame_size(),
        "focal_length": intrinsics.focal_length,
        "camera_matrix": rows,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(ExitCode::SUCCESS)
}

fn run_estimate(
    config_path: &Path,
    output: Option<PathBuf>,
    tag: Option<u32>,
) -> Result<ExitCode, CliError> {
    let mut config = EstimateConfig::load_json(config_path)?;
    if let Some(dir) = config_path.parent() {
        config.resolve_paths(dir);
    }
    if tag.is_some() {
        config.target = tag;
    }
    let output = output.unwrap_or_else(|| config.output_path());

    let mut report = EstimateReport::new(config_path.display().to_string(), &config);
    let code = match estimate(&config) {
        Ok(outcome) => {
            info!(
                "{} record(s) after {} frame(s)",
                outcome.records.len(),
                outcome.frames_consumed
            );
            report.set_outcome(outcome);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("estimation failed: {err}");
            report.set_error(&err);
            ExitCode::FAILURE
        }
    };

    report.write_json(&output)?;
    println!("wrote report JSON to {}", output.display());
    Ok(code)
}

fn estimate(config: &EstimateConfig) -> Result<EstimateOutcome, CliError> {
    let (camera, detector) = Recording::load_json(&config.recording_path)?.into_replay();

    let table = match &config.intrinsics {
        Some(table) => IntrinsicsTable::from_entries(table.entries().iter().copied())
            .map_err(ModuleError::from)?,
        None => IntrinsicsTable::default(),
    };
    let markers = config.build_marker_config().map_err(ModuleError::from)?;
    let estimator = PoseEstimationLoop::new(detector)
        .with_table(table)
        .with_limits(config.limits);

    let mut session = CameraSession::new(camera);
    session
        .set_resolution(config.resolution)
        .map_err(ModuleError::from)?;

    let mut module = TagPoseModule::from_parts(session, markers, estimator);
    module.subscribe_camera_local(config.camera.index())?;
    let outcome = module.estimate(config.target())?;
    module.unsubscribe_camera()?;
    Ok(outcome)
}
