//! Stderr logging for the `tag-pose` crates.
//!
//! Lines look like `[  1.204s  INFO camera/session] subscribed bottom camera`:
//! elapsed time since installation, the level, the emitting component and the
//! message. Records from the workspace crates (`tag_pose*` targets) pass at the
//! configured level; records from dependencies such as image decoders are
//! capped separately so they do not drown frame-level debug output.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const WORKSPACE_TARGET: &str = "tag_pose";

struct StderrLogger {
    level: LevelFilter,
    dependency_level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn limit_for(&self, target: &str) -> LevelFilter {
        if is_workspace_target(target) {
            self.level
        } else {
            self.dependency_level
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.limit_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.started.elapsed().as_secs_f64();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:7.3}s {:>5} {}] {}",
            elapsed,
            record.level(),
            component(record.target()),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn is_workspace_target(target: &str) -> bool {
    target
        .split("::")
        .next()
        .is_some_and(|krate| krate.starts_with(WORKSPACE_TARGET))
}

/// `tag_pose_camera::session` -> `camera/session`, `tag_pose` -> `tag-pose`.
/// Foreign targets are kept as they are.
fn component(target: &str) -> String {
    if !is_workspace_target(target) {
        return target.to_string();
    }
    let (krate, module) = target.split_once("::").unwrap_or((target, ""));
    let krate = match krate.strip_prefix("tag_pose_") {
        Some(sub) => sub,
        None => "tag-pose",
    };
    let leaf = module.rsplit("::").next().unwrap_or(module);
    if leaf.is_empty() {
        krate.to_string()
    } else {
        format!("{krate}/{leaf}")
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger. Dependencies are capped at `warn` (or `level`, if lower).
///
/// Calling this more than once is a no-op after the first successful
/// initialization; the first level wins.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    init_with_levels(level, level.min(LevelFilter::Warn))
}

/// Install the stderr logger with separate limits for workspace and dependency targets.
pub fn init_with_levels(
    level: LevelFilter,
    dependency_level: LevelFilter,
) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_none() {
        let logger = LOGGER.get_or_init(|| StderrLogger {
            level,
            dependency_level,
            started: Instant::now(),
        });
        log::set_logger(logger)?;
        log::set_max_level(level.max(dependency_level));
    }
    Ok(())
}

/// Default `tracing` directives: workspace crates at `info`, everything else at `warn`.
#[cfg(feature = "tracing")]
const DEFAULT_TRACING_FILTER: &str =
    "warn,tag_pose=info,tag_pose_core=info,tag_pose_camera=info,tag_pose_estimate=info";

/// Install a `tracing` subscriber filtered by `RUST_LOG`, falling back to
/// workspace crates at `info` and dependencies at `warn`.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TRACING_FILTER));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        let _ = builder.json().flatten_event(true).finish().try_init();
    } else {
        let _ = builder
            .with_timer(fmt::time::Uptime::default())
            .with_target(true)
            .finish()
            .try_init();
    }
}
