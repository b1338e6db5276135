//! frameflow - command-line pipeline runner
//!
//! Loads a project file (or builds a demo pipeline), runs it to completion on
//! the sequential kernel and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use frameflow::config::{KernelConfig, ProjectFile};
use frameflow::pipeline::{Kernel, KernelState, LifecycleState, Notifier, ParameterValue, SequentialKernel};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Frame count of the built-in demo pipeline when no bound is given.
const DEMO_FRAMES: i64 = 100;

#[derive(Parser)]
#[command(name = "frameflow")]
#[command(author, version, about = "Run a frameflow pipeline", long_about = None)]
struct Args {
    /// Project file to run (.ffproj); the demo pipeline is used when omitted
    #[arg(value_name = "PROJECT")]
    project: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long, value_name = "N")]
    frames: Option<u64>,

    /// Kernel configuration file (TOML)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Save the pipeline as a project file before running
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,frameflow=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::load_or_default(),
    };
    if let Some(frames) = args.frames {
        config.max_frames = frames;
    }

    let project = match &args.project {
        Some(path) => ProjectFile::load(path)?,
        None => demo_project(),
    };

    let kernel = SequentialKernel::new(config)?;
    project
        .apply(&kernel)
        .with_context(|| format!("building pipeline '{}'", project.name))?;

    if let Some(path) = &args.save {
        ProjectFile::capture(&kernel, project.name.clone()).save(path)?;
        tracing::info!("Saved project to {:?}", path);
    }

    let notifier = kernel.notifier();
    let started = Instant::now();

    kernel.init()?;
    let state = wait_until(&notifier, |s| s.state == LifecycleState::Initialized);
    if let Some(code) = report_failure(&state) {
        return Ok(code);
    }

    kernel.start()?;
    let state = wait_until(&notifier, |s| s.state == LifecycleState::Stopped);
    if let Some(code) = report_failure(&state) {
        return Ok(code);
    }

    println!(
        "{}: {} frames through {} modules in {:.2?}",
        if project.name.is_empty() { "pipeline" } else { project.name.as_str() },
        state.frame,
        kernel.get_modules().len(),
        started.elapsed()
    );
    kernel.exit();
    Ok(ExitCode::SUCCESS)
}

/// PatternSource → Invert → NullSink.
fn demo_project() -> ProjectFile {
    ProjectFile::new("demo")
        .with_module("PatternSource", "source")
        .with_parameter("frames", ParameterValue::Int(DEMO_FRAMES))
        .with_module("Invert", "invert")
        .with_module("NullSink", "sink")
        .with_connection("source.out", "invert.in")
        .with_connection("invert.out", "sink.in")
}

/// Block on the notifier until a published state satisfies `done` or carries
/// an exception.
fn wait_until(notifier: &Notifier<KernelState>, done: impl Fn(&KernelState) -> bool) -> KernelState {
    loop {
        let state = notifier.wait_notification();
        if state.is_exception_raised() || done(&state) {
            return state;
        }
    }
}

fn report_failure(state: &KernelState) -> Option<ExitCode> {
    let error = state.exception()?;
    eprintln!("error: {} (kernel {})", error, state.state);
    Some(ExitCode::FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_project_runs_to_bound() {
        let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
        demo_project().apply(&kernel).unwrap();
        let notifier = kernel.notifier();

        kernel.init().unwrap();
        let state = wait_until(&notifier, |s| s.state == LifecycleState::Initialized);
        assert_eq!(state.state, LifecycleState::Initialized);
        assert!(report_failure(&state).is_none());

        kernel.start().unwrap();
        let state = wait_until(&notifier, |s| s.state == LifecycleState::Stopped);
        assert!(report_failure(&state).is_none());
        assert_eq!(state.frame, DEMO_FRAMES as u64);
    }

    #[test]
    fn test_init_failure_ends_wait() {
        let kernel = SequentialKernel::new(KernelConfig::default()).unwrap();
        ProjectFile::new("broken")
            .with_module("Invert", "invert")
            .apply(&kernel)
            .unwrap();
        let notifier = kernel.notifier();

        kernel.init().unwrap();
        let state = wait_until(&notifier, |s| s.state == LifecycleState::Initialized);
        assert_eq!(state.state, LifecycleState::Uninitialized);
        assert!(report_failure(&state).is_some());
    }
}
