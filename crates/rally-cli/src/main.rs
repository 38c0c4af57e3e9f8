//! `rally-cli` – runs a course mission against the built-in simulator.
//!
//! ```text
//! rally [racer|ultra] [--config PATH] [--check] [--init]
//! ```
//!
//! 1. Loads `~/.rally/config.toml` (or `--config PATH`), then applies
//!    `RALLY_*` overrides.  `--init` writes the defaults there and exits.
//! 2. Builds the course graph; a configuration error is fatal.
//!    `--check` prints the transition tables and exits.
//! 3. Runs the mission against the kinematic simulator until it completes,
//!    exits, or Ctrl-C cancels it.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use tracing::{error, info, warn};

use rally_hal::sim::{RecordingDrive, ScriptedVision, SimIndicators, SimNavigator, SimSound};
use rally_middleware::{CancelToken, SensorFeeds};
use rally_perception::transform::SharedTfTree;
use rally_runtime::config::{Course, MissionConfig};
use rally_runtime::fsm::{Engine, Terminal};
use rally_runtime::graphs::{self, CourseGraph, START_STATE};
use rally_runtime::mission::{Mission, RobotIo};
use rally_runtime::sim::{KinematicDrive, SimWorld, SyntheticCourse, TeleportNavigator};
use rally_types::{Shape, ShapeMask};

#[derive(Debug, Default)]
struct Args {
    course: Option<Course>,
    config: Option<PathBuf>,
    check: bool,
    init: bool,
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut args = Args::default();
    let mut raw = raw.into_iter();
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--check" => args.check = true,
            "--init" => args.init = true,
            "--config" => {
                let path = raw.next().ok_or("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            other if other.starts_with("--") => return Err(format!("unknown flag {other}")),
            other => {
                let course = other.parse().map_err(|e| format!("{e}"))?;
                args.course = Some(course);
            }
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let _guard = rally_runtime::telemetry::init_tracing("rally");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "Usage error".red(), e);
            eprintln!("  rally [racer|ultra] [--config PATH] [--check] [--init]");
            return ExitCode::from(2);
        }
    };

    print_banner();

    let path = args.config.clone().unwrap_or_else(config::config_path);
    if args.init {
        return match config::save_to(&MissionConfig::default(), &path) {
            Ok(()) => {
                println!("  {} Defaults written to {}", "✓".green().bold(), path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!("  No config at {}; using defaults.", path.display().to_string().dimmed());
            MissionConfig::default()
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    config::apply_env_overrides(&mut cfg);
    if let Some(course) = args.course {
        cfg.launch.course = course;
    }

    let graph = match graphs::build(&cfg) {
        Ok(graph) => graph,
        Err(e) => {
            error!(error = %e, course = %cfg.launch.course, "invalid mission graph");
            eprintln!("{}: {}", "Mission graph rejected".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "  Course {} with {} states",
        cfg.launch.course.to_string().bold(),
        graph.len()
    );

    if args.check {
        print_graph(&graph);
        return ExitCode::SUCCESS;
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        on_signal.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the mission cannot be cancelled");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Runtime error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_simulated(graph, cfg, cancel)) {
        Ok(Terminal::Complete) => {
            println!("  {} Course complete.", "✓".green().bold());
            ExitCode::SUCCESS
        }
        Ok(Terminal::Exit) => {
            println!("  {} Mission exited early.", "!".yellow().bold());
            ExitCode::from(3)
        }
        Err(e) => {
            eprintln!("{}: {}", "Mission failed".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Wire the mission to the kinematic simulator and run it.
async fn run_simulated(
    graph: CourseGraph,
    cfg: MissionConfig,
    cancel: CancelToken,
) -> Result<Terminal, rally_types::MissionError> {
    let period = cfg.tick_period();
    let feeds = SensorFeeds::new();
    let tf = SharedTfTree::new();
    let world = SimWorld::new(feeds.clone(), tf.clone(), period);

    let vision = ScriptedVision::new()
        .with_counts([2, 2, 3, 2])
        .with_shapes(ShapeMask::Green, [Shape::Square])
        .with_shapes(ShapeMask::Red, [Shape::Square]);

    let io = RobotIo {
        drive: Box::new(KinematicDrive::new(world.clone(), RecordingDrive::new())),
        indicators: Box::new(SimIndicators::new()),
        sound: Box::new(SimSound::new()),
        navigator: Box::new(TeleportNavigator::new(world, tf.clone(), SimNavigator::new())),
        vision: Box::new(vision),
        transforms: std::sync::Arc::new(tf.clone()),
        broadcaster: std::sync::Arc::new(tf),
    };
    let mut mission = Mission::new(io, feeds.readers(), cfg, cancel);

    let mut engine = Engine::new(graph);
    let course = tokio::spawn(SyntheticCourse::new(feeds).run(engine.observer(), period));

    let mut observer = engine.observer();
    let progress = tokio::spawn(async move {
        while observer.changed().await.is_ok() {
            if let Some(state) = observer.borrow_and_update().clone() {
                println!("  {} {}", "→".cyan(), state);
            }
        }
    });

    info!(start = START_STATE, "mission starting");
    let result = engine.run(START_STATE, &mut mission).await;
    drop(engine);
    course.abort();
    let _ = progress.await;
    result
}

fn print_graph(graph: &CourseGraph) {
    for name in graph.state_names() {
        println!("  {}", name.bold());
        for (outcome, next) in graph.transitions(name) {
            println!("    {:<18} → {}", format!("{outcome:?}"), next);
        }
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___       ____   "#.bold().cyan());
    println!("{}", r#"  / _ \___ _/ / /_ __"#.bold().cyan());
    println!("{}", r#" / , _/ _ `/ / / // /"#.bold().cyan());
    println!("{}", r#"/_/|_|\_,_/_/_/\_, / "#.bold().cyan());
    println!("{}", r#"              /___/  "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Rally".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Autonomous course mission runner");
    println!();
}
