//================================================
// [levelscript runtime]
//================================================
// Goal: Run a level script for a number of frames and report the resulting level state
// Objective: Load content, configure the interpreter and drive it one execute call per tick
//================================================

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

use levelscript::bytecode::ScriptPtr;
use levelscript::{LevelVm, ScriptStatus, VmConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Runs a level script against a content image",
    long_about = None
)]
struct Cli {
    /// Script to run, in the layout selected by the configuration
    script: PathBuf,
    /// Content image that segment loads read from
    #[arg(short, long)]
    image: Option<PathBuf>,
    /// TOML interpreter configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Segment the script is mapped at so its own addresses resolve
    #[arg(long, default_value_t = 0x10)]
    segment: u8,
    /// Maximum number of frames to run
    #[arg(long, default_value_t = 60)]
    ticks: u32,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct AreaReport {
    index: u8,
    warp_nodes: usize,
    spawns: usize,
    has_camera: bool,
}

#[derive(Debug, Serialize)]
struct RunReport {
    ticks: u32,
    status: ScriptStatus,
    register: i32,
    cursor: Option<String>,
    stack_depth: usize,
    current_area: Option<u8>,
    loaded_area: Option<u8>,
    areas: Vec<AreaReport>,
    diagnostics: Vec<String>,
}

fn init_tracing() {
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_target(true)
        .compact()
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<VmConfig> {
    match path {
        Some(path) => Ok(VmConfig::from_file(path)?),
        None => Ok(VmConfig::default()),
    }
}

fn run(vm: &mut LevelVm, start: ScriptPtr, ticks: u32) -> Result<u32> {
    let mut cursor = start;
    for tick in 0..ticks {
        cursor = vm
            .execute(cursor)
            .with_context(|| format!("script faulted on tick {tick}"))?;
        if vm.status() == ScriptStatus::Exited {
            return Ok(tick + 1);
        }
    }
    Ok(ticks)
}

fn report(vm: &LevelVm, ticks: u32, diagnostics: Vec<String>) -> RunReport {
    let level = vm.level();
    RunReport {
        ticks,
        status: vm.status(),
        register: vm.register(),
        cursor: vm.cursor().map(|ptr| ptr.to_string()),
        stack_depth: vm.stack().depth(),
        current_area: level.current_area(),
        loaded_area: level.loaded_area(),
        areas: level
            .areas()
            .map(|area| AreaReport {
                index: area.index,
                warp_nodes: area.warp_nodes.len(),
                spawns: area.spawns.len(),
                has_camera: area.root.camera.is_some(),
            })
            .collect(),
        diagnostics,
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let script = fs::read(&cli.script)
        .with_context(|| format!("failed to read {}", cli.script.display()))?;
    let image = match &cli.image {
        Some(path) => {
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?
        }
        None => Vec::new(),
    };

    let mut vm = LevelVm::with_content(config, image);
    let collected = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    vm.diagnostics()
        .set_sink(move |diagnostic| sink.lock().push(diagnostic.to_string()));

    let start = vm.install_script(script);
    vm.memory_mut()
        .map_segment(cli.segment, start.buffer)
        .with_context(|| format!("cannot map the script at segment 0x{:02X}", cli.segment))?;

    info!(script = %cli.script.display(), ticks = cli.ticks, "running level script");
    let ticks = run(&mut vm, start, cli.ticks)?;
    let diagnostics = std::mem::take(&mut *collected.lock());
    let report = report(&vm, ticks, diagnostics);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{:?} after {} tick(s), register {}, {} area(s)",
            report.status,
            report.ticks,
            report.register,
            report.areas.len()
        );
        for area in &report.areas {
            println!(
                "  area {}: {} warp node(s), {} spawn(s)",
                area.index, area.warp_nodes, area.spawns
            );
        }
        for diagnostic in &report.diagnostics {
            println!("  ! {diagnostic}");
        }
    }
    Ok(())
}
