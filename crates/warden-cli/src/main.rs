//! Warden CLI - drives the integrity monitor against a simulated host

mod host;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use host::{Game, Placement};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use warden_core::{Warden, WardenConfig};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - runtime integrity monitoring for game state")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Play a simulated session under the monitor
    Run {
        /// Configuration file path (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of pieces to place
        #[arg(short, long, default_value_t = 40)]
        ticks: u64,

        /// Milliseconds between placements
        #[arg(long, default_value_t = 250)]
        tick_ms: u64,

        /// Inject tampering at this tick
        #[arg(long)]
        cheat_at: Option<u64>,

        /// Kind of tampering to inject
        #[arg(long, value_enum, default_value_t = Cheat::Memory)]
        cheat: Cheat,
    },
    /// Run the process scan and debugger check once
    Scan {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Cheat {
    /// Rewrite the shape catalog in memory
    Memory,
    /// Submit an inflated score
    Score,
    /// Fire a burst of scripted key presses
    Input,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match cli.command {
        Commands::Run {
            config,
            ticks,
            tick_ms,
            cheat_at,
            cheat,
        } => {
            let config = load_config(config.as_deref())?;
            let cheat = cheat_at.map(|at| (at, cheat));
            run(config, ticks, Duration::from_millis(tick_ms.max(1)), cheat).await
        }
        Commands::Scan { config } => scan(&load_config(config.as_deref())?),
        Commands::Check { config } => {
            let config = WardenConfig::load(&config).with_context(|| format!("checking {}", config.display()))?;
            println!("Configuration OK\n");
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WardenConfig> {
    match path {
        Some(path) => WardenConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(WardenConfig::default()),
    }
}

async fn run(config: WardenConfig, ticks: u64, period: Duration, cheat: Option<(u64, Cheat)>) -> anyhow::Result<()> {
    let warden = Warden::from_config(config)?;
    let monitor = warden.monitor();
    monitor.on_violation(|event| error!("session aborted: {}", event.message()));

    let mut game = Game::new();
    let catalog = monitor.watch_value(game.catalog());
    info!("shape catalog watched at {catalog:#x}");
    monitor.start(game.tracked())?;
    let view = monitor.state_view();

    let mut interval = tokio::time::interval(period);
    let mut tick = 0;
    while tick < ticks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupted at tick {tick}");
                break;
            }
        }
        if !monitor.is_running() {
            break;
        }
        tick += 1;

        match cheat {
            Some((at, Cheat::Memory)) if at == tick => {
                warn!("tick {tick}: rewriting the shape catalog in place");
                game.tamper_catalog();
            }
            Some((at, Cheat::Score)) if at == tick => {
                let forged = game.score() + 5000;
                warn!("tick {tick}: submitting forged score {forged}");
                if !monitor.validate_state(&game.tracked_with_score(forged)) {
                    warn!("forged score rejected");
                }
                // The rejection stays cached for the rate-limit window.
                continue;
            }
            Some((at, Cheat::Input)) if at == tick => {
                warn!("tick {tick}: firing scripted key presses");
                let rejected = (0..8).filter(|_| !warden.validate_input()).count();
                warn!("{rejected} scripted press(es) rejected");
                warden.reset_input();
                continue;
            }
            _ => {}
        }

        // The background tick validates whatever the host last published.
        view.set(game.tracked());

        if !warden.validate_input() {
            warn!("tick {tick}: input rejected, piece held");
            continue;
        }

        let lines = match game.place_next() {
            Placement::Placed { lines } => lines,
            Placement::ToppedOut => {
                info!("tick {tick}: board topped out, clearing");
                game.restart_board();
                monitor.update_game_state(game.tracked());
                continue;
            }
        };

        let placed = game.tracked();
        if !monitor.validate_state(&placed) {
            error!("tick {tick}: move rejected by the monitor");
            break;
        }
        monitor.update_game_state(placed);

        if lines > 0 {
            game.clear_lines();
            monitor.update_game_state(game.tracked());
            info!("tick {tick}: cleared {lines} line(s), score {}", game.score());
        }
    }

    let state = monitor.stop();
    let journal = warden.journal();
    info!(
        "session over after {tick} tick(s): score {}, lines {}, monitor {state}, {} event(s)",
        game.score(),
        game.lines(),
        journal.len()
    );
    for event in journal.events() {
        println!("{}", event.log_line());
    }

    // The monitor must be stopped before the catalog it reads is freed.
    drop(game);

    let violations = warden.integrity_violations();
    if violations > 0 {
        bail!("{violations} integrity violation(s) recorded");
    }
    Ok(())
}

fn scan(config: &WardenConfig) -> anyhow::Result<()> {
    let mut guard = config.guard.environment_guard()?;

    let metrics = guard.sample_self()?;
    println!(
        "pid {}: cpu {:.1}%, rss {} bytes, {} thread(s)",
        guard.pid(),
        metrics.cpu_load,
        metrics.resident_memory_bytes,
        metrics.thread_count
    );

    match guard.find_suspicious_process() {
        Some(found) => println!("suspicious process: {} (pid {}, matched '{}')", found.name, found.pid, found.pattern),
        None => println!("process scan: clean"),
    }

    if guard.detect_debugger_present() {
        let indicator = guard
            .debugger_mut()
            .indicator()
            .map_or_else(|| "unknown indicator".to_string(), ToString::to_string);
        println!("debugger: {indicator}");
    } else {
        println!("debugger: none");
    }
    Ok(())
}
