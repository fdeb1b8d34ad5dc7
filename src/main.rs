use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use peregrine_ai::ai::collections::CollectionCache;
use peregrine_ai::ai::config::{AiConfig, AI_CONFIG_PATH};
use peregrine_ai::ai::driver::DecisionClock;
use peregrine_ai::ai::persistence::save_manifest;
use peregrine_ai::ai::skirmish::{SkirmishPlugin, SkirmishSettings};
use peregrine_ai::ai::AiPlugin;

const DEFAULT_TURNS: u64 = 600;
const MANIFEST_PATH: &str = "logs/ai_manifest.bin";

fn setup_file_logging() -> std::io::Result<String> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep only the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("peregrine_ai_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,bevy_app=info,peregrine_ai=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(log_path_str)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return;
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|s| s.starts_with("peregrine_ai") && s.ends_with(".log"))
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

    if log_files.len() > keep_count {
        for file in log_files.iter().take(log_files.len() - keep_count) {
            let _ = fs::remove_file(file.path());
        }
    }
}

fn main() {
    let log_file = match setup_file_logging() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Failed to set up logging: {}", e);
            std::process::exit(1);
        }
    };

    let mut args = std::env::args().skip(1);
    let turns = args.next().and_then(|a| a.parse().ok()).unwrap_or(DEFAULT_TURNS);
    let seed = args.next().and_then(|a| a.parse().ok()).unwrap_or(42);

    println!("Peregrine AI skirmish: {} turns, seed {}", turns, seed);
    println!("Log file: {}", log_file);

    let config = AiConfig::load_or_default(AI_CONFIG_PATH);
    let step = Duration::from_secs_f64(1.0 / config.tick_hz());
    let settings = SkirmishSettings {
        players: 4,
        ..Default::default()
    };

    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(AiPlugin::with_config(config).with_players(settings.players))
        .add_plugins(SkirmishPlugin {
            settings,
            ..SkirmishPlugin::new(seed)
        })
        .insert_resource(TimeUpdateStrategy::ManualDuration(step));
    app.finish();
    app.cleanup();

    // Every update advances virtual time by exactly one fixed step.
    while app.world().resource::<DecisionClock>().turn < turns {
        app.update();
    }

    let clock = *app.world().resource::<DecisionClock>();
    let cache = app.world().resource::<CollectionCache>();
    info!(
        "Finished {} turns ({} decision cycles), {} cached collections",
        clock.turn,
        clock.cycles_run,
        cache.len()
    );
    if let Err(e) = save_manifest(MANIFEST_PATH, &cache.manifest()) {
        error!("Failed to save cache manifest: {}", e);
    } else {
        info!("Saved cache manifest to {}", MANIFEST_PATH);
    }
}
