use std::path::PathBuf;

use clap::Parser;

use common::config::{ConfigManager, FileContentConfigProvider};
use common::{SessionRng, log, logger};
use snake_observer_server::cleanup_task::CleanupTask;
use snake_observer_server::control_seat::ControlSeat;
use snake_observer_server::game_clock::{ClockSettings, GameClock};
use snake_observer_server::mode_controller::ModeController;
use snake_observer_server::pull::PullDelay;
use snake_observer_server::server_config::{ServerConfig, CLEANUP_CHECK_INTERVAL};
use snake_observer_server::web_server::{run_web_server, WebServerState};

#[derive(Parser)]
#[command(name = "snake_observer_server")]
struct Args {
    /// Path to the YAML config; defaults apply when the file is missing
    #[arg(long, default_value = "server_config.yaml")]
    config: String,

    #[arg(long)]
    use_log_prefix: bool,

    /// Write the effective config back to `--config` and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let prefix = if args.use_log_prefix {
        Some("Server".to_string())
    } else {
        None
    };
    logger::init_logger(prefix);

    let config_manager = ConfigManager::<FileContentConfigProvider, ServerConfig>::from_yaml_file(&args.config);
    let config = config_manager.get_config()?;

    if args.write_default_config {
        config_manager.set_config(&config)?;
        log!("Config written to {}", args.config);
        return Ok(());
    }

    let seat = ControlSeat::new();
    let mode = ModeController::new(config.start_mode, seat.clone());
    let rng = SessionRng::from_optional_seed(config.rng_seed);

    let clock = GameClock::new(
        ClockSettings {
            snake: config.game.clone(),
            tick_interval: config.tick_interval(),
            buffer_capacity: config.observer_buffer_size,
        },
        rng,
        mode.clone(),
    );
    let clock_handle = clock.handle();
    let broadcaster = clock.broadcaster();
    let clock_task = tokio::spawn(clock.run());

    let cleanup_task = CleanupTask::new(
        seat.clone(),
        clock_handle.clone(),
        CLEANUP_CHECK_INTERVAL,
        config.controller_inactivity_timeout(),
    );
    tokio::spawn(async move {
        cleanup_task.run().await;
    });

    let state = WebServerState {
        broadcaster,
        clock: clock_handle.clone(),
        mode,
        seat,
        pull_delay: PullDelay::new(config.pull_delay_ms),
        spectator_idle_timeout: config.spectator_idle_timeout(),
        spectator_send_timeout: config.spectator_send_timeout(),
    };

    let shutdown_clock = clock_handle.clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }

        log!("Shutdown signal received, closing spectator channels...");
        shutdown_clock.shutdown();
    };

    run_web_server(
        state,
        &config.listen_addr,
        config.static_files_path.as_ref().map(PathBuf::from),
        shutdown_signal,
    )
    .await?;

    clock_handle.shutdown();
    clock_task.await?;

    log!("Server shut down gracefully");

    Ok(())
}
