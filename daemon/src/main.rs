use std::sync::Arc;

use clockface::SyncStateMachine;
use clockface_daemon::config::{self, parse_args, parse_config};
use clockface_daemon::display::{ClockFace, run_display_thread};
use clockface_daemon::error::ClockfaceError;
use clockface_daemon::http::{HttpClockFetcher, install_crypto_provider};
use clockface_daemon::key_input::run_key_input_thread;
use clockface_daemon::link::SysfsLink;
use clockface_daemon::sync_loop::{ClockCtrlMessage, run_retry_signal_thread, run_sync_loop};
use log::{error, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

fn run_shutdown_thread(task_tracker: &TaskTracker, shutdown_token: CancellationToken) {
    info!("create shutdown thread");

    task_tracker.spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    error!("Unable to listen for shutdown signal: {err}");
                }
            }
            _ = shutdown_token.cancelled() => {}
        }
        shutdown_token.cancel();
    });
}

async fn run_with_config(config: config::Config) -> Result<(), ClockfaceError> {
    // TaskTrackers give us an interface to spawn tokio threads, and then
    // eventually await all of them ending
    let task_tracker = TaskTracker::new();
    let shutdown_token = CancellationToken::new();

    let fetcher = Arc::new(HttpClockFetcher::new(&config)?);
    let link = Box::new(SysfsLink::new(&config.network));
    let machine = SyncStateMachine::new(config.sync_config(), link, fetcher);

    let (ctrl_tx, ctrl_rx) = mpsc::channel::<ClockCtrlMessage>(1);
    let (ui_update_tx, ui_update_rx) = mpsc::channel::<ClockFace>(1);

    info!("Starting UI");
    run_display_thread(&task_tracker, ui_update_rx, shutdown_token.clone());

    info!("Starting Key Input service");
    run_key_input_thread(&task_tracker, &config, ctrl_tx.clone(), shutdown_token.clone());
    run_retry_signal_thread(&task_tracker, ctrl_tx, shutdown_token.clone());

    info!("Starting clock sync");
    run_sync_loop(
        &task_tracker,
        config.tick_interval(),
        machine,
        ctrl_rx,
        ui_update_tx,
        shutdown_token.clone(),
    );

    run_shutdown_thread(&task_tracker, shutdown_token);

    task_tracker.close();
    task_tracker.wait().await;

    info!("clock stopped");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClockfaceError> {
    env_logger::init();
    install_crypto_provider();

    let args = parse_args();
    let config = parse_config(&args.config_path).await?;
    run_with_config(config).await
}
