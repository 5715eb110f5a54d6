use std::time::Duration;

use clockface::SyncStateMachine;
use log::{error, info};
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::display::ClockFace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockCtrlMessage {
    Retry,
}

/// Drives the sync machine from a fixed-rate tick and publishes the clock
/// face whenever it changes.
pub fn run_sync_loop(
    task_tracker: &TaskTracker,
    tick_interval: Duration,
    mut machine: SyncStateMachine,
    mut ctrl_rx: Receiver<ClockCtrlMessage>,
    ui_update_tx: Sender<ClockFace>,
    shutdown_token: CancellationToken,
) {
    task_tracker.spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ctrl_open = true;
        let mut last_face: Option<ClockFace> = None;

        loop {
            select! {
                _ = shutdown_token.cancelled() => {
                    info!("received sync loop shutdown");
                    return;
                }
                msg = ctrl_rx.recv(), if ctrl_open => match msg {
                    Some(ClockCtrlMessage::Retry) => {
                        info!("retrying clock sync");
                        machine.retry();
                    }
                    None => ctrl_open = false,
                },
                _ = interval.tick() => {}
            }

            machine.tick(Instant::now().into_std());
            let face = ClockFace::from_machine(&machine);
            if last_face.as_ref() == Some(&face) {
                continue;
            }
            if let Err(e) = ui_update_tx.send(face.clone()).await {
                error!("failed to publish clock face: {e}");
            }
            last_face = Some(face);
        }
    });
}

/// `kill -USR1` does the same as the retry button.
pub fn run_retry_signal_thread(
    task_tracker: &TaskTracker,
    ctrl_tx: Sender<ClockCtrlMessage>,
    shutdown_token: CancellationToken,
) {
    task_tracker.spawn(async move {
        let mut usr1 = match signal(SignalKind::user_defined1()) {
            Ok(usr1) => usr1,
            Err(e) => {
                error!("failed to listen for SIGUSR1: {e}");
                return;
            }
        };
        loop {
            select! {
                _ = shutdown_token.cancelled() => return,
                received = usr1.recv() => {
                    if received.is_none() {
                        return;
                    }
                    info!("retry requested by SIGUSR1");
                    if let Err(e) = ctrl_tx.send(ClockCtrlMessage::Retry).await {
                        error!("Failed to send Retry: {e}");
                        return;
                    }
                }
            }
        }
    });
}
