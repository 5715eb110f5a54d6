use std::io::Write;

use clockface::{ConnectivityStatus, SyncPhase, SyncStateMachine};
use log::{error, info};
use serde::Serialize;
use tokio::sync::mpsc::Receiver;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Syncing,
    Synced,
    Error,
}

impl From<SyncPhase> for DisplayState {
    fn from(phase: SyncPhase) -> Self {
        if phase.is_error() {
            DisplayState::Error
        } else if phase == SyncPhase::TimeSynced {
            DisplayState::Synced
        } else {
            DisplayState::Syncing
        }
    }
}

/// Everything a screen needs to draw the clock.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct ClockFace {
    pub date: String,
    pub time: String,
    pub ip: Option<String>,
    pub phase: SyncPhase,
    pub connectivity: ConnectivityStatus,
    pub state: DisplayState,
}

impl ClockFace {
    pub fn from_machine(machine: &SyncStateMachine) -> Self {
        let (date, time) = machine.display_text();
        let phase = machine.phase();
        ClockFace {
            date,
            time,
            ip: machine.identity().map(str::to_string),
            phase,
            connectivity: machine.connectivity(),
            state: phase.into(),
        }
    }
}

/// Prints every new face as one JSON line on stdout, for whatever is
/// driving the actual screen.
pub fn run_display_thread(
    task_tracker: &TaskTracker,
    mut ui_update_rx: Receiver<ClockFace>,
    shutdown_token: CancellationToken,
) {
    task_tracker.spawn(async move {
        loop {
            let face = tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("received UI shutdown");
                    return;
                }
                face = ui_update_rx.recv() => match face {
                    Some(face) => face,
                    None => {
                        info!("clock face channel closed, stopping UI");
                        return;
                    }
                },
            };

            match serde_json::to_string(&face) {
                Ok(line) => {
                    let mut stdout = std::io::stdout().lock();
                    if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
                        error!("failed to write clock face: {e}");
                    }
                }
                Err(e) => error!("failed to serialize clock face: {e}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_state_from_phase() {
        assert_eq!(DisplayState::from(SyncPhase::Init), DisplayState::Syncing);
        assert_eq!(
            DisplayState::from(SyncPhase::FetchingTime),
            DisplayState::Syncing
        );
        assert_eq!(DisplayState::from(SyncPhase::TimeSynced), DisplayState::Synced);
        assert_eq!(
            DisplayState::from(SyncPhase::NetworkUnavailable),
            DisplayState::Error
        );
        assert_eq!(
            DisplayState::from(SyncPhase::TimeUnavailable),
            DisplayState::Error
        );
    }

    #[test]
    fn test_face_serializes_as_one_line() {
        let face = ClockFace {
            date: "Sun, 31st December".to_string(),
            time: "09:05".to_string(),
            ip: Some("198.51.100.7".to_string()),
            phase: SyncPhase::TimeSynced,
            connectivity: ConnectivityStatus::Connected,
            state: DisplayState::Synced,
        };
        let line = serde_json::to_string(&face).unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["time"], "09:05");
        assert_eq!(value["state"], "synced");
        assert_eq!(value["ip"], "198.51.100.7");
    }
}
