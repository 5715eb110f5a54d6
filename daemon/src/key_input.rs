use log::{error, info};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config;
use crate::sync_loop::ClockCtrlMessage;

#[derive(Debug, Clone, Copy)]
enum Event {
    KeyDown,
    KeyUp,
}

const INPUT_EVENT_SIZE: usize = 32;
const DEBOUNCE: Duration = Duration::from_millis(50);
const DOUBLE_PRESS_MIN: Duration = Duration::from_millis(100);
const DOUBLE_PRESS_MAX: Duration = Duration::from_millis(800);

/// Turns raw key events into retry requests.
///
/// Mode 1 retries on every release, mode 2 wants two releases between 100ms
/// and 800ms apart so a stray bump doesn't throw away a good sync.
struct RetryButton {
    double_press: bool,
    last_event: Option<Instant>,
    last_keyup: Option<Instant>,
}

impl RetryButton {
    fn new(mode: u8) -> Self {
        RetryButton {
            double_press: mode >= 2,
            last_event: None,
            last_keyup: None,
        }
    }

    fn on_event(&mut self, event: Event, now: Instant) -> bool {
        // Some power buttons fire a burst of events per press.
        if let Some(last_time) = self.last_event
            && now.duration_since(last_time) < DEBOUNCE
        {
            self.last_event = Some(now);
            return false;
        }
        self.last_event = Some(now);

        let Event::KeyUp = event else {
            return false;
        };
        if !self.double_press {
            return true;
        }
        if let Some(last_keyup) = self.last_keyup {
            let elapsed = now.duration_since(last_keyup);
            if (DOUBLE_PRESS_MIN..=DOUBLE_PRESS_MAX).contains(&elapsed) {
                self.last_keyup = None;
                return true;
            }
        }
        self.last_keyup = Some(now);
        false
    }
}

pub fn run_key_input_thread(
    task_tracker: &TaskTracker,
    config: &config::Config,
    ctrl_tx: Sender<ClockCtrlMessage>,
    cancellation_token: CancellationToken,
) {
    if config.key_input_mode == 0 {
        return;
    }
    let device = config.key_input_device.clone();
    let mut button = RetryButton::new(config.key_input_mode);

    task_tracker.spawn(async move {
        let mut file = match File::open(&device).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open {device}: {e}");
                return;
            }
        };

        let mut buffer = [0u8; INPUT_EVENT_SIZE];
        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("received key input shutdown");
                    return;
                }
                result = file.read_exact(&mut buffer) => {
                    if let Err(e) = result {
                        error!("failed to read key input: {e}");
                        return;
                    }
                }
            }

            if button.on_event(parse_event(buffer), Instant::now()) {
                info!("retry requested from key input");
                if let Err(e) = ctrl_tx.send(ClockCtrlMessage::Retry).await {
                    error!("Failed to send Retry: {e}");
                }
            }
        }
    });
}

fn parse_event(input: [u8; INPUT_EVENT_SIZE]) -> Event {
    if input[12] == 0 {
        Event::KeyUp
    } else {
        Event::KeyDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_parse_event_keydown() {
        let input = [
            0x57, 0x6c, 0x09, 0x00, 0x7c, 0xfb, 0x03, 0x00, 0x01, 0x00, 0x74, 0x00, 0x01, 0x00,
            0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert!(matches!(parse_event(input), Event::KeyDown));
    }

    #[test]
    fn test_parse_event_keyup() {
        let input = [
            0x57, 0x6c, 0x09, 0x00, 0x1b, 0x15, 0x05, 0x00, 0x01, 0x00, 0x74, 0x00, 0x00, 0x00,
            0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert!(matches!(parse_event(input), Event::KeyUp));
    }

    #[test]
    fn test_single_press_mode() {
        let start = Instant::now();
        let mut button = RetryButton::new(1);
        assert!(!button.on_event(Event::KeyDown, start));
        assert!(button.on_event(Event::KeyUp, start + ms(120)));
        assert!(button.on_event(Event::KeyUp, start + ms(2000)));
    }

    #[test]
    fn test_double_press_window() {
        let start = Instant::now();
        let mut button = RetryButton::new(2);
        assert!(!button.on_event(Event::KeyUp, start));
        assert!(button.on_event(Event::KeyUp, start + ms(300)));

        // a pair consumed, the next release starts over
        assert!(!button.on_event(Event::KeyUp, start + ms(600)));

        // too slow
        assert!(!button.on_event(Event::KeyUp, start + ms(1500)));
        assert!(button.on_event(Event::KeyUp, start + ms(1900)));
    }

    #[test]
    fn test_bursts_are_debounced() {
        let start = Instant::now();
        let mut button = RetryButton::new(1);
        assert!(button.on_event(Event::KeyUp, start));
        assert!(!button.on_event(Event::KeyUp, start + ms(20)));
        assert!(!button.on_event(Event::KeyUp, start + ms(60)));
        assert!(button.on_event(Event::KeyUp, start + ms(200)));
    }
}
