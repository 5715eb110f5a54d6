//! Local extrapolation of wall-clock time between network syncs.
//!
//! Once a sync hands over an authoritative [CalendarMoment], the clock is
//! advanced purely from the caller's tick source. Only whole minutes are
//! applied; the leftover fraction stays on the anchor so that a caller
//! ticking every second still rolls the minute over on time.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::calendar::CalendarMoment;

const SECS_PER_MINUTE: u64 = 60;

#[derive(Debug, Clone, Copy)]
struct Extrapolation {
    moment: CalendarMoment,
    anchor: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct LocalClock {
    state: Option<Extrapolation>,
}

impl LocalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current moment with an authoritative one that was valid
    /// at tick `at`.
    pub fn set_baseline(&mut self, moment: CalendarMoment, at: Instant) {
        let calendar_weekday = moment.calendar_weekday();
        if calendar_weekday != moment.weekday() {
            warn!(
                "time source reported weekday {} for {}-{:02}-{:02}, calendar says {}; using the calendar",
                moment.weekday(),
                moment.year(),
                moment.month(),
                moment.day(),
                calendar_weekday
            );
        }
        self.state = Some(Extrapolation {
            moment: moment.with_calendar_weekday(),
            anchor: at,
        });
    }

    /// Apply every whole minute elapsed since the last baseline or advance.
    /// A `now` at or before the anchor changes nothing.
    pub fn advance(&mut self, now: Instant) -> Option<&CalendarMoment> {
        let state = self.state.as_mut()?;
        let elapsed = now.saturating_duration_since(state.anchor);
        let minutes = elapsed.as_secs() / SECS_PER_MINUTE;
        if minutes > 0 {
            state.moment.add_minutes(minutes);
            state.anchor += Duration::from_secs(minutes * SECS_PER_MINUTE);
            debug!("local clock advanced by {minutes} minute(s)");
        }
        Some(&state.moment)
    }

    pub fn moment(&self) -> Option<&CalendarMoment> {
        self.state.as_ref().map(|state| &state.moment)
    }

    pub fn clear(&mut self) {
        self.state = None;
    }
}
