//! The sync state machine: find out who we are on the network, ask for the
//! local time once, then hand the clock over to local extrapolation.
//!
//! ```text
//! Init -> CheckingNetwork -> FetchingIdentity -> IdentityReceived
//!      -> IdentityReady -> FetchingTime -> TimeSynced
//!
//! CheckingNetwork  -> NetworkUnavailable
//! FetchingIdentity -> IdentityUnavailable
//! FetchingTime     -> TimeUnavailable
//! ```
//!
//! Fetches run as tokio tasks and report back over a channel; [SyncStateMachine::tick]
//! only ever drains that channel, so a slow network never stalls the caller's
//! loop. Every result is tagged with the generation that requested it and
//! results from before the last [SyncStateMachine::retry] are dropped.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::calendar::{CalendarMoment, TimePayload};
use crate::connectivity::{ConnectivityGate, ConnectivityStatus, NetworkLink};
use crate::error::{FetchError, FetchResult, SyncError};
use crate::fetch::{ClockFetcher, with_timeout};
use crate::format::format_moment;
use crate::local_clock::LocalClock;

const PENDING_TEXT: &str = "fetching...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    Init,
    CheckingNetwork,
    FetchingIdentity,
    IdentityReceived,
    IdentityReady,
    FetchingTime,
    TimeSynced,
    NetworkUnavailable,
    IdentityUnavailable,
    TimeUnavailable,
}

impl SyncPhase {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SyncPhase::NetworkUnavailable | SyncPhase::IdentityUnavailable | SyncPhase::TimeUnavailable
        )
    }

    /// Phases the machine won't leave on its own.
    pub fn is_terminal(&self) -> bool {
        self.is_error() || *self == SyncPhase::TimeSynced
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Init => "init",
            SyncPhase::CheckingNetwork => "checking network",
            SyncPhase::FetchingIdentity => "fetching identity",
            SyncPhase::IdentityReceived => "identity received",
            SyncPhase::IdentityReady => "identity ready",
            SyncPhase::FetchingTime => "fetching time",
            SyncPhase::TimeSynced => "time synced",
            SyncPhase::NetworkUnavailable => "network unavailable",
            SyncPhase::IdentityUnavailable => "identity unavailable",
            SyncPhase::TimeUnavailable => "time unavailable",
        };
        f.write_str(label)
    }
}

/// How many times a failed fetch is repeated before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub identity_retries: u32,
    pub time_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            identity_retries: 1,
            time_retries: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub fetch_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Minimum gap between identity requests while the source keeps
    /// answering with an empty identity.
    pub identity_poll_interval: Duration,
    /// Re-fetch the time this often once synced. `None` syncs only once.
    pub resync_interval: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            fetch_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            identity_poll_interval: Duration::from_secs(1),
            resync_interval: None,
        }
    }
}

enum FetchRequest {
    Identity,
    Time(String),
}

enum FetchOutcome {
    Identity(FetchResult<String>),
    Time(FetchResult<TimePayload>),
}

struct Completion {
    generation: u64,
    outcome: FetchOutcome,
}

/// Drives a device from "no idea what time it is" to a locally ticking
/// clock. Must be ticked from inside a tokio runtime, since fetches are
/// spawned onto it.
pub struct SyncStateMachine {
    config: SyncConfig,
    gate: ConnectivityGate,
    fetcher: Arc<dyn ClockFetcher>,
    phase: SyncPhase,
    identity: Option<String>,
    pending_identity: Option<String>,
    clock: LocalClock,
    last_error: Option<SyncError>,
    last_synced_at: Option<Instant>,
    last_identity_request: Option<Instant>,
    last_time_request: Option<Instant>,
    retries_left: u32,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
}

impl SyncStateMachine {
    pub fn new(
        config: SyncConfig,
        link: Box<dyn NetworkLink>,
        fetcher: Arc<dyn ClockFetcher>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel(4);
        let gate = ConnectivityGate::new(link, config.connect_timeout);
        SyncStateMachine {
            config,
            gate,
            fetcher,
            phase: SyncPhase::Init,
            identity: None,
            pending_identity: None,
            clock: LocalClock::new(),
            last_error: None,
            last_synced_at: None,
            last_identity_request: None,
            last_time_request: None,
            retries_left: 0,
            generation: 0,
            in_flight: None,
            completion_tx,
            completion_rx,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn moment(&self) -> Option<&CalendarMoment> {
        self.clock.moment()
    }

    pub fn connectivity(&self) -> ConnectivityStatus {
        self.gate.status()
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    pub fn last_synced_at(&self) -> Option<Instant> {
        self.last_synced_at
    }

    /// What a clock face should show right now, as a (date, time) pair.
    pub fn display_text(&self) -> (String, String) {
        if let Some(moment) = self.clock.moment() {
            return format_moment(moment);
        }
        if self.phase.is_error() {
            let reason = self
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            return (self.phase.to_string(), reason);
        }
        (PENDING_TEXT.to_string(), PENDING_TEXT.to_string())
    }

    /// Advance the machine by at most one step. `now` comes from the
    /// caller's monotonic tick source.
    pub fn tick(&mut self, now: Instant) -> SyncPhase {
        let completion = self.poll_completion();
        match self.phase {
            SyncPhase::Init => {
                self.set_phase(SyncPhase::CheckingNetwork);
                self.check_network(now);
            }
            SyncPhase::CheckingNetwork => self.check_network(now),
            SyncPhase::FetchingIdentity => match completion {
                Some(FetchOutcome::Identity(result)) => self.handle_identity(result, now),
                Some(FetchOutcome::Time(_)) => warn!("ignoring time result while fetching identity"),
                None => {}
            },
            SyncPhase::IdentityReceived => self.accept_identity(completion, now),
            SyncPhase::IdentityReady => {
                if let Some(identity) = self.identity.clone() {
                    self.retries_left = self.config.retry_policy.time_retries;
                    self.spawn_fetch(FetchRequest::Time(identity), now);
                    self.set_phase(SyncPhase::FetchingTime);
                } else {
                    warn!("reached {} without an identity, starting over", self.phase);
                    self.set_phase(SyncPhase::Init);
                }
            }
            SyncPhase::FetchingTime => match completion {
                Some(FetchOutcome::Time(result)) => self.handle_time(result, now),
                Some(FetchOutcome::Identity(_)) => warn!("ignoring identity result while fetching time"),
                None => {}
            },
            SyncPhase::TimeSynced => {
                if let Some(FetchOutcome::Time(result)) = completion {
                    self.handle_resync(result, now);
                }
                self.clock.advance(now);
                self.maybe_resync(now);
            }
            SyncPhase::NetworkUnavailable
            | SyncPhase::IdentityUnavailable
            | SyncPhase::TimeUnavailable => {}
        }
        self.phase
    }

    /// Start over from scratch. Anything still in flight is abandoned and
    /// its result ignored if it shows up later.
    pub fn retry(&mut self) {
        info!("retrying sync from {}", self.phase);
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
        self.generation += 1;
        self.phase = SyncPhase::Init;
        self.identity = None;
        self.pending_identity = None;
        self.clock.clear();
        self.last_error = None;
        self.last_synced_at = None;
        self.last_identity_request = None;
        self.last_time_request = None;
        self.retries_left = 0;
        self.gate.reset();
    }

    fn set_phase(&mut self, phase: SyncPhase) {
        if phase != self.phase {
            info!("sync: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn fail(&mut self, phase: SyncPhase, error: SyncError) {
        warn!("sync failed in {}: {error}", self.phase);
        self.last_error = Some(error);
        self.set_phase(phase);
    }

    fn poll_completion(&mut self) -> Option<FetchOutcome> {
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) if completion.generation == self.generation => {
                    self.in_flight = None;
                    return Some(completion.outcome);
                }
                Ok(completion) => {
                    debug!(
                        "dropping fetch result from generation {} (now at {})",
                        completion.generation, self.generation
                    );
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }

    fn spawn_fetch(&mut self, request: FetchRequest, now: Instant) {
        match &request {
            FetchRequest::Identity => self.last_identity_request = Some(now),
            FetchRequest::Time(_) => self.last_time_request = Some(now),
        }
        let fetcher = Arc::clone(&self.fetcher);
        let completion_tx = self.completion_tx.clone();
        let generation = self.generation;
        let timeout = self.config.fetch_timeout;
        self.in_flight = Some(tokio::spawn(async move {
            let outcome = match request {
                FetchRequest::Identity => {
                    FetchOutcome::Identity(with_timeout(timeout, fetcher.fetch_identity()).await)
                }
                FetchRequest::Time(identity) => {
                    FetchOutcome::Time(with_timeout(timeout, fetcher.fetch_time(&identity)).await)
                }
            };
            if completion_tx
                .send(Completion {
                    generation,
                    outcome,
                })
                .await
                .is_err()
            {
                debug!("sync machine went away before fetch finished");
            }
        }));
    }

    fn check_network(&mut self, now: Instant) {
        match self.gate.check(now) {
            ConnectivityStatus::Connected => {
                self.retries_left = self.config.retry_policy.identity_retries;
                self.spawn_fetch(FetchRequest::Identity, now);
                self.set_phase(SyncPhase::FetchingIdentity);
            }
            ConnectivityStatus::NoCredentials => {
                self.fail(SyncPhase::NetworkUnavailable, SyncError::Configuration)
            }
            ConnectivityStatus::Unreachable => self.fail(
                SyncPhase::NetworkUnavailable,
                FetchError::transport("network unreachable").into(),
            ),
            ConnectivityStatus::Unknown | ConnectivityStatus::Connecting => {}
        }
    }

    fn handle_identity(&mut self, result: FetchResult<String>, now: Instant) {
        match result {
            Ok(payload) => {
                self.pending_identity = Some(payload);
                self.set_phase(SyncPhase::IdentityReceived);
            }
            Err(err) if self.retries_left > 0 => {
                self.retries_left -= 1;
                warn!("identity fetch failed, retrying: {err}");
                self.spawn_fetch(FetchRequest::Identity, now);
            }
            Err(err) => self.fail(SyncPhase::IdentityUnavailable, err.into()),
        }
    }

    fn accept_identity(&mut self, completion: Option<FetchOutcome>, now: Instant) {
        match completion {
            Some(FetchOutcome::Identity(Ok(payload))) => self.pending_identity = Some(payload),
            Some(FetchOutcome::Identity(Err(err))) => {
                self.fail(SyncPhase::IdentityUnavailable, err.into());
                return;
            }
            Some(FetchOutcome::Time(_)) => warn!("ignoring time result while waiting for identity"),
            None => {}
        }

        let identity = self
            .pending_identity
            .take()
            .map(|payload| payload.trim().to_string())
            .filter(|identity| !identity.is_empty());
        match identity {
            Some(identity) => {
                info!("device identity is {identity}");
                self.identity = Some(identity);
                self.set_phase(SyncPhase::IdentityReady);
            }
            None => {
                let due = self.last_identity_request.is_none_or(|last| {
                    now.saturating_duration_since(last) >= self.config.identity_poll_interval
                });
                if self.in_flight.is_none() && due {
                    debug!("identity source answered with nothing, asking again");
                    self.spawn_fetch(FetchRequest::Identity, now);
                }
            }
        }
    }

    fn handle_time(&mut self, result: FetchResult<TimePayload>, now: Instant) {
        let payload = match result {
            Ok(payload) => payload,
            Err(err) if self.retries_left > 0 => {
                self.retries_left -= 1;
                warn!("time fetch failed, retrying: {err}");
                if let Some(identity) = self.identity.clone() {
                    self.spawn_fetch(FetchRequest::Time(identity), now);
                }
                return;
            }
            Err(err) => {
                self.fail(SyncPhase::TimeUnavailable, err.into());
                return;
            }
        };
        match CalendarMoment::from_payload(&payload) {
            Ok(moment) => {
                self.clock.set_baseline(moment, now);
                self.last_synced_at = Some(now);
                self.set_phase(SyncPhase::TimeSynced);
            }
            Err(err) => self.fail(SyncPhase::TimeUnavailable, err.into()),
        }
    }

    fn maybe_resync(&mut self, now: Instant) {
        let Some(interval) = self.config.resync_interval else {
            return;
        };
        if self.in_flight.is_some() {
            return;
        }
        let due = self
            .last_time_request
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);
        if !due {
            return;
        }
        if let Some(identity) = self.identity.clone() {
            debug!("re-syncing time for {identity}");
            self.spawn_fetch(FetchRequest::Time(identity), now);
        }
    }

    fn handle_resync(&mut self, result: FetchResult<TimePayload>, now: Instant) {
        let moment = result
            .map_err(SyncError::from)
            .and_then(|payload| CalendarMoment::from_payload(&payload).map_err(SyncError::from));
        match moment {
            Ok(moment) => {
                info!("re-synced time");
                self.clock.set_baseline(moment, now);
                self.last_synced_at = Some(now);
            }
            Err(err) => warn!("time re-sync failed, keeping local clock: {err}"),
        }
    }
}

impl Drop for SyncStateMachine {
    fn drop(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UpLink;

    impl NetworkLink for UpLink {
        fn connect(&mut self) -> ConnectivityStatus {
            ConnectivityStatus::Connected
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct NoFetcher;

    #[async_trait]
    impl ClockFetcher for NoFetcher {
        async fn fetch_identity(&self) -> FetchResult<String> {
            Err(FetchError::transport("unused"))
        }

        async fn fetch_time(&self, _identity: &str) -> FetchResult<TimePayload> {
            Err(FetchError::transport("unused"))
        }
    }

    #[test]
    fn test_identity_ready_without_identity_starts_over() {
        let mut machine =
            SyncStateMachine::new(SyncConfig::default(), Box::new(UpLink), Arc::new(NoFetcher));
        machine.phase = SyncPhase::IdentityReady;
        assert_eq!(machine.tick(Instant::now()), SyncPhase::Init);
        assert!(machine.in_flight.is_none());
    }

    #[test]
    fn test_phase_classification() {
        assert!(SyncPhase::NetworkUnavailable.is_error());
        assert!(SyncPhase::IdentityUnavailable.is_error());
        assert!(SyncPhase::TimeUnavailable.is_error());
        assert!(!SyncPhase::TimeSynced.is_error());
        assert!(SyncPhase::TimeSynced.is_terminal());
        assert!(!SyncPhase::IdentityReady.is_terminal());
        assert_eq!(SyncPhase::FetchingTime.to_string(), "fetching time");
    }

    #[test]
    fn test_default_retry_policy_is_asymmetric() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.identity_retries, 1);
        assert_eq!(policy.time_retries, 0);
    }
}
