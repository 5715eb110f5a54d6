pub mod calendar;
pub mod connectivity;
pub mod error;
pub mod fetch;
pub mod format;
pub mod local_clock;
pub mod sync;

pub use calendar::{CalendarMoment, TimePayload};
pub use connectivity::{ConnectivityGate, ConnectivityStatus, NetworkLink};
pub use error::{FetchError, FetchResult, PayloadError, SyncError};
pub use fetch::ClockFetcher;
pub use local_clock::LocalClock;
pub use sync::{RetryPolicy, SyncConfig, SyncPhase, SyncStateMachine};
