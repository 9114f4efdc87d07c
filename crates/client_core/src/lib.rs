pub mod controller;
pub mod error;
pub mod gateway;
pub mod live;
pub mod lookup;
pub mod scheduler;
pub mod sync_state;

pub use controller::ListSyncController;
pub use error::SyncError;
pub use gateway::{FetchGateway, HttpFetchGateway, PageRequest};
pub use live::LiveStatusMonitor;
pub use lookup::{LookupOutcome, RankLookup};
pub use scheduler::{PollHandle, PollScheduler, TickFn, TokioPollScheduler};
pub use sync_state::{
    Cursor, FetchKind, FetchTicket, ListMode, ListSnapshot, MergeOutcome, SyncOptions,
    SyncState, SyncStatus, DEFAULT_PAGE_SIZE, DEFAULT_POLL_INTERVAL,
};

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod controller_tests;

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod gateway_tests;
