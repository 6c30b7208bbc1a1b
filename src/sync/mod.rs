mod debounce;
mod driver;
mod engine;
mod status;

pub use debounce::DebounceTable;
pub use driver::{tokio_clock, Intent, SyncDriver};
pub use engine::{
    system_clock, Clock, FocusTarget, RemoteCompletion, RemoteRequest, SyncEngine,
};
pub use status::{SyncPhase, SyncStatus};
