pub mod cli;
pub mod config;
pub mod model;
pub mod remote;
pub mod search;
pub mod storage;
pub mod sync;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use model::{Note, NoteId};
pub use sync::{SyncDriver, SyncEngine};
